//! Vimeo adapter
//!
//! Handles `vimeo.com/<id>` URLs. Episode files are the Vimeo watch
//! links found in the document; each one is resolved to a direct
//! download URL through the player config JSON referenced by the watch
//! page's `data-config-url` attribute.

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::fetch::{FeedResource, FetchOptions};
use crate::parse::feed::{Feedparser, LinkFileMode};
use crate::parse::models::Feed;
use crate::parse::{FeedAdapter, ParseContext, ParseError, ParseOptions};

/// Download formats in preference order
const FILEFORMATS: [&str; 3] = ["hd", "sd", "mobile"];

pub struct VimeoParser {
    parser: Feedparser,
}

impl VimeoParser {
    pub fn new() -> Self {
        Self {
            parser: Feedparser::new(),
        }
    }

    /// Resolve a watch URL to the best available download URL
    ///
    /// Fetches the watch page, follows its `data-config-url` and picks
    /// the preferred fileformat from the config JSON.
    pub async fn get_real_download_url(
        &self,
        ctx: &ParseContext,
        url: &str,
        preferred_format: Option<&str>,
    ) -> Result<String, ParseError> {
        let Some(video_id) = get_vimeo_id(url) else {
            return Ok(url.to_string());
        };

        let fetch_opts = FetchOptions::default();
        let web_url = format!("http://vimeo.com/{}", video_id);
        let page = ctx.fetcher.fetch(&web_url, &fetch_opts).await?;
        let markup = String::from_utf8_lossy(&page.content);

        let config_re = Regex::new(r#"data-config-url="([^"]+)""#).expect("Invalid regex");
        let config_url = config_re
            .captures(&markup)
            .map(|c| c[1].replace("&amp;", "&"))
            .ok_or_else(|| {
                ParseError::SourceApi("Cannot get config URL from Vimeo".to_string())
            })?;

        let config = ctx.fetcher.fetch(&config_url, &fetch_opts).await?;
        let config: serde_json::Value = serde_json::from_slice(&config.content)
            .map_err(|e| ParseError::SourceApi(format!("Invalid Vimeo config: {}", e)))?;

        let files = &config["request"]["files"];
        let preference = preferred_format
            .into_iter()
            .chain(FILEFORMATS.iter().copied());

        for fileformat in preference {
            if let Some(download_url) = files[fileformat]["url"].as_str() {
                debug!(%video_id, fileformat, "picked vimeo format");
                return Ok(download_url.to_string());
            }
        }

        Err(ParseError::SourceApi(
            "No usable fileformat in Vimeo config".to_string(),
        ))
    }
}

impl Default for VimeoParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedAdapter for VimeoParser {
    fn handles_url(&self, url: &str) -> bool {
        let re = Regex::new(r"^https?://vimeo\.com/(\d+)$").expect("Invalid regex");
        re.is_match(url)
    }

    async fn parse(
        &self,
        ctx: &ParseContext,
        resource: &FeedResource,
        _opts: &ParseOptions,
    ) -> Result<Feed, ParseError> {
        let mut feed = self
            .parser
            .parse_resource(resource, LinkFileMode::VimeoOnly)?;

        // resolve watch links to direct downloads where possible
        for episode in &mut feed.episodes {
            for file in &mut episode.files {
                if file.mimetype.as_deref() != Some("application/x-vimeo") {
                    continue;
                }
                if let Some(watch_url) = file.urls.first().cloned() {
                    let resolved = self.get_real_download_url(ctx, &watch_url, None).await?;
                    file.urls = vec![resolved];
                }
            }
        }

        feed.description = feed.urls.first().cloned();
        feed.logo = None;
        feed.override_content_types(vec!["video".to_string()]);

        Ok(feed)
    }
}

/// Whether a URL points at a Vimeo video page
pub fn is_video_link(url: &str) -> bool {
    get_vimeo_id(url).is_some()
}

/// Extract the video id from watch and moogaloop URL shapes
pub fn get_vimeo_id(url: &str) -> Option<String> {
    let patterns = [
        r"^https?://vimeo\.com/moogaloop\.swf\?clip_id=(\d+)$",
        r"^https?://vimeo\.com/(\d+)$",
    ];

    for pattern in patterns {
        let re = Regex::new(pattern).expect("Invalid regex");
        if let Some(captures) = re.captures(url) {
            return Some(captures[1].to_string());
        }
    }

    None
}
