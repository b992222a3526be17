//! YouTube channel adapter
//!
//! Accepts the legacy YouTube feed URL shapes, resolves them to the
//! current canonical feed via the channel page's `rel="canonical"` link
//! and runs the result through the generic extractor. Scrape failures
//! degrade to generic parsing of the original resource; YouTube's
//! habit of answering 403 for retired endpoints yields an empty feed.

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};
use url::Url;

use crate::fetch::{FeedResource, FetchOptions};
use crate::parse::feed::{Feedparser, LinkFileMode};
use crate::parse::models::Feed;
use crate::parse::{FeedAdapter, ParseContext, ParseError, ParseOptions};

const CHANNEL_FEED_TEMPLATE: &str = "https://www.youtube.com/feeds/videos.xml?channel_id=";
const PLAYLIST_FEED_TEMPLATE: &str = "https://www.youtube.com/feeds/videos.xml?playlist_id=";

pub struct YoutubeParser {
    parser: Feedparser,
}

impl YoutubeParser {
    pub fn new() -> Self {
        Self {
            parser: Feedparser::new(),
        }
    }

    /// Rewrite legacy feed URL shapes to the user's channel page
    fn channel_page_url(url: &str) -> Option<String> {
        let user_patterns = [
            r"^https?://gdata\.youtube\.com/feeds/base/users/(?P<username>[^/]+)/uploads",
            r"^https?://(?:[a-z0-9]+\.)?youtube\.com/rss/user/(?P<username>[^/]+)/videos\.rss",
            r"^https?://(?:[a-z0-9]+\.)?youtube\.com/profile\?user=(?P<username>[^&]+)",
            r"^https?://(?:[a-z0-9]+\.)?youtube\.com/user/(?P<username>[^/?#]+)",
        ];

        for pattern in user_patterns {
            let re = Regex::new(pattern).expect("Invalid regex");
            if let Some(captures) = re.captures(url) {
                let username = &captures["username"];
                return Some(format!("https://www.youtube.com/user/{}", username));
            }
        }

        None
    }

    /// Extract the canonical channel URL from the page markup
    fn extract_canonical(page: &str) -> Option<String> {
        let patterns = [
            r#"<link[^>]*rel="canonical"[^>]*href="([^"]+)""#,
            r#"<link[^>]*href="([^"]+)"[^>]*rel="canonical""#,
        ];
        for pattern in patterns {
            let re = Regex::new(pattern).expect("Invalid regex");
            if let Some(captures) = re.captures(page) {
                return Some(captures[1].to_string());
            }
        }
        None
    }

    /// Turn a canonical channel or playlist URL into its feed URL
    fn feed_url_for_canonical(canonical: &str) -> Option<String> {
        let channel_re = Regex::new(r"channel/(?P<id>[A-Za-z0-9_-]+)").expect("Invalid regex");
        if let Some(captures) = channel_re.captures(canonical) {
            return Some(format!("{}{}", CHANNEL_FEED_TEMPLATE, &captures["id"]));
        }

        let playlist_re =
            Regex::new(r"playlist\?list=(?P<id>[A-Za-z0-9_-]+)").expect("Invalid regex");
        if let Some(captures) = playlist_re.captures(canonical) {
            return Some(format!("{}{}", PLAYLIST_FEED_TEMPLATE, &captures["id"]));
        }

        None
    }

    /// Resolve the current feed resource for a legacy URL, if possible
    async fn resolve_feed_resource(
        &self,
        ctx: &ParseContext,
        url: &str,
        opts: &ParseOptions,
    ) -> Option<std::sync::Arc<FeedResource>> {
        let page_url = Self::channel_page_url(url)?;
        let fetch_opts = FetchOptions {
            use_cache: opts.use_cache,
            ..Default::default()
        };

        let page = ctx.fetcher.fetch(&page_url, &fetch_opts).await.ok()?;
        let markup = String::from_utf8_lossy(&page.content);
        let canonical = Self::extract_canonical(&markup)?;
        let feed_url = Self::feed_url_for_canonical(&canonical)?;

        debug!(url, %feed_url, "resolved youtube feed");
        ctx.fetcher.fetch(&feed_url, &fetch_opts).await.ok()
    }

    fn finalize(mut feed: Feed) -> Feed {
        feed.override_content_types(vec!["video".to_string()]);
        feed.logo = None;
        feed
    }
}

impl Default for YoutubeParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedAdapter for YoutubeParser {
    fn handles_url(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| {
                u.host_str()
                    .map(|h| h == "youtube.com" || h.ends_with(".youtube.com"))
            })
            .unwrap_or(false)
    }

    fn empty_on_forbidden(&self) -> bool {
        true
    }

    async fn parse(
        &self,
        ctx: &ParseContext,
        resource: &FeedResource,
        opts: &ParseOptions,
    ) -> Result<Feed, ParseError> {
        let requested = resource
            .urls
            .first()
            .map(String::as_str)
            .unwrap_or(&resource.url);

        if let Some(resolved) = self.resolve_feed_resource(ctx, requested, opts).await {
            let mut feed = self
                .parser
                .parse_resource(&resolved, LinkFileMode::YoutubeOnly)?;
            // answer for the URL that was asked for, not the rewrite
            feed.urls = resource.urls.clone();
            return Ok(Self::finalize(feed));
        }

        // no canonical feed found: fall back to whatever the original
        // URL served, which still works for current feed URLs
        info!(url = %requested, "no canonical youtube feed, using the resource as-is");
        let feed = if resource.content.is_empty() {
            let mut feed = self.parser.feed_shell(resource);
            feed.set_episodes(Vec::new());
            feed
        } else {
            self.parser
                .parse_resource(resource, LinkFileMode::YoutubeOnly)?
        };

        Ok(Self::finalize(feed))
    }
}

/// Whether a URL points at a YouTube video page
pub fn is_video_link(url: &str) -> bool {
    get_youtube_id(url).is_some()
}

/// Extract the video id from the known watch URL shapes
pub fn get_youtube_id(url: &str) -> Option<String> {
    let patterns = [
        r"^https?://(?:[a-z0-9]+\.)?youtube\.com/v/(.*)\.swf",
        r"^https?://(?:[a-z0-9]+\.)?youtube\.com/watch\?v=([^&]+)",
        r"^https?://(?:[a-z0-9]+\.)?youtube\.com/v/([^?]+)\?",
    ];

    for pattern in patterns {
        let re = Regex::new(pattern).expect("Invalid regex");
        if let Some(captures) = re.captures(url) {
            return Some(captures[1].to_string());
        }
    }

    None
}
