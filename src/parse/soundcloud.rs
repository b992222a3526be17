//! Soundcloud adapters
//!
//! Soundcloud has no RSS feeds; episodes come from its JSON API. Two
//! adapters share the implementation: one for a user's own tracks, one
//! for their favorites.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::constants::soundcloud::TRACK_LIMIT;
use crate::fetch::{FeedResource, FetchOptions};
use crate::mimetype;
use crate::parse::models::{Episode, Feed, File};
use crate::parse::{FeedAdapter, Feedparser, ParseContext, ParseError, ParseOptions};

const API_BASE: &str = "https://api.soundcloud.com";

/// Which listing of a user the adapter serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listing {
    Tracks,
    Favorites,
}

impl Listing {
    fn api_name(&self) -> &'static str {
        match self {
            Self::Tracks => "tracks",
            Self::Favorites => "favorites",
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    id: u64,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Track {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    permalink: Option<String>,
    #[serde(default)]
    permalink_url: Option<String>,
    #[serde(default)]
    stream_url: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    original_content_size: Option<u64>,
    #[serde(default)]
    downloadable: bool,
}

#[derive(Debug, Deserialize)]
struct ApiErrors {
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    error_message: String,
}

/// Client for the per-user track listings
struct SoundcloudUser<'a> {
    ctx: &'a ParseContext,
    username: String,
    consumer_key: String,
}

impl<'a> SoundcloudUser<'a> {
    fn new(ctx: &'a ParseContext, username: &str) -> Result<Self, ParseError> {
        let consumer_key = ctx
            .config
            .soundcloud_consumer_key
            .clone()
            .ok_or_else(|| {
                ParseError::SourceApi("No Soundcloud consumer key configured".to_string())
            })?;

        Ok(Self {
            ctx,
            username: username.to_string(),
            consumer_key,
        })
    }

    async fn get_json(&self, url: &str) -> Result<Vec<u8>, ParseError> {
        let resource = self
            .ctx
            .fetcher
            .fetch(url, &FetchOptions::default())
            .await?;
        Ok(resource.content.clone())
    }

    /// API errors come as a list; the messages are joined into one
    fn check_errors(&self, body: &[u8]) -> Result<(), ParseError> {
        if let Ok(errors) = serde_json::from_slice::<ApiErrors>(body) {
            let message = errors
                .errors
                .iter()
                .map(|e| e.error_message.as_str())
                .collect::<Vec<_>>()
                .join(";");
            return Err(ParseError::SourceApi(message));
        }
        Ok(())
    }

    async fn get_user_info(&self) -> Result<UserInfo, ParseError> {
        let url = format!(
            "{}/users/{}.json?consumer_key={}",
            API_BASE, self.username, self.consumer_key
        );
        let body = self.get_json(&url).await?;
        self.check_errors(&body)?;
        serde_json::from_slice(&body)
            .map_err(|e| ParseError::SourceApi(format!("Invalid Soundcloud user info: {}", e)))
    }

    async fn get_tracks(&self, user_id: u64, listing: Listing) -> Result<Vec<Track>, ParseError> {
        let url = format!(
            "{}/users/{}/{}.json?filter=downloadable&consumer_key={}&limit={}",
            API_BASE,
            user_id,
            listing.api_name(),
            self.consumer_key,
            TRACK_LIMIT
        );
        debug!(url = %self.strip_consumer_key(&url), "loading soundcloud listing");

        let body = self.get_json(&url).await?;
        self.check_errors(&body)?;

        let tracks: Vec<Track> = serde_json::from_slice(&body)
            .map_err(|e| ParseError::SourceApi(format!("Invalid Soundcloud listing: {}", e)))?;

        let total = tracks.len();
        let downloadable: Vec<Track> = tracks.into_iter().filter(|t| t.downloadable).collect();
        if downloadable.is_empty() && total > 0 {
            warn!(
                user = %self.username,
                total, "all tracks of this listing have downloads disabled"
            );
        }

        Ok(downloadable)
    }

    /// The consumer key must not leak into client-visible URLs
    fn strip_consumer_key(&self, url: &str) -> String {
        url.replace(&self.consumer_key, "")
    }

    fn episode_for_track(&self, track: &Track) -> Option<Episode> {
        let url = track
            .stream_url
            .clone()
            .or_else(|| track.download_url.clone())?;
        let url = self.strip_consumer_key(&url);

        let mimetype = mimetype::get_mimetype(None, &url)
            .or_else(|| Some("audio/mpeg".to_string()));

        let mut episode = Episode {
            guid: track
                .permalink
                .clone()
                .or_else(|| track.id.map(|id| id.to_string())),
            title: track
                .title
                .clone()
                .or_else(|| track.permalink.clone())
                .or_else(|| Some("Unknown track".to_string())),
            description: track
                .description
                .clone()
                .or_else(|| Some("No description available".to_string())),
            link: track.permalink_url.clone().or_else(|| {
                Some(format!("https://soundcloud.com/{}", self.username))
            }),
            author: Some(self.username.clone()),
            released: track.created_at.as_deref().and_then(parse_soundcloud_date),
            ..Default::default()
        };
        episode.add_file(File::new(
            vec![url],
            mimetype,
            track.original_content_size,
        ));

        Some(episode)
    }
}

/// Parse the timestamp format used by the Soundcloud API
/// (`2009/11/03 13:37:00`)
fn parse_soundcloud_date(value: &str) -> Option<i64> {
    // trailing zone markers like " +0000" are ignored
    let value = value.get(..19)?;
    NaiveDateTime::parse_from_str(value, "%Y/%m/%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

async fn parse_listing(
    ctx: &ParseContext,
    resource: &FeedResource,
    username: &str,
    listing: Listing,
) -> Result<Feed, ParseError> {
    let user = SoundcloudUser::new(ctx, username)?;
    let info = user.get_user_info().await?;
    let tracks = user.get_tracks(info.id, listing).await?;

    let mut feed = Feedparser::new().feed_shell(resource);
    match listing {
        Listing::Tracks => {
            feed.title = Some(format!("{} on Soundcloud", username));
            feed.link = Some(format!("https://soundcloud.com/{}", username));
            feed.description = Some(format!("Tracks published by {} on Soundcloud.", username));
        }
        Listing::Favorites => {
            feed.title = Some(format!("{}'s favorites on Soundcloud", username));
            feed.link = Some(format!("https://soundcloud.com/{}/favorites", username));
            feed.description = Some(format!("Tracks favorited by {} on Soundcloud.", username));
        }
    }
    feed.author = Some(username.to_string());
    feed.logo = info.avatar_url;

    let episodes = tracks
        .iter()
        .filter_map(|t| user.episode_for_track(t))
        .collect();
    feed.set_episodes(episodes);

    Ok(feed)
}

fn username_for(regex: &str, url: &str) -> Option<String> {
    let re = Regex::new(regex).expect("Invalid regex");
    re.captures(url).map(|c| c[2].to_string())
}

const TRACKS_RE: &str = r"(?i)^https?://([a-z0-9-]+\.)?soundcloud\.com/([^/]+)$";
const FAVORITES_RE: &str = r"(?i)^https?://([a-z0-9-]+\.)?soundcloud\.com/([^/]+)/favorites";

/// Adapter for a Soundcloud user's own tracks
pub struct SoundcloudParser;

impl SoundcloudParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SoundcloudParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedAdapter for SoundcloudParser {
    fn handles_url(&self, url: &str) -> bool {
        username_for(TRACKS_RE, url).is_some()
    }

    async fn parse(
        &self,
        ctx: &ParseContext,
        resource: &FeedResource,
        _opts: &ParseOptions,
    ) -> Result<Feed, ParseError> {
        let url = resource.urls.first().map(String::as_str).unwrap_or("");
        let username = username_for(TRACKS_RE, url)
            .ok_or_else(|| ParseError::SourceApi("Unrecognized Soundcloud URL".to_string()))?;
        parse_listing(ctx, resource, &username, Listing::Tracks).await
    }
}

/// Adapter for a Soundcloud user's favorites
pub struct SoundcloudFavParser;

impl SoundcloudFavParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SoundcloudFavParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedAdapter for SoundcloudFavParser {
    fn handles_url(&self, url: &str) -> bool {
        username_for(FAVORITES_RE, url).is_some()
    }

    async fn parse(
        &self,
        ctx: &ParseContext,
        resource: &FeedResource,
        _opts: &ParseOptions,
    ) -> Result<Feed, ParseError> {
        let url = resource.urls.first().map(String::as_str).unwrap_or("");
        let username = username_for(FAVORITES_RE, url)
            .ok_or_else(|| ParseError::SourceApi("Unrecognized Soundcloud URL".to_string()))?;
        parse_listing(ctx, resource, &username, Listing::Favorites).await
    }
}
