//! Parser dispatch and feed normalization
//!
//! An ordered list of adapters turns fetched resources into normalized
//! feed documents. Source-specific adapters (YouTube, Vimeo, Soundcloud,
//! FM4) claim their URL shapes; the generic RSS/Atom parser is the
//! fallback. A post-processing pass derives titles and content types,
//! inlines logos and applies text processing.

pub mod feed;
pub mod fm4;
pub mod logo;
pub mod models;
pub mod soundcloud;
pub mod text;
pub mod vimeo;
pub mod youtube;

pub use feed::{Feedparser, FeedparserAdapter, LinkFileMode};
pub use logo::LogoFormat;
pub use models::{Episode, Feed, File};
pub use text::TextProcessor;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::Config;
use crate::fetch::{FeedResource, FetchError, FetchOptions, UrlFetcher};
use crate::pubsub::Subscriber;

/// Errors raised while turning a resource into a feed document
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Feed parsing failed: {0}")]
    InvalidDocument(String),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    SourceApi(String),
}

/// Shared services available to adapters
pub struct ParseContext {
    pub fetcher: Arc<UrlFetcher>,
    pub config: Arc<Config>,
    pub subscriber: Option<Arc<Subscriber>>,
}

/// Per-request parsing options
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Embed the feed logo as a data URI
    pub inline_logo: bool,
    /// Maximum logo side length in pixels
    pub scale_to: Option<u32>,
    /// Re-encode the logo to this format
    pub logo_format: Option<LogoFormat>,
    /// Post-process all text fields
    pub text_processor: Option<TextProcessor>,
    /// Serve feeds from the URL cache where possible
    pub use_cache: bool,
    /// Skip feeds unchanged since this time
    pub if_modified_since: Option<DateTime<Utc>>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            inline_logo: false,
            scale_to: None,
            logo_format: None,
            text_processor: None,
            use_cache: true,
            if_modified_since: None,
        }
    }
}

/// One feed source type
///
/// Adapters advertise the URLs they understand and turn a fetched
/// resource into a normalized feed, usually by delegating most work to
/// the generic [`Feedparser`].
#[async_trait]
pub trait FeedAdapter: Send + Sync {
    fn handles_url(&self, url: &str) -> bool;

    /// Whether a 403 on the feed URL should yield an empty resource
    /// instead of an error (YouTube answers 403 for retired endpoints)
    fn empty_on_forbidden(&self) -> bool {
        false
    }

    async fn parse(
        &self,
        ctx: &ParseContext,
        resource: &FeedResource,
        opts: &ParseOptions,
    ) -> Result<Feed, ParseError>;
}

/// Ordered adapter list; the first match wins
pub struct ParserRegistry {
    adapters: Vec<Box<dyn FeedAdapter>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            adapters: vec![
                Box::new(youtube::YoutubeParser::new()),
                Box::new(vimeo::VimeoParser::new()),
                Box::new(soundcloud::SoundcloudParser::new()),
                Box::new(soundcloud::SoundcloudFavParser::new()),
                Box::new(fm4::FM4OnDemandPlaylistParser::new()),
                // fallback, has to be the last entry
                Box::new(FeedparserAdapter::new()),
            ],
        }
    }

    fn adapter_for(&self, url: &str) -> &dyn FeedAdapter {
        self.adapters
            .iter()
            .find(|a| a.handles_url(url))
            .map(|a| a.as_ref())
            .expect("fallback adapter matches every URL")
    }

    /// Parse a single feed URL
    ///
    /// Returns `None` when the feed is unchanged since the caller's
    /// `If-Modified-Since`. Fetch and parse failures produce a stub feed
    /// carrying a `fetch-feed` error so batches keep going.
    pub async fn parse_one(
        &self,
        ctx: &ParseContext,
        url: &str,
        opts: &ParseOptions,
    ) -> Option<Feed> {
        let fetch_opts = FetchOptions {
            use_cache: opts.use_cache,
            if_modified_since: opts.if_modified_since,
            ..Default::default()
        };

        let adapter = self.adapter_for(url);

        let resource = match ctx.fetcher.fetch(url, &fetch_opts).await {
            Ok(resource) => resource,
            Err(FetchError::NotModified) => {
                info!(url, "unchanged, skipping");
                return None;
            }
            Err(e) if e.is_forbidden() && adapter.empty_on_forbidden() => {
                warn!(url, "source answered 403, continuing with an empty resource");
                Arc::new(FeedResource::empty(url))
            }
            Err(e) => {
                warn!(url, error = %e, "fetch failed");
                return Some(Feed::stub(url, "fetch-feed", &e.to_string()));
            }
        };

        if !resource.changed_since(opts.if_modified_since) {
            info!(url, "unchanged since caller timestamp, skipping");
            return None;
        }
        let mut feed = match adapter.parse(ctx, &resource, opts).await {
            Ok(feed) => feed,
            Err(e) => {
                warn!(url, error = %e, "parse failed");
                return Some(Feed::stub(url, "fetch-feed", &e.to_string()));
            }
        };

        self.post_process(ctx, &mut feed, opts).await;

        Some(feed)
    }

    /// Parse a batch of feed URLs
    ///
    /// Feeds that announce a permanent new location get that location
    /// appended to the work list, so RSS-level redirects are followed
    /// within the same response. A visited set prevents cycles.
    pub async fn parse_batch(
        &self,
        ctx: &ParseContext,
        urls: &[String],
        opts: &ParseOptions,
    ) -> Vec<Feed> {
        let mut work: VecDeque<String> = urls.iter().cloned().collect();
        let mut known: HashSet<String> = urls.iter().cloned().collect();
        let mut visited: HashSet<String> = HashSet::new();
        let mut result = Vec::new();

        while let Some(url) = work.pop_front() {
            if !visited.insert(url.clone()) {
                continue;
            }

            let Some(feed) = self.parse_one(ctx, &url, opts).await else {
                continue;
            };

            if let Some(new_location) = &feed.new_location {
                if !known.contains(new_location) && !visited.contains(new_location) {
                    info!(url, %new_location, "following feed relocation");
                    known.insert(new_location.clone());
                    work.push_back(new_location.clone());
                }
            }

            result.push(feed);
        }

        result
    }

    async fn post_process(&self, ctx: &ParseContext, feed: &mut Feed, opts: &ParseOptions) {
        if opts.inline_logo {
            logo::inline_logo(ctx, feed, opts).await;
        }

        if let Some(processor) = &opts.text_processor {
            feed.apply_text_processor(processor);
        }

        // feeds that advertise a hub get a subscription attempt; failure
        // is a warning, never a parse error
        if let (Some(hub), Some(subscriber)) = (feed.hub.clone(), &ctx.subscriber) {
            // subscribe at the last URL in the redirect chain
            if let Some(feed_url) = feed.urls.last().cloned() {
                if let Err(e) = subscriber.subscribe(&feed_url, &hub).await {
                    warn!(url = %feed_url, hub = %hub, error = %e, "hub subscription failed");
                    feed.add_warning("hub-subscription", &e.to_string());
                }
            }
        }
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
