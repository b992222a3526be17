use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{
    CONTENT_LENGTH, CONTENT_TYPE, ETAG, EXPIRES, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
    LOCATION,
};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, info};
use url::Url;

use crate::constants::network;
use crate::fetch::{FeedResource, FetchError, UrlCache};
use crate::utils::url::basic_sanitizing;
use crate::utils::validation::validate_feed_url;

/// Options for a single fetch
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Serve a fresh unexpired cache entry without a request
    pub use_cache: bool,
    /// Issue a HEAD request and keep the body empty
    pub headers_only: bool,
    /// Additional TTL added on top of the `Expires` header
    pub extra_ttl: Option<Duration>,
    /// Caller-supplied `If-Modified-Since`; wins over cached validators
    pub if_modified_since: Option<DateTime<Utc>>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            headers_only: false,
            extra_ttl: None,
            if_modified_since: None,
        }
    }
}

/// HTTP fetcher with conditional requests and a shared response cache
///
/// Redirects are handled manually so the 301/302 distinction stays
/// observable: temporary redirects are followed and appended to the
/// redirect chain, permanent ones are recorded on the resource and not
/// followed.
pub struct UrlFetcher {
    client: Client,
    cache: UrlCache,
}

impl UrlFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(network::USER_AGENT)
            .timeout(network::HTTP_TIMEOUT)
            .connect_timeout(network::CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            cache: UrlCache::new(),
        }
    }

    pub fn cache(&self) -> &UrlCache {
        &self.cache
    }

    /// Drop the cached entry for a URL
    pub fn invalidate(&self, url: &str) {
        self.cache.invalidate(&basic_sanitizing(url));
    }

    /// Fetch a URL, serving from cache where possible
    pub async fn fetch(
        &self,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<Arc<FeedResource>, FetchError> {
        let sanitized = basic_sanitizing(url);
        validate_feed_url(&sanitized).map_err(FetchError::InvalidUrl)?;

        // bypassing the cache also means fetching unconditionally
        let cached = if opts.use_cache {
            self.cache.get(&sanitized)
        } else {
            None
        };

        if let Some(cached) = &cached {
            if !cached.expired() && (cached.is_valid() || opts.headers_only) {
                debug!(url = %sanitized, "serving from cache");
                return Ok(Arc::clone(cached));
            }
        }

        info!(url = %sanitized, "fetching");
        let resource = self
            .fetch_fresh(url, &sanitized, cached.as_deref(), opts)
            .await?;

        let resource = Arc::new(resource);
        self.cache.insert(&sanitized, Arc::clone(&resource));

        Ok(resource)
    }

    async fn fetch_fresh(
        &self,
        original: &str,
        sanitized: &str,
        cached: Option<&FeedResource>,
        opts: &FetchOptions,
    ) -> Result<FeedResource, FetchError> {
        let mut urls = Vec::new();
        if sanitized != original {
            // keep the un-sanitized URL for easy matching of responses
            // to request URLs
            urls.push(original.to_string());
        }
        urls.push(sanitized.to_string());

        let mut current = sanitized.to_string();
        let mut permanent_redirect = None;
        let mut response: Option<Response> = None;

        for _ in 0..network::MAX_REDIRECTS {
            let resp = self
                .send_conditional(&current, cached, opts)
                .await?;

            if !resp.status().is_redirection() || resp.status() == StatusCode::NOT_MODIFIED {
                response = Some(resp);
                break;
            }

            let Some(location) = resp
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
            else {
                response = Some(resp);
                break;
            };

            let target = match Url::parse(&current).and_then(|base| base.join(&location)) {
                Ok(joined) => basic_sanitizing(joined.as_str()),
                Err(_) => basic_sanitizing(&location),
            };

            match resp.status().as_u16() {
                // permanent redirects are recorded, not followed, so
                // callers can report the feed's new location
                301 | 308 => {
                    debug!(url = %current, target = %target, "permanent redirect recorded");
                    permanent_redirect = Some(target);
                    response = Some(resp);
                    break;
                }
                _ => {
                    debug!(url = %current, target = %target, "following redirect");
                    urls.push(target.clone());
                    current = target;
                }
            }
        }

        let response = response.ok_or_else(|| FetchError::TooManyRedirects(sanitized.to_string()))?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            return match cached {
                Some(cached) => {
                    debug!(url = %current, "not modified, reusing cached entry");
                    let mut refreshed = cached.clone();
                    refreshed.last_modified_local = Utc::now();
                    Ok(refreshed)
                }
                None => Err(FetchError::NotModified),
            };
        }

        if !status.is_success() {
            return Err(FetchError::Status {
                url: current,
                status,
            });
        }

        let now = Utc::now();

        let header =
            |name| -> Option<String> {
                response
                    .headers()
                    .get(name)
                    .and_then(|v: &reqwest::header::HeaderValue| v.to_str().ok())
                    .map(str::to_string)
            };

        let content_type = header(CONTENT_TYPE);
        let etag = header(ETAG);
        let last_modified_raw = header(LAST_MODIFIED);
        let last_modified_upstream = last_modified_raw.as_deref().and_then(parse_header_date);
        let length = header(CONTENT_LENGTH).and_then(|v| v.parse().ok());

        let mut expires = header(EXPIRES).as_deref().and_then(parse_header_date);
        if let Some(ttl) = opts.extra_ttl {
            let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
            expires = Some(expires.unwrap_or(now) + ttl);
        }
        // expired-on-arrival headers are as good as none
        expires = expires.filter(|e| *e > now);

        let content = if opts.headers_only {
            Vec::new()
        } else {
            response.bytes().await?.to_vec()
        };

        Ok(FeedResource {
            url: current,
            urls,
            permanent_redirect,
            content,
            content_type,
            length,
            etag,
            last_modified_raw,
            last_modified_upstream,
            last_modified_local: now,
            expires,
        })
    }

    async fn send_conditional(
        &self,
        url: &str,
        cached: Option<&FeedResource>,
        opts: &FetchOptions,
    ) -> Result<Response, FetchError> {
        let mut request = if opts.headers_only {
            self.client.head(url)
        } else {
            self.client.get(url)
        };

        match (opts.if_modified_since, cached) {
            (Some(since), _) => {
                request = request.header(IF_MODIFIED_SINCE, since.to_rfc2822());
            }
            (None, Some(cached)) => {
                if let Some(raw) = &cached.last_modified_raw {
                    request = request.header(IF_MODIFIED_SINCE, raw);
                }
            }
            _ => {}
        }

        if let Some(cached) = cached {
            if let Some(etag) = &cached.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
        }

        Ok(request.send().await?)
    }
}

impl Default for UrlFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses dates in RFC-2822 format, as used by HTTP date headers
fn parse_header_date(date_str: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(date_str)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
