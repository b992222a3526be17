use chrono::{DateTime, Utc};

/// One fetched URL with the headers the cache needs for revalidation
///
/// `urls` is the redirect chain in request order: the caller-supplied URL
/// first (un-sanitized when sanitizing changed it), every followed hop
/// appended. `url` is the final URL the content was read from.
#[derive(Debug, Clone)]
pub struct FeedResource {
    pub url: String,
    pub urls: Vec<String>,
    /// Target of a 301 response; set instead of following it
    pub permanent_redirect: Option<String>,
    pub content: Vec<u8>,
    pub content_type: Option<String>,
    pub length: Option<u64>,
    pub etag: Option<String>,
    /// `Last-Modified` header verbatim, propagated into feed documents
    pub last_modified_raw: Option<String>,
    /// `Last-Modified` parsed as RFC-2822
    pub last_modified_upstream: Option<DateTime<Utc>>,
    /// Wallclock of the fetch that produced this entry
    pub last_modified_local: DateTime<Utc>,
    /// `Expires` plus any additive TTL; entries without one always revalidate
    pub expires: Option<DateTime<Utc>>,
}

impl FeedResource {
    /// An empty resource for a URL, used where a source refuses access
    /// but the caller should proceed with no entries rather than fail
    pub fn empty(url: &str) -> Self {
        Self {
            url: url.to_string(),
            urls: vec![url.to_string()],
            permanent_redirect: None,
            content: Vec::new(),
            content_type: None,
            length: None,
            etag: None,
            last_modified_raw: None,
            last_modified_upstream: None,
            last_modified_local: Utc::now(),
            expires: None,
        }
    }

    /// An entry without an expiry is treated as expired so it gets
    /// revalidated with a conditional request on every access
    pub fn expired(&self) -> bool {
        match self.expires {
            Some(expires) => expires <= Utc::now(),
            None => true,
        }
    }

    /// Whether the entry carries usable content
    pub fn is_valid(&self) -> bool {
        !self.content.is_empty()
    }

    /// Whether the upstream copy changed since the given timestamp
    ///
    /// Unknown modification times count as changed.
    pub fn changed_since(&self, since: Option<DateTime<Utc>>) -> bool {
        match (self.last_modified_upstream, since) {
            (Some(upstream), Some(since)) => upstream > since,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_expired_without_expiry() {
        let resource = FeedResource::empty("http://example.com/feed");
        assert!(resource.expired());
    }

    #[test]
    fn test_expired_with_future_expiry() {
        let mut resource = FeedResource::empty("http://example.com/feed");
        resource.expires = Some(Utc::now() + Duration::hours(1));
        assert!(!resource.expired());

        resource.expires = Some(Utc::now() - Duration::hours(1));
        assert!(resource.expired());
    }

    #[test]
    fn test_changed_since() {
        let mut resource = FeedResource::empty("http://example.com/feed");
        let now = Utc::now();

        // unknown upstream time: always changed
        assert!(resource.changed_since(Some(now)));

        resource.last_modified_upstream = Some(now - Duration::hours(2));
        assert!(!resource.changed_since(Some(now)));
        assert!(resource.changed_since(Some(now - Duration::hours(3))));
        assert!(resource.changed_since(None));
    }

    #[test]
    fn test_is_valid() {
        let mut resource = FeedResource::empty("http://example.com/feed");
        assert!(!resource.is_valid());
        resource.content = b"<rss/>".to_vec();
        assert!(resource.is_valid());
    }
}
