use url::Url;

/// Validate if a string is a valid URL
pub fn is_valid_url(url_str: &str) -> bool {
    Url::parse(url_str).is_ok()
}

/// Check if a URL is a plausible feed URL
pub fn is_valid_feed_url(url: &str) -> bool {
    is_valid_url(url) && (url.starts_with("http://") || url.starts_with("https://"))
}

/// Validate a feed URL and return a Result
pub fn validate_feed_url(url: &str) -> Result<(), String> {
    if url.trim().is_empty() {
        return Err("Feed URL cannot be empty".to_string());
    }

    if !is_valid_feed_url(url) {
        return Err("Invalid feed URL format".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_feed_urls() {
        assert!(is_valid_feed_url("http://example.com/feed.xml"));
        assert!(is_valid_feed_url("https://example.com/rss"));
    }

    #[test]
    fn test_invalid_feed_urls() {
        assert!(!is_valid_feed_url("not-a-url"));
        assert!(!is_valid_feed_url("ftp://example.com/feed"));
        assert!(validate_feed_url("").is_err());
    }
}
