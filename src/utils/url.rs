//! URL sanitizing and fixing helpers

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Characters left untouched when fixing a URL path
const PATH_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'%')
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~');

/// Characters left untouched when fixing a URL query string
const QUERY_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b':')
    .remove(b'&')
    .remove(b'=')
    .remove(b'%')
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~');

/// Basic sanitizing of a URL: lowercase the host and normalize an empty
/// path to `/`. Unparseable input is returned unchanged.
pub fn basic_sanitizing(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => url.to_string(),
    }
}

/// Fix a URL that contains unsafe characters like spaces, the way a
/// browser would when the user pastes it into the address bar.
///
/// The path and query are percent-encoded; already-encoded sequences are
/// preserved. Used on URLs that come out of feed documents (logo URLs in
/// particular are frequently unescaped).
pub fn url_fix(s: &str) -> String {
    let (rest, fragment) = match s.split_once('#') {
        Some((r, f)) => (r, Some(f)),
        None => (s, None),
    };
    let (rest, query) = match rest.split_once('?') {
        Some((r, q)) => (r, Some(q)),
        None => (rest, None),
    };

    // scheme://netloc is passed through untouched
    let (head, path) = match rest.find("://") {
        Some(idx) => {
            let after = &rest[idx + 3..];
            match after.find('/') {
                Some(slash) => rest.split_at(idx + 3 + slash),
                None => (rest, ""),
            }
        }
        None => ("", rest),
    };

    let mut fixed = String::with_capacity(s.len());
    fixed.push_str(head);
    fixed.push_str(&utf8_percent_encode(path, PATH_SET).to_string());
    if let Some(q) = query {
        fixed.push('?');
        fixed.push_str(&utf8_percent_encode(q, QUERY_SET).to_string().replace("%20", "+"));
    }
    if let Some(f) = fragment {
        fixed.push('#');
        fixed.push_str(f);
    }

    fixed
}
