use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::fetch::FeedResource;

/// Process-wide response cache keyed by sanitized request URL
///
/// Lookups and inserts are atomic; entries are shared as `Arc` so a
/// revalidation never mutates a resource another request is reading.
#[derive(Default)]
pub struct UrlCache {
    inner: RwLock<HashMap<String, Arc<FeedResource>>>,
}

impl UrlCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<Arc<FeedResource>> {
        self.inner.read().expect("cache lock poisoned").get(url).cloned()
    }

    pub fn insert(&self, url: &str, resource: Arc<FeedResource>) {
        self.inner
            .write()
            .expect("cache lock poisoned")
            .insert(url.to_string(), resource);
    }

    pub fn invalidate(&self, url: &str) -> Option<Arc<FeedResource>> {
        self.inner.write().expect("cache lock poisoned").remove(url)
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
