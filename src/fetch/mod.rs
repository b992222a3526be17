//! Cache-aware URL fetching
//!
//! This module provides conditional HTTP fetching with redirect-chain
//! tracking and a process-wide response cache. Permanent redirects (301)
//! are recorded but not followed so callers can surface them as a feed's
//! new location; temporary redirects are followed and collected.

mod cache;
mod client;
mod resource;

pub use cache::UrlCache;
pub use client::{FetchOptions, UrlFetcher};
pub use resource::FeedResource;

use reqwest::StatusCode;

/// Errors that can occur while fetching a URL
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error {status} for {url}")]
    Status { url: String, status: StatusCode },

    #[error("Too many redirects for {0}")]
    TooManyRedirects(String),

    #[error("Not modified")]
    NotModified,
}

impl FetchError {
    /// True when the server answered 403 Forbidden
    pub fn is_forbidden(&self) -> bool {
        matches!(self, FetchError::Status { status, .. } if *status == StatusCode::FORBIDDEN)
    }
}
