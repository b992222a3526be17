//! Application-wide constants
//!
//! This module centralizes magic numbers and configuration defaults used throughout
//! the service, making them easier to maintain and understand.

use std::time::Duration;

/// Network-related constants
pub mod network {
    use super::*;

    /// Timeout for outbound HTTP requests (feeds, logos, APIs)
    pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

    /// Timeout for establishing a connection
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Maximum number of redirects followed for a single fetch
    pub const MAX_REDIRECTS: usize = 10;

    /// User agent string for outbound HTTP requests
    pub const USER_AGENT: &str = concat!(
        "feedserve/",
        env!("CARGO_PKG_VERSION"),
        " +https://github.com/lqdev/feedserve"
    );
}

/// Content-type classification constants
pub mod mimetype {
    /// A podcast is considered to be of a given type if at least this
    /// ratio of its files classify as that type.
    pub const TYPE_THRESHOLD: f64 = 0.2;
}

/// PubSubHubbub subscriber constants
pub mod pubsub {
    use super::*;

    /// Additive cache TTL applied when a hub notifies us of a change.
    /// Subscribed feeds are pushed, so their cached copy can live longer.
    pub const INCREASED_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    /// Length of the random verify token sent to the hub
    pub const VERIFY_TOKEN_LENGTH: usize = 32;
}

/// Soundcloud API constants
pub mod soundcloud {
    /// Maximum number of tracks requested per user
    pub const TRACK_LIMIT: usize = 200;
}
