pub mod config;
pub mod constants;
pub mod fetch;
pub mod mimetype;
pub mod parse;
pub mod pubsub;
pub mod server;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use fetch::{FeedResource, FetchError, FetchOptions, UrlCache, UrlFetcher};
pub use parse::{Feed, ParseContext, ParseOptions, ParserRegistry};
pub use pubsub::{Subscriber, Subscription};
