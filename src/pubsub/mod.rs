//! PubSubHubbub subscriber
//!
//! Implements the subscriber side of PubSubHubbub 0.3: subscription
//! requests to a hub, the verification challenge callback and the
//! update notification callback. Notifications never carry data into
//! the pipeline directly; they invalidate the URL cache and refetch the
//! feed with an extended TTL, so the cache stays the single source of
//! truth for feed bytes.

mod models;
mod store;
mod subscriber;

pub use models::{StoreError, Subscription, SubscriptionMode, SubscriptionStore};
pub use store::JsonSubscriptionStore;
pub use subscriber::{NotifyError, Subscriber, SubscriptionError, VerifyParams};
