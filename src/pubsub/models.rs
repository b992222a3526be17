use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Direction of a subscription request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionMode {
    Subscribe,
    Unsubscribe,
}

impl SubscriptionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

impl std::fmt::Display for SubscriptionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One subscription record, keyed by feed URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub url: String,
    pub hub_url: String,
    pub mode: SubscriptionMode,
    pub verify_token: String,
    pub verified: bool,
}

/// Errors raised by subscription persistence
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Abstract persistence for subscription records
///
/// Keeps the subscriber logic independent of the backing storage; the
/// shipped implementation is a JSON file, tests can swap in their own.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn load(&self, url: &str) -> Result<Option<Subscription>, StoreError>;
    async fn save(&self, subscription: &Subscription) -> Result<(), StoreError>;
    async fn delete(&self, url: &str) -> Result<(), StoreError>;
    async fn list(&self) -> Result<Vec<Subscription>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_serialization() {
        assert_eq!(
            serde_json::to_string(&SubscriptionMode::Subscribe).unwrap(),
            "\"subscribe\""
        );
        assert_eq!(SubscriptionMode::Unsubscribe.to_string(), "unsubscribe");
    }

    #[test]
    fn test_subscription_roundtrip() {
        let subscription = Subscription {
            url: "http://example.com/feed".to_string(),
            hub_url: "http://hub.example.com/".to_string(),
            mode: SubscriptionMode::Subscribe,
            verify_token: "token".to_string(),
            verified: true,
        };
        let json = serde_json::to_string(&subscription).unwrap();
        let restored: Subscription = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.url, subscription.url);
        assert_eq!(restored.mode, SubscriptionMode::Subscribe);
        assert!(restored.verified);
    }
}
