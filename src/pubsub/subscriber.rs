use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::constants::network;
use crate::constants::pubsub::{INCREASED_EXPIRY, VERIFY_TOKEN_LENGTH};
use crate::fetch::{FetchOptions, UrlFetcher};
use crate::pubsub::models::{StoreError, Subscription, SubscriptionMode, SubscriptionStore};

/// Errors raised while talking to a hub
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Could not send subscription to Hub: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Subscription has not been accepted by the Hub (status {0})")]
    HubRejected(StatusCode),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Rejections of a notification callback; all map to 400
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("no subscription for this URL")]
    UnknownSubscription,

    #[error("invalid subscription mode")]
    WrongMode,

    #[error("the subscription has not yet been verified")]
    Unverified,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Parameters of the hub's verification GET
#[derive(Debug, Clone)]
pub struct VerifyParams {
    pub mode: String,
    pub topic: String,
    pub challenge: String,
    pub lease_seconds: Option<String>,
    pub verify_token: String,
}

/// PubSubHubbub subscriber
pub struct Subscriber {
    store: Arc<dyn SubscriptionStore>,
    fetcher: Arc<UrlFetcher>,
    client: Client,
    base_url: String,
}

impl Subscriber {
    pub fn new(store: Arc<dyn SubscriptionStore>, fetcher: Arc<UrlFetcher>, base_url: &str) -> Self {
        let client = Client::builder()
            .user_agent(network::USER_AGENT)
            .timeout(network::HTTP_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            store,
            fetcher,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Subscribe to a feed at a hub
    ///
    /// Idempotent for feeds that already have a verified subscription.
    /// The hub is expected to answer 204 and verify asynchronously via
    /// the callback URL.
    pub async fn subscribe(&self, feed_url: &str, hub_url: &str) -> Result<(), SubscriptionError> {
        info!(feed = feed_url, hub = hub_url, "subscribing");
        self.request(feed_url, hub_url, SubscriptionMode::Subscribe)
            .await
    }

    /// Cancel a subscription at the hub; the record is removed once the
    /// hub verifies the unsubscribe
    pub async fn unsubscribe(&self, feed_url: &str, hub_url: &str) -> Result<(), SubscriptionError> {
        info!(feed = feed_url, hub = hub_url, "unsubscribing");
        self.request(feed_url, hub_url, SubscriptionMode::Unsubscribe)
            .await
    }

    async fn request(
        &self,
        feed_url: &str,
        hub_url: &str,
        mode: SubscriptionMode,
    ) -> Result<(), SubscriptionError> {
        if let Some(existing) = self.store.load(feed_url).await? {
            if existing.mode == mode && existing.verified {
                info!(feed = feed_url, %mode, "subscription already exists");
                return Ok(());
            }
            if existing.mode != mode {
                info!(
                    feed = feed_url,
                    old = %existing.mode,
                    new = %mode,
                    "subscription exists with different mode, overwriting"
                );
            }
        }

        let verify_token = generate_verify_token();

        let subscription = Subscription {
            url: feed_url.to_string(),
            hub_url: hub_url.to_string(),
            mode,
            verify_token: verify_token.clone(),
            verified: false,
        };
        self.store.save(&subscription).await?;

        let params = [
            ("hub.callback", self.callback_url(feed_url)),
            ("hub.mode", mode.as_str().to_string()),
            ("hub.topic", feed_url.to_string()),
            ("hub.verify", "sync".to_string()),
            ("hub.verify_token", verify_token),
        ];
        debug!(hub = hub_url, ?params, "sending hub request");

        let response = self.client.post(hub_url).form(&params).send().await?;

        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            warn!(hub = hub_url, %status, "hub rejected the request");
            return Err(SubscriptionError::HubRejected(status));
        }

        Ok(())
    }

    /// Handle the hub's verification GET
    ///
    /// Returns the challenge to echo with 200, or `None` for a 404:
    /// unknown topic, mode mismatch or a wrong verify token. A verified
    /// unsubscribe removes the record.
    pub async fn handle_verify(&self, params: &VerifyParams) -> Result<Option<String>, StoreError> {
        debug!(
            mode = %params.mode,
            topic = %params.topic,
            lease_seconds = ?params.lease_seconds,
            "received subscription verification"
        );

        let Some(mut subscription) = self.store.load(&params.topic).await? else {
            warn!(topic = %params.topic, "subscription does not exist");
            return Ok(None);
        };

        if subscription.mode.as_str() != params.mode {
            warn!(
                topic = %params.topic,
                expected = %subscription.mode,
                "invalid mode"
            );
            return Ok(None);
        }

        if subscription.verify_token != params.verify_token {
            warn!(topic = %params.topic, "invalid verify_token");
            return Ok(None);
        }

        match subscription.mode {
            SubscriptionMode::Subscribe => {
                subscription.verified = true;
                self.store.save(&subscription).await?;
                info!(topic = %params.topic, "subscription confirmed");
            }
            SubscriptionMode::Unsubscribe => {
                self.store.delete(&params.topic).await?;
                info!(topic = %params.topic, "unsubscription confirmed");
            }
        }

        Ok(Some(params.challenge.clone()))
    }

    /// Handle a hub notification for a feed
    ///
    /// Any entries in the notification body are ignored; the whole feed
    /// is refetched through the cache with an increased expiry time.
    pub async fn handle_notify(&self, feed_url: &str) -> Result<(), NotifyError> {
        info!(feed = feed_url, "received update notification");

        let Some(subscription) = self.store.load(feed_url).await? else {
            warn!(feed = feed_url, "no subscription for this URL");
            return Err(NotifyError::UnknownSubscription);
        };

        if subscription.mode != SubscriptionMode::Subscribe {
            warn!(feed = feed_url, mode = %subscription.mode, "invalid subscription mode");
            return Err(NotifyError::WrongMode);
        }

        if !subscription.verified {
            warn!(feed = feed_url, "the subscription has not yet been verified");
            return Err(NotifyError::Unverified);
        }

        let opts = FetchOptions {
            use_cache: false,
            extra_ttl: Some(INCREASED_EXPIRY),
            ..Default::default()
        };
        if let Err(e) = self.fetcher.fetch(feed_url, &opts).await {
            // the notification is still accepted; the next parse will retry
            warn!(feed = feed_url, error = %e, "refetch after notification failed");
        }

        Ok(())
    }

    fn callback_url(&self, feed_url: &str) -> String {
        let query: String =
            url::form_urlencoded::Serializer::new(String::new())
                .append_pair("url", feed_url)
                .finish();
        format!("{}/subscribe?{}", self.base_url, query)
    }
}

/// A fresh random token from `[A-Za-z0-9]`
fn generate_verify_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(VERIFY_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}
