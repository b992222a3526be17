//! PubSubHubbub subscriber flow against a mock hub

use std::sync::Arc;

use feedserve::fetch::UrlFetcher;
use feedserve::pubsub::{
    JsonSubscriptionStore, Subscriber, SubscriptionMode, SubscriptionStore, VerifyParams,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn subscriber_with_store(
    base_url: &str,
) -> (Arc<JsonSubscriptionStore>, Subscriber, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonSubscriptionStore::open(dir.path()).await.unwrap());
    let subscriber = Subscriber::new(
        Arc::clone(&store) as Arc<dyn SubscriptionStore>,
        Arc::new(UrlFetcher::new()),
        base_url,
    );
    (store, subscriber, dir)
}

#[tokio::test]
async fn test_subscribe_and_verify() {
    let hub = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hub"))
        .and(body_string_contains("hub.mode=subscribe"))
        .and(body_string_contains("hub.verify=sync"))
        .and(body_string_contains("hub.topic=http%3A%2F%2Fexample.com%2Ffeed"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&hub)
        .await;

    let (store, subscriber, _dir) = subscriber_with_store("http://callback.example/").await;

    let feed_url = "http://example.com/feed";
    let hub_url = format!("{}/hub", hub.uri());
    subscriber.subscribe(feed_url, &hub_url).await.unwrap();

    let stored = store.load(feed_url).await.unwrap().expect("stored");
    assert_eq!(stored.mode, SubscriptionMode::Subscribe);
    assert!(!stored.verified);
    assert_eq!(stored.verify_token.len(), 32);

    // hub verifies with the stored token: challenge is echoed
    let challenge = subscriber
        .handle_verify(&VerifyParams {
            mode: "subscribe".to_string(),
            topic: feed_url.to_string(),
            challenge: "CHAL".to_string(),
            lease_seconds: Some("86400".to_string()),
            verify_token: stored.verify_token.clone(),
        })
        .await
        .unwrap();
    assert_eq!(challenge.as_deref(), Some("CHAL"));

    let stored = store.load(feed_url).await.unwrap().unwrap();
    assert!(stored.verified);
}

#[tokio::test]
async fn test_verify_with_wrong_token_rejected() {
    let hub = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&hub)
        .await;

    let (store, subscriber, _dir) = subscriber_with_store("http://callback.example/").await;

    let feed_url = "http://example.com/feed";
    subscriber
        .subscribe(feed_url, &format!("{}/hub", hub.uri()))
        .await
        .unwrap();

    let rejected = subscriber
        .handle_verify(&VerifyParams {
            mode: "subscribe".to_string(),
            topic: feed_url.to_string(),
            challenge: "CHAL".to_string(),
            lease_seconds: None,
            verify_token: "wrong-token".to_string(),
        })
        .await
        .unwrap();
    assert!(rejected.is_none());

    // still unverified
    let stored = store.load(feed_url).await.unwrap().unwrap();
    assert!(!stored.verified);
}

#[tokio::test]
async fn test_verify_unknown_topic_rejected() {
    let (_store, subscriber, _dir) = subscriber_with_store("http://callback.example/").await;

    let rejected = subscriber
        .handle_verify(&VerifyParams {
            mode: "subscribe".to_string(),
            topic: "http://unknown.example/feed".to_string(),
            challenge: "CHAL".to_string(),
            lease_seconds: None,
            verify_token: "whatever".to_string(),
        })
        .await
        .unwrap();
    assert!(rejected.is_none());
}

#[tokio::test]
async fn test_hub_rejection_is_an_error() {
    let hub = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&hub)
        .await;

    let (_store, subscriber, _dir) = subscriber_with_store("http://callback.example/").await;

    let result = subscriber
        .subscribe("http://example.com/feed", &format!("{}/hub", hub.uri()))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_subscribe_idempotent_when_verified() {
    let hub = MockServer::start().await;
    // the hub must only be contacted once
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&hub)
        .await;

    let (store, subscriber, _dir) = subscriber_with_store("http://callback.example/").await;

    let feed_url = "http://example.com/feed";
    let hub_url = format!("{}/hub", hub.uri());
    subscriber.subscribe(feed_url, &hub_url).await.unwrap();

    let stored = store.load(feed_url).await.unwrap().unwrap();
    subscriber
        .handle_verify(&VerifyParams {
            mode: "subscribe".to_string(),
            topic: feed_url.to_string(),
            challenge: "C".to_string(),
            lease_seconds: None,
            verify_token: stored.verify_token.clone(),
        })
        .await
        .unwrap();

    // second subscribe is a no-op
    subscriber.subscribe(feed_url, &hub_url).await.unwrap();
}

#[tokio::test]
async fn test_notify_refetches_with_increased_expiry() {
    let feed_server = MockServer::start().await;
    let body = "<rss version=\"2.0\"><channel><title>t</title></channel></rss>";
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/rss+xml"))
        .expect(1)
        .mount(&feed_server)
        .await;

    let hub = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&hub)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonSubscriptionStore::open(dir.path()).await.unwrap());
    let fetcher = Arc::new(UrlFetcher::new());
    let subscriber = Subscriber::new(
        Arc::clone(&store) as Arc<dyn SubscriptionStore>,
        Arc::clone(&fetcher),
        "http://callback.example/",
    );

    let feed_url = format!("{}/feed", feed_server.uri());
    subscriber
        .subscribe(&feed_url, &format!("{}/hub", hub.uri()))
        .await
        .unwrap();

    let stored = store.load(&feed_url).await.unwrap().unwrap();
    subscriber
        .handle_verify(&VerifyParams {
            mode: "subscribe".to_string(),
            topic: feed_url.clone(),
            challenge: "C".to_string(),
            lease_seconds: None,
            verify_token: stored.verify_token.clone(),
        })
        .await
        .unwrap();

    subscriber.handle_notify(&feed_url).await.unwrap();

    // the refetched entry sits in the cache with a long expiry
    let cached = fetcher.cache().get(&feed_url).expect("cached after notify");
    let expires = cached.expires.expect("increased expiry set");
    assert!(expires > chrono::Utc::now() + chrono::Duration::days(6));
}

#[tokio::test]
async fn test_notify_rejected_when_unverified() {
    let hub = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&hub)
        .await;

    let (_store, subscriber, _dir) = subscriber_with_store("http://callback.example/").await;

    let feed_url = "http://example.com/feed";
    subscriber
        .subscribe(feed_url, &format!("{}/hub", hub.uri()))
        .await
        .unwrap();

    // not verified yet: the notification is rejected
    assert!(subscriber.handle_notify(feed_url).await.is_err());
    // and unknown URLs are rejected outright
    assert!(subscriber
        .handle_notify("http://unknown.example/feed")
        .await
        .is_err());
}

#[tokio::test]
async fn test_unsubscribe_verify_deletes_record() {
    let hub = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&hub)
        .await;

    let (store, subscriber, _dir) = subscriber_with_store("http://callback.example/").await;

    let feed_url = "http://example.com/feed";
    let hub_url = format!("{}/hub", hub.uri());
    subscriber.unsubscribe(feed_url, &hub_url).await.unwrap();

    let stored = store.load(feed_url).await.unwrap().unwrap();
    assert_eq!(stored.mode, SubscriptionMode::Unsubscribe);

    subscriber
        .handle_verify(&VerifyParams {
            mode: "unsubscribe".to_string(),
            topic: feed_url.to_string(),
            challenge: "C".to_string(),
            lease_seconds: None,
            verify_token: stored.verify_token.clone(),
        })
        .await
        .unwrap();

    assert!(store.load(feed_url).await.unwrap().is_none());
}
