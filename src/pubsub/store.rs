use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;

use crate::pubsub::models::{StoreError, Subscription, SubscriptionStore};

/// JSON-file backed subscription store
///
/// All records live in a single `subscriptions.json` inside the data
/// directory; the file is rewritten on every change. Subscription
/// volume is tiny, so simplicity beats granular files here.
pub struct JsonSubscriptionStore {
    path: PathBuf,
    subscriptions: RwLock<HashMap<String, Subscription>>,
}

impl JsonSubscriptionStore {
    /// Open the store in the given data directory, reading any existing
    /// records
    pub async fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let path = data_dir.join("subscriptions.json");

        let subscriptions = match fs::read(&path).await {
            Ok(content) => serde_json::from_slice(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            subscriptions: RwLock::new(subscriptions),
        })
    }

    async fn persist(&self, subscriptions: &HashMap<String, Subscription>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(subscriptions)?;
        fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for JsonSubscriptionStore {
    async fn load(&self, url: &str) -> Result<Option<Subscription>, StoreError> {
        Ok(self.subscriptions.read().await.get(url).cloned())
    }

    async fn save(&self, subscription: &Subscription) -> Result<(), StoreError> {
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.insert(subscription.url.clone(), subscription.clone());
        self.persist(&subscriptions).await
    }

    async fn delete(&self, url: &str) -> Result<(), StoreError> {
        let mut subscriptions = self.subscriptions.write().await;
        if subscriptions.remove(url).is_some() {
            self.persist(&subscriptions).await?;
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.subscriptions.read().await.values().cloned().collect())
    }
}
