use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Key/value cache with per-entry expiry, injected wherever a short-lived
/// memo is needed.
#[async_trait]
pub trait TtlCache<V: Clone + Send + Sync + 'static>: Send + Sync {
    async fn get(&self, key: &str) -> Option<V>;
    async fn set(&self, key: &str, value: V, ttl: Duration);
    async fn forget(&self, key: &str) -> bool;
}

#[derive(Debug)]
pub struct InMemoryTtlCache<V> {
    entries: RwLock<HashMap<String, (V, Instant)>>,
}

impl<V> Default for InMemoryTtlCache<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> InMemoryTtlCache<V> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> TtlCache<V> for InMemoryTtlCache<V> {
    async fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((value, expires_at)) if *expires_at > now => {
                    tracing::trace!(key, "cache hit");
                    return Some(value.clone());
                }
                Some(_) => {}
                None => {
                    tracing::trace!(key, "cache miss");
                    return None;
                }
            }
        }

        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|(_, expires_at)| *expires_at <= now)
        {
            entries.remove(key);
        }
        tracing::trace!(key, "cache expired");
        None
    }

    async fn set(&self, key: &str, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries
            .write()
            .await
            .insert(key.to_owned(), (value, expires_at));
    }

    async fn forget(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }
}

pub mod keys {
    use crate::document::DocumentId;

    pub fn document_jobs(document_id: DocumentId) -> String {
        format!("document_jobs:{document_id}")
    }
}
