use std::{collections::HashMap, error::Error, time::Duration};

use dashmap::DashMap;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::time::Instant;

/// Result alias for ephemeral store operations.
pub type KvResult<T> = Result<T, KvError>;

/// Error raised by ephemeral key-value backends.
#[derive(Debug, Error)]
pub enum KvError {
    /// The backend could not serve the request.
    #[error("ephemeral store unavailable: {message}")]
    Unavailable {
        /// What the backend was asked to do when it failed.
        message: String,
        /// Underlying backend failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A stored value could not be decoded back into JSON.
    #[error("stored value under `{context}` is not valid JSON")]
    Codec {
        /// Field or key whose value failed to decode.
        context: String,
        /// The decode failure itself.
        #[source]
        source: serde_json::Error,
    },
}

impl KvError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        KvError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Abstraction over a hash-style ephemeral store with per-key expiry.
///
/// Keys hold field/value hashes and vanish wholesale when their TTL lapses.
/// Writers are expected to call [`EphemeralKv::refresh_ttl`] after each
/// mutation so an abandoned key eventually reaps itself.
pub trait EphemeralKv: Send + Sync {
    fn put_field(
        &self,
        key: String,
        field: String,
        value: String,
    ) -> BoxFuture<'static, KvResult<()>>;
    fn get_field(
        &self,
        key: String,
        field: String,
    ) -> BoxFuture<'static, KvResult<Option<String>>>;
    /// Full field/value map under `key`; empty when the key is absent.
    fn get_all(&self, key: String) -> BoxFuture<'static, KvResult<HashMap<String, String>>>;
    fn remove_field(&self, key: String, field: String) -> BoxFuture<'static, KvResult<()>>;
    fn delete(&self, key: String) -> BoxFuture<'static, KvResult<()>>;
    /// Restart the expiry countdown for `key`; no-op when the key is absent.
    fn refresh_ttl(&self, key: String, ttl: Duration) -> BoxFuture<'static, KvResult<()>>;
}

#[derive(Debug, Default)]
struct HashEntry {
    fields: HashMap<String, String>,
    expires_at: Option<Instant>,
}

/// Process-local [`EphemeralKv`] backend.
///
/// Expiry is lazy: a key past its deadline is dropped by the next operation
/// that touches it. Good enough for single-process deployments and tests; a
/// Redis-backed implementation slots in behind the same trait.
#[derive(Debug, Default)]
pub struct InMemoryKv {
    entries: DashMap<String, HashEntry>,
}

impl InMemoryKv {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn drop_if_expired(&self, key: &str) {
        let now = Instant::now();
        self.entries
            .remove_if(key, |_, entry| entry.expires_at.is_some_and(|at| at <= now));
    }
}

impl EphemeralKv for InMemoryKv {
    fn put_field(
        &self,
        key: String,
        field: String,
        value: String,
    ) -> BoxFuture<'static, KvResult<()>> {
        self.drop_if_expired(&key);
        self.entries
            .entry(key)
            .or_default()
            .fields
            .insert(field, value);
        Box::pin(async move { Ok(()) })
    }

    fn get_field(
        &self,
        key: String,
        field: String,
    ) -> BoxFuture<'static, KvResult<Option<String>>> {
        self.drop_if_expired(&key);
        let value = self
            .entries
            .get(&key)
            .and_then(|entry| entry.fields.get(&field).cloned());
        Box::pin(async move { Ok(value) })
    }

    fn get_all(&self, key: String) -> BoxFuture<'static, KvResult<HashMap<String, String>>> {
        self.drop_if_expired(&key);
        let fields = self
            .entries
            .get(&key)
            .map(|entry| entry.fields.clone())
            .unwrap_or_default();
        Box::pin(async move { Ok(fields) })
    }

    fn remove_field(&self, key: String, field: String) -> BoxFuture<'static, KvResult<()>> {
        self.drop_if_expired(&key);
        if let Some(mut entry) = self.entries.get_mut(&key) {
            entry.fields.remove(&field);
        }
        // Hashes behave like Redis: removing the last field removes the key.
        self.entries.remove_if(&key, |_, entry| entry.fields.is_empty());
        Box::pin(async move { Ok(()) })
    }

    fn delete(&self, key: String) -> BoxFuture<'static, KvResult<()>> {
        self.entries.remove(&key);
        Box::pin(async move { Ok(()) })
    }

    fn refresh_ttl(&self, key: String, ttl: Duration) -> BoxFuture<'static, KvResult<()>> {
        self.drop_if_expired(&key);
        if let Some(mut entry) = self.entries.get_mut(&key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Box::pin(async move { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fields_are_scoped_per_key() {
        let kv = InMemoryKv::new();
        kv.put_field("a".into(), "x".into(), "1".into())
            .await
            .unwrap();
        kv.put_field("b".into(), "x".into(), "2".into())
            .await
            .unwrap();

        let got = kv.get_field("a".into(), "x".into()).await.unwrap();
        assert_eq!(got.as_deref(), Some("1"));
        assert_eq!(kv.get_all("b".into()).await.unwrap().len(), 1);

        kv.delete("a".into()).await.unwrap();
        assert!(kv.get_all("a".into()).await.unwrap().is_empty());
        assert_eq!(kv.get_all("b".into()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn removing_the_last_field_drops_the_key() {
        let kv = InMemoryKv::new();
        kv.put_field("k".into(), "only".into(), "v".into())
            .await
            .unwrap();
        kv.remove_field("k".into(), "only".into()).await.unwrap();
        assert!(kv.entries.get("k").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn keys_expire_after_their_ttl() {
        let kv = InMemoryKv::new();
        kv.put_field("k".into(), "f".into(), "v".into())
            .await
            .unwrap();
        kv.refresh_ttl("k".into(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!kv.get_all("k".into()).await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(kv.get_all("k".into()).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn refreshing_restarts_the_countdown() {
        let kv = InMemoryKv::new();
        kv.put_field("k".into(), "f".into(), "v".into())
            .await
            .unwrap();
        kv.refresh_ttl("k".into(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;
        kv.refresh_ttl("k".into(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(
            !kv.get_all("k".into()).await.unwrap().is_empty(),
            "key expired despite the refresh"
        );
    }
}
