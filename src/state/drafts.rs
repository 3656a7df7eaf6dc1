use std::{collections::HashMap, sync::Arc, time::Duration};

use serde_json::Value;
use tokio::sync::Mutex;

use crate::dao::{
    kv::{EphemeralKv, KvError, KvResult},
    models::UserId,
};

/// TTL-backed staging area for game drafts, one hash per composing owner.
///
/// Fields hold free-form JSON so the bot can stage whatever its forms
/// produce; shape is only checked at submission. Every write restarts the
/// owner's TTL, so a draft abandoned mid-compose reaps itself.
///
/// All draft traffic funnels through a single gate, matching the one
/// connection the production deployment gives this store. Shard the gate per
/// owner if composing traffic ever saturates it.
pub struct GameDraftStore {
    kv: Arc<dyn EphemeralKv>,
    ttl: Duration,
    gate: Mutex<()>,
}

impl GameDraftStore {
    /// Create a draft store over the given backend.
    pub fn new(kv: Arc<dyn EphemeralKv>, ttl: Duration) -> Self {
        GameDraftStore {
            kv,
            ttl,
            gate: Mutex::new(()),
        }
    }

    fn key(owner: UserId) -> String {
        format!("draft:{owner}")
    }

    /// Stage one field, restarting the draft's TTL.
    pub async fn set(&self, owner: UserId, field: &str, value: Value) -> KvResult<()> {
        let encoded = serde_json::to_string(&value).map_err(|source| KvError::Codec {
            context: field.to_string(),
            source,
        })?;

        let _gate = self.gate.lock().await;
        self.kv
            .put_field(Self::key(owner), field.to_string(), encoded)
            .await?;
        self.kv.refresh_ttl(Self::key(owner), self.ttl).await
    }

    /// One staged field, when present.
    pub async fn get(&self, owner: UserId, field: &str) -> KvResult<Option<Value>> {
        let _gate = self.gate.lock().await;
        let raw = self.kv.get_field(Self::key(owner), field.to_string()).await?;
        raw.map(|raw| decode(field, &raw)).transpose()
    }

    /// Every staged field of the owner's draft; empty when none exists.
    pub async fn get_all(&self, owner: UserId) -> KvResult<HashMap<String, Value>> {
        let _gate = self.gate.lock().await;
        let fields = self.kv.get_all(Self::key(owner)).await?;
        fields
            .into_iter()
            .map(|(field, raw)| {
                let value = decode(&field, &raw)?;
                Ok((field, value))
            })
            .collect()
    }

    /// Throw the owner's draft away.
    pub async fn clear(&self, owner: UserId) -> KvResult<()> {
        let _gate = self.gate.lock().await;
        self.kv.delete(Self::key(owner)).await
    }
}

fn decode(field: &str, raw: &str) -> KvResult<Value> {
    serde_json::from_str(raw).map_err(|source| KvError::Codec {
        context: field.to_string(),
        source,
    })
}
