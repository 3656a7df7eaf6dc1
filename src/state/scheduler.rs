use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::{
    dao::{
        models::{ResourceStateRecord, UserId},
        store::RecordStore,
    },
    economy::ResourceKind,
    error::ServiceError,
    messaging::MessagingGateway,
};

type RegenKey = (UserId, ResourceKind);

#[derive(Debug)]
struct RegenTask {
    generation: u64,
    fire_at: OffsetDateTime,
    handle: JoinHandle<()>,
}

/// Deferred refill scheduler, at most one live timer per `(user, resource)`.
///
/// Spending a resource arms a timer; when it fires, the resource snaps back
/// to full capacity and the owner gets a notice. Timers are process-local:
/// a restart forgets them, and the next spend re-arms from persisted state.
///
/// All mutation of one slot (arming, firing, force refresh, taps routed
/// through [`ResourceScheduler::slot_lock`]) is serialized by a per-key
/// mutex, and every armed timer carries a generation so a wake that lost a
/// race against a newer arm or a force refresh falls out as a no-op.
pub struct ResourceScheduler {
    store: Arc<dyn RecordStore>,
    gateway: Arc<dyn MessagingGateway>,
    tasks: DashMap<RegenKey, RegenTask>,
    locks: DashMap<RegenKey, Arc<Mutex<()>>>,
    generation: AtomicU64,
}

impl ResourceScheduler {
    /// Create a scheduler with no armed timers.
    pub fn new(store: Arc<dyn RecordStore>, gateway: Arc<dyn MessagingGateway>) -> Self {
        ResourceScheduler {
            store,
            gateway,
            tasks: DashMap::new(),
            locks: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Mutex serializing all mutation of one `(user, resource)` slot.
    ///
    /// Callers that change resource state outside the scheduler (taps) must
    /// hold this lock while they read-modify-write, and must release it
    /// before calling [`ResourceScheduler::schedule`].
    pub fn slot_lock(&self, user_id: UserId, kind: ResourceKind) -> Arc<Mutex<()>> {
        self.locks.entry((user_id, kind)).or_default().clone()
    }

    /// Whether a refill timer is currently armed for the slot.
    pub fn pending(&self, user_id: UserId, kind: ResourceKind) -> bool {
        self.tasks.contains_key(&(user_id, kind))
    }

    /// When the armed timer will fire, if one is armed.
    pub fn fire_eta(&self, user_id: UserId, kind: ResourceKind) -> Option<OffsetDateTime> {
        self.tasks.get(&(user_id, kind)).map(|task| task.fire_at)
    }

    /// Arm a refill timer for the slot unless one is already armed or the
    /// resource sits at capacity. Returns whether a timer was armed.
    ///
    /// The delay defaults to the balance-table value for the owner's boost
    /// level, snapshotted now; a boost bought mid-countdown does not shorten
    /// a running timer, it takes effect from the next arm (or a force
    /// refresh).
    pub async fn schedule(
        self: &Arc<Self>,
        user_id: UserId,
        kind: ResourceKind,
        delay: Option<Duration>,
    ) -> Result<bool, ServiceError> {
        let key = (user_id, kind);
        let lock = self.slot_lock(user_id, kind);
        let _guard = lock.lock().await;

        if self.tasks.contains_key(&key) {
            debug!(user_id, kind = %kind, "regen timer already armed");
            return Ok(false);
        }

        let record = self
            .store
            .find_resource(user_id, kind)
            .await?
            .unwrap_or_else(|| ResourceStateRecord::fresh(user_id, kind));
        let capacity = kind.capacity(record.boost_level);
        if record.current >= capacity {
            debug!(user_id, kind = %kind, "resource already at capacity");
            return Ok(false);
        }

        let delay = delay.unwrap_or_else(|| kind.regen_delay(record.boost_level));
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.fire(user_id, kind, generation).await;
        });
        self.tasks.insert(
            key,
            RegenTask {
                generation,
                fire_at: OffsetDateTime::now_utc() + delay,
                handle,
            },
        );
        info!(user_id, kind = %kind, delay_secs = delay.as_secs(), "regen timer armed");
        Ok(true)
    }

    /// Cancel any armed timer and snap the resource straight to capacity.
    ///
    /// Waits for a cancelled timer to fully exit before touching the record,
    /// so the slot is guaranteed to hold no task afterwards. Returns the
    /// capacity the resource was set to.
    pub async fn force_refresh(
        &self,
        user_id: UserId,
        kind: ResourceKind,
    ) -> Result<u32, ServiceError> {
        let key = (user_id, kind);
        let lock = self.slot_lock(user_id, kind);
        let _guard = lock.lock().await;

        if let Some((_, task)) = self.tasks.remove(&key) {
            task.handle.abort();
            if let Err(err) = task.handle.await {
                if !err.is_cancelled() {
                    warn!(user_id, kind = %kind, error = %err, "regen task terminated abnormally");
                }
            }
        }

        let capacity = self.apply_refill(user_id, kind).await?;
        info!(user_id, kind = %kind, capacity, "resource force-refreshed");
        Ok(capacity)
    }

    /// Abort every armed timer; called when the engine shuts down.
    pub async fn shutdown(&self) {
        let keys: Vec<RegenKey> = self.tasks.iter().map(|entry| *entry.key()).collect();
        let mut reaped = 0usize;
        for key in keys {
            if let Some((_, task)) = self.tasks.remove(&key) {
                task.handle.abort();
                let _ = task.handle.await;
                reaped += 1;
            }
        }
        if reaped > 0 {
            info!(count = reaped, "regen timers aborted on shutdown");
        }
    }

    /// Timer body: refill the slot unless this wake has been superseded.
    async fn fire(self: Arc<Self>, user_id: UserId, kind: ResourceKind, generation: u64) {
        let key = (user_id, kind);
        let lock = self.slot_lock(user_id, kind);
        let guard = lock.lock().await;

        let live = self.tasks.get(&key).map(|task| task.generation);
        if live != Some(generation) {
            debug!(user_id, kind = %kind, "stale regen wake, ignoring");
            return;
        }

        let refilled = match self.apply_refill(user_id, kind).await {
            Ok(capacity) => Some(capacity),
            Err(err) => {
                warn!(user_id, kind = %kind, error = %err, "refill failed, retrying once");
                match self.apply_refill(user_id, kind).await {
                    Ok(capacity) => Some(capacity),
                    Err(err) => {
                        error!(user_id, kind = %kind, error = %err, "refill dropped after retry");
                        None
                    }
                }
            }
        };
        self.tasks.remove(&key);
        drop(guard);

        if let Some(capacity) = refilled {
            info!(user_id, kind = %kind, capacity, "resource refilled");
            let text = format!("Your {} is back to full ({capacity})!", kind.label());
            if let Err(err) = self.gateway.send(user_id, text).await {
                debug!(user_id, error = %err, "refill notice dropped");
            }
        }
    }

    /// Read-modify-write the record up to capacity. Must run under the slot
    /// lock.
    async fn apply_refill(&self, user_id: UserId, kind: ResourceKind) -> Result<u32, ServiceError> {
        let mut record = self
            .store
            .find_resource(user_id, kind)
            .await?
            .unwrap_or_else(|| ResourceStateRecord::fresh(user_id, kind));
        let capacity = kind.capacity(record.boost_level);
        record.current = capacity;
        self.store.upsert_resource(record).await?;
        Ok(capacity)
    }
}

#[cfg(test)]
mod tests {
    use std::{io, sync::atomic::AtomicU32};

    use futures::future::BoxFuture;
    use uuid::Uuid;

    use super::*;
    use crate::{
        dao::{
            memory::InMemoryStore,
            models::{GameParticipation, GameRecord, PlayerProfile},
            store::{StorageError, StorageResult},
        },
        messaging::testing::RecordingGateway,
    };

    async fn seeded(current: u32) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let record = ResourceStateRecord {
            user_id: 1,
            kind: ResourceKind::Clicker,
            current,
            boost_level: 0,
        };
        store.upsert_resource(record).await.unwrap();
        store
    }

    /// Let spawned timer tasks run after the clock moved.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn refill_fires_once_after_the_delay() {
        let store = seeded(50).await;
        let gateway = Arc::new(RecordingGateway::new());
        let scheduler = Arc::new(ResourceScheduler::new(store.clone(), gateway.clone()));

        assert!(scheduler.schedule(1, ResourceKind::Clicker, None).await.unwrap());
        assert!(!scheduler.schedule(1, ResourceKind::Clicker, None).await.unwrap());
        assert!(scheduler.pending(1, ResourceKind::Clicker));
        settle().await;

        tokio::time::advance(Duration::from_secs(3599)).await;
        settle().await;
        assert!(scheduler.pending(1, ResourceKind::Clicker));

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;

        let record = store.find_resource(1, ResourceKind::Clicker).await.unwrap().unwrap();
        assert_eq!(record.current, 100);
        assert!(!scheduler.pending(1, ResourceKind::Clicker));
        assert_eq!(gateway.recipients(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn force_refresh_cancels_the_timer_and_tops_up() {
        let store = seeded(10).await;
        let gateway = Arc::new(RecordingGateway::new());
        let scheduler = Arc::new(ResourceScheduler::new(store.clone(), gateway.clone()));

        scheduler.schedule(1, ResourceKind::Clicker, None).await.unwrap();
        let capacity = scheduler.force_refresh(1, ResourceKind::Clicker).await.unwrap();
        assert_eq!(capacity, 100);
        assert!(!scheduler.pending(1, ResourceKind::Clicker));

        let record = store.find_resource(1, ResourceKind::Clicker).await.unwrap().unwrap();
        assert_eq!(record.current, 100);

        // The cancelled timer must not fire later.
        tokio::time::advance(Duration::from_secs(7200)).await;
        settle().await;
        assert!(gateway.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_delay_overrides_the_balance_table() {
        let store = seeded(99).await;
        let gateway = Arc::new(RecordingGateway::new());
        let scheduler = Arc::new(ResourceScheduler::new(store.clone(), gateway.clone()));

        scheduler
            .schedule(1, ResourceKind::Clicker, Some(Duration::from_secs(60)))
            .await
            .unwrap();
        settle().await;

        tokio::time::advance(Duration::from_secs(61)).await;
        settle().await;

        let record = store.find_resource(1, ResourceKind::Clicker).await.unwrap().unwrap();
        assert_eq!(record.current, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn full_resources_never_arm_a_timer() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(RecordingGateway::new());
        let scheduler = Arc::new(ResourceScheduler::new(store.clone(), gateway));

        // No record at all means an untouched, full resource.
        assert!(!scheduler.schedule(1, ResourceKind::Clicker, None).await.unwrap());
        assert!(!scheduler.pending(1, ResourceKind::Clicker));
    }

    /// Store double whose `upsert_resource` fails a scripted number of times.
    struct FlakyStore {
        inner: InMemoryStore,
        upsert_failures: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            FlakyStore {
                inner: InMemoryStore::new(),
                upsert_failures: AtomicU32::new(failures),
            }
        }
    }

    impl RecordStore for FlakyStore {
        fn create_game(&self, game: GameRecord) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.create_game(game)
        }

        fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameRecord>>> {
            self.inner.find_game(id)
        }

        fn update_game(&self, game: GameRecord) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.update_game(game)
        }

        fn delete_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
            self.inner.delete_game(id)
        }

        fn create_participation(
            &self,
            row: GameParticipation,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.create_participation(row)
        }

        fn update_participation(
            &self,
            row: GameParticipation,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.update_participation(row)
        }

        fn list_participants(
            &self,
            game_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Vec<GameParticipation>>> {
            self.inner.list_participants(game_id)
        }

        fn find_profile(
            &self,
            user_id: UserId,
        ) -> BoxFuture<'static, StorageResult<Option<PlayerProfile>>> {
            self.inner.find_profile(user_id)
        }

        fn list_profiles_by_rang(
            &self,
            min: u8,
            max: u8,
        ) -> BoxFuture<'static, StorageResult<Vec<PlayerProfile>>> {
            self.inner.list_profiles_by_rang(min, max)
        }

        fn credit_balance(
            &self,
            user_id: UserId,
            delta: i64,
        ) -> BoxFuture<'static, StorageResult<i64>> {
            self.inner.credit_balance(user_id, delta)
        }

        fn find_resource(
            &self,
            user_id: UserId,
            kind: ResourceKind,
        ) -> BoxFuture<'static, StorageResult<Option<ResourceStateRecord>>> {
            self.inner.find_resource(user_id, kind)
        }

        fn upsert_resource(
            &self,
            record: ResourceStateRecord,
        ) -> BoxFuture<'static, StorageResult<()>> {
            let failing = self
                .upsert_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                    left.checked_sub(1)
                })
                .is_ok();
            if failing {
                return Box::pin(async move {
                    Err(StorageError::unavailable(
                        "injected failure".into(),
                        io::Error::other("boom"),
                    ))
                });
            }
            self.inner.upsert_resource(record)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_write_failure_is_retried() {
        let store = Arc::new(FlakyStore::new(1));
        store
            .inner
            .upsert_resource(ResourceStateRecord {
                user_id: 1,
                kind: ResourceKind::Clicker,
                current: 5,
                boost_level: 0,
            })
            .await
            .unwrap();
        let gateway = Arc::new(RecordingGateway::new());
        let scheduler = Arc::new(ResourceScheduler::new(store.clone(), gateway.clone()));

        scheduler.schedule(1, ResourceKind::Clicker, None).await.unwrap();
        settle().await;
        tokio::time::advance(Duration::from_secs(3601)).await;
        settle().await;

        let record = store.find_resource(1, ResourceKind::Clicker).await.unwrap().unwrap();
        assert_eq!(record.current, 100, "retry should have landed the refill");
        assert_eq!(gateway.recipients(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_write_failure_drops_the_refill() {
        let store = Arc::new(FlakyStore::new(2));
        store
            .inner
            .upsert_resource(ResourceStateRecord {
                user_id: 1,
                kind: ResourceKind::Clicker,
                current: 5,
                boost_level: 0,
            })
            .await
            .unwrap();
        let gateway = Arc::new(RecordingGateway::new());
        let scheduler = Arc::new(ResourceScheduler::new(store.clone(), gateway.clone()));

        scheduler.schedule(1, ResourceKind::Clicker, None).await.unwrap();
        settle().await;
        tokio::time::advance(Duration::from_secs(3601)).await;
        settle().await;

        let record = store.find_resource(1, ResourceKind::Clicker).await.unwrap().unwrap();
        assert_eq!(record.current, 5, "failed refill must not change the record");
        assert!(!scheduler.pending(1, ResourceKind::Clicker));
        assert!(gateway.sent().is_empty(), "no notice for a dropped refill");
    }
}
