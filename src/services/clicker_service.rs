//! The tap path of the clicker mini-games.
//!
//! A tap spends one unit of a regenerating resource, pays out starcoins for
//! it and arms the refill timer. This is where the mini-games meet the
//! [`crate::state::ResourceScheduler`]: taps and timer fires serialize on the
//! same per-slot lock.

use time::OffsetDateTime;
use tracing::debug;

use crate::{
    dao::models::{ResourceStateRecord, UserId},
    economy::ResourceKind,
    error::ServiceError,
    services::notifications,
    state::SharedEngine,
};

/// What one accepted tap produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapOutcome {
    /// Resource units left after the spend.
    pub remaining: u32,
    /// Starcoins the tap paid out.
    pub earned: u64,
    /// Starcoin balance after the payout landed.
    pub balance: i64,
}

/// Spend one unit of `kind`, credit the payout and arm the refill timer.
///
/// Fails with a capacity error carrying the refill ETA when the resource is
/// drained. A storage failure between the spend and the payout leaves the
/// unit spent; the error surfaces either way.
pub async fn tap(
    engine: &SharedEngine,
    user_id: UserId,
    kind: ResourceKind,
) -> Result<TapOutcome, ServiceError> {
    notifications::surface(engine, "tap", run_tap(engine, user_id, kind).await).await
}

async fn run_tap(
    engine: &SharedEngine,
    user_id: UserId,
    kind: ResourceKind,
) -> Result<TapOutcome, ServiceError> {
    let scheduler = engine.scheduler();
    let lock = scheduler.slot_lock(user_id, kind);
    let guard = lock.lock().await;

    let mut record = engine
        .store()
        .find_resource(user_id, kind)
        .await?
        .unwrap_or_else(|| ResourceStateRecord::fresh(user_id, kind));

    if record.current == 0 {
        drop(guard);
        // Timers do not survive a restart; a drained slot with no timer gets
        // one armed here so the user is never stuck at zero.
        scheduler.schedule(user_id, kind, None).await?;
        return Err(ServiceError::Capacity(depleted_message(engine, user_id, kind)));
    }

    let payout = kind.value_by_level(record.boost_level).payout;
    record.current -= 1;
    let remaining = record.current;
    engine.store().upsert_resource(record).await?;
    let balance = engine.store().credit_balance(user_id, payout as i64).await?;
    drop(guard);

    scheduler.schedule(user_id, kind, None).await?;
    debug!(user_id, kind = %kind, remaining, earned = payout, "tap accepted");
    Ok(TapOutcome {
        remaining,
        earned: payout,
        balance,
    })
}

/// User-facing refusal for a drained resource, with the refill ETA when a
/// timer is armed.
fn depleted_message(engine: &SharedEngine, user_id: UserId, kind: ResourceKind) -> String {
    match engine.scheduler().fire_eta(user_id, kind) {
        Some(eta) => {
            let left = (eta - OffsetDateTime::now_utc()).whole_seconds().max(0);
            if left >= 60 {
                format!(
                    "no {} left; refill in about {} min",
                    kind.label(),
                    (left as u64).div_ceil(60)
                )
            } else {
                format!("no {} left; refill in about {left} s", kind.label())
            }
        }
        None => format!("no {} left", kind.label()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::EngineConfig,
        dao::{kv::InMemoryKv, memory::InMemoryStore, store::RecordStore},
        messaging::NullGateway,
        state::Engine,
    };

    const USER: UserId = 7;

    async fn engine_with_resource(current: u32, boost_level: u8) -> SharedEngine {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_resource(ResourceStateRecord {
                user_id: USER,
                kind: ResourceKind::Clicker,
                current,
                boost_level,
            })
            .await
            .unwrap();
        Engine::new(
            store,
            Arc::new(InMemoryKv::new()),
            Arc::new(NullGateway),
            EngineConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn a_tap_spends_one_unit_and_pays_out() {
        let engine = engine_with_resource(100, 0).await;

        let outcome = tap(&engine, USER, ResourceKind::Clicker).await.unwrap();
        assert_eq!(outcome.remaining, 99);
        assert_eq!(outcome.earned, 1);
        assert_eq!(outcome.balance, 1);
        assert!(engine.scheduler().pending(USER, ResourceKind::Clicker));
    }

    #[tokio::test(start_paused = true)]
    async fn first_tap_of_a_new_user_starts_from_a_fresh_record() {
        let engine = Engine::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryKv::new()),
            Arc::new(NullGateway),
            EngineConfig::default(),
        );

        let outcome = tap(&engine, USER, ResourceKind::Clicker).await.unwrap();
        assert_eq!(outcome.remaining, 99);
    }

    #[tokio::test(start_paused = true)]
    async fn boost_level_raises_the_payout() {
        let engine = engine_with_resource(450, 4).await;

        let outcome = tap(&engine, USER, ResourceKind::Clicker).await.unwrap();
        assert_eq!(outcome.earned, 3);
        assert_eq!(outcome.balance, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn geo_hunt_taps_use_their_own_table() {
        let store = Arc::new(InMemoryStore::new());
        let engine = Engine::new(
            store,
            Arc::new(InMemoryKv::new()),
            Arc::new(NullGateway),
            EngineConfig::default(),
        );

        let outcome = tap(&engine, USER, ResourceKind::GeoHunt).await.unwrap();
        assert_eq!(outcome.remaining, 2);
        assert_eq!(outcome.earned, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn a_drained_slot_refuses_the_tap_and_reports_the_eta() {
        let engine = engine_with_resource(1, 0).await;

        tap(&engine, USER, ResourceKind::Clicker).await.unwrap();
        let err = tap(&engine, USER, ResourceKind::Clicker).await.unwrap_err();
        match err {
            ServiceError::Capacity(message) => {
                assert!(message.contains("refill in about"), "{message}");
            }
            other => panic!("expected a capacity refusal, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn a_drained_slot_with_no_timer_arms_one() {
        let engine = engine_with_resource(0, 0).await;
        assert!(!engine.scheduler().pending(USER, ResourceKind::Clicker));

        let err = tap(&engine, USER, ResourceKind::Clicker).await.unwrap_err();
        assert!(matches!(err, ServiceError::Capacity(_)));
        assert!(engine.scheduler().pending(USER, ResourceKind::Clicker));
    }
}
