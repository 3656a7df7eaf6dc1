//! Invite broadcasting for approved games.
//!
//! One broadcaster task per invite round delivers invitations at a steady
//! pace so the chat platform never throttles the whole bot for a burst. The
//! task re-checks the persisted game status between sends and winds down as
//! soon as the game leaves the ready status.

use std::{cmp, sync::Arc, time::Duration};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{GameRecord, GameStatus, UserId},
    messaging::{MessageRef, SendError},
    services::notifications,
    state::{InviteRound, InviteSession, SharedEngine},
};

/// Open the invite round for a freshly approved game.
///
/// Notifies the owner, registers the round with the engine and spawns the
/// broadcaster task over the eligible players, in the order given. Returns
/// the registered round.
pub async fn open_round(
    engine: &SharedEngine,
    record: &GameRecord,
    eligible: Vec<UserId>,
) -> Arc<InviteRound> {
    let session = Arc::new(InviteSession::new(eligible.len() as u32));
    let notice = notifications::notify_round_opened(engine, record, eligible.len() as u32).await;
    let round = Arc::new(InviteRound::new(session.clone()));
    engine.install_invite_round(record.id, round.clone()).await;

    let handle = tokio::spawn(run_broadcast(
        engine.clone(),
        record.clone(),
        eligible,
        session,
        notice,
    ));
    round.attach_handle(handle).await;

    info!(
        game_id = %record.id,
        eligible = round.session().eligible_count(),
        "invite round opened"
    );
    round
}

/// Text of one invitation.
pub fn invite_text(record: &GameRecord) -> String {
    format!(
        "You're invited to \"{}\" ({}): {}. Reward: {} starcoins, {} seats. Tap to join!",
        record.title, record.kind, record.description, record.reward_starcoins, record.max_players
    )
}

/// Broadcaster task body: deliver invitations one by one.
async fn run_broadcast(
    engine: SharedEngine,
    record: GameRecord,
    eligible: Vec<UserId>,
    session: Arc<InviteSession>,
    notice: Option<MessageRef>,
) {
    let interval = engine.config().invite_send_interval;
    let text = invite_text(&record);

    for user_id in eligible {
        if session.is_canceled() || !still_ready(&engine, record.id).await {
            break;
        }
        deliver(&engine, &session, user_id, &text, interval).await;
        session.record_attempt();
        tokio::time::sleep(interval).await;
    }

    session.mark_finished();
    debug!(game_id = %record.id, sent = session.sent_count(), "invite broadcast wound down");

    if let Some(notice) = notice {
        let summary = format!(
            "Invites delivered: {} of {}. Accepted so far: {}.",
            session.sent_count(),
            session.eligible_count(),
            session.accepted_count(),
        );
        if let Err(err) = engine.gateway().edit(notice, summary).await {
            debug!(game_id = %record.id, error = %err, "owner invite notice not updated");
        }
    }
}

/// Deliver one invitation, backing off and retrying the same recipient while
/// the platform reports rate limiting. Any other failure skips the
/// recipient.
async fn deliver(
    engine: &SharedEngine,
    session: &InviteSession,
    user_id: UserId,
    text: &str,
    interval: Duration,
) {
    loop {
        match engine.gateway().send(user_id, text.to_string()).await {
            Ok(_) => return,
            Err(SendError::RateLimited { retry_after }) => {
                let pause = cmp::max(retry_after, interval);
                warn!(
                    user_id,
                    pause_ms = pause.as_millis() as u64,
                    "invite delivery throttled; backing off"
                );
                tokio::time::sleep(pause).await;
                if session.is_canceled() {
                    return;
                }
            }
            Err(err) => {
                warn!(user_id, error = %err, "invite delivery failed; skipping recipient");
                return;
            }
        }
    }
}

/// Whether the game still sits in the ready status.
///
/// Storage trouble counts as "not ready": better to stall a round than to
/// keep inviting players into a game nobody can read.
async fn still_ready(engine: &SharedEngine, game_id: Uuid) -> bool {
    match engine.store().find_game(game_id).await {
        Ok(Some(record)) => record.status == GameStatus::Ready,
        Ok(None) => false,
        Err(err) => {
            warn!(game_id = %game_id, error = %err, "game re-check failed; stopping invite round");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::{
        config::EngineConfig,
        dao::{
            kv::InMemoryKv,
            memory::InMemoryStore,
            models::RewardPolicy,
            store::RecordStore,
        },
        economy::GameKind,
        messaging::testing::RecordingGateway,
        state::Engine,
    };

    const OWNER: UserId = 100;

    fn ready_game() -> GameRecord {
        GameRecord {
            id: Uuid::new_v4(),
            owner: OWNER,
            title: "Chess".into(),
            description: "blitz, one board".into(),
            kind: GameKind::Duel,
            reward_starcoins: 5,
            reward_policy: RewardPolicy::FromAllWins,
            min_rang: 1,
            max_rang: 10,
            min_players: 2,
            max_players: 2,
            status: GameStatus::Ready,
            created_at: OffsetDateTime::now_utc(),
            invite_started_at: Some(OffsetDateTime::now_utc()),
            started_at: None,
            ended_at: None,
        }
    }

    async fn engine_with(
        record: &GameRecord,
    ) -> (SharedEngine, Arc<InMemoryStore>, Arc<RecordingGateway>) {
        let store = Arc::new(InMemoryStore::new());
        store.create_game(record.clone()).await.unwrap();
        let gateway = Arc::new(RecordingGateway::new());
        let engine = Engine::new(
            store.clone(),
            Arc::new(InMemoryKv::new()),
            gateway.clone(),
            EngineConfig::default(),
        );
        (engine, store, gateway)
    }

    /// Let the broadcaster task run after the clock moved.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn invites_go_out_one_per_tick() {
        let record = ready_game();
        let (engine, _store, gateway) = engine_with(&record).await;

        let round = open_round(&engine, &record, vec![1, 2, 3]).await;
        settle().await;
        // Owner notice plus the first invite.
        assert_eq!(gateway.recipients(), vec![OWNER, 1]);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(gateway.recipients(), vec![OWNER, 1, 2]);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(gateway.recipients(), vec![OWNER, 1, 2, 3]);
        assert_eq!(round.session().sent_count(), 3);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert!(round.session().is_finished());

        // The owner notice got a completion summary.
        let edits = gateway.edits();
        assert_eq!(edits.len(), 1);
        assert!(edits[0].1.contains("3 of 3"));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_sends_retry_the_same_recipient() {
        let record = ready_game();
        let (engine, _store, gateway) = engine_with(&record).await;

        let round = open_round(&engine, &record, vec![1, 2]).await;
        gateway.fail_next(SendError::RateLimited {
            retry_after: Duration::from_secs(5),
        });
        settle().await;
        // First attempt hit the limiter; nothing delivered yet.
        assert_eq!(gateway.recipients(), vec![OWNER]);

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(gateway.recipients(), vec![OWNER, 1]);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(gateway.recipients(), vec![OWNER, 1, 2]);
        assert_eq!(round.session().sent_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn plain_failures_skip_the_recipient() {
        let record = ready_game();
        let (engine, _store, gateway) = engine_with(&record).await;

        let round = open_round(&engine, &record, vec![1, 2]).await;
        gateway.fail_next(SendError::Delivery("bot blocked".into()));
        settle().await;
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;

        // User 1 was skipped, user 2 still got theirs.
        assert_eq!(gateway.recipients(), vec![OWNER, 2]);
        assert_eq!(round.session().sent_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn round_stops_when_the_game_leaves_ready() {
        let record = ready_game();
        let (engine, store, gateway) = engine_with(&record).await;

        let round = open_round(&engine, &record, vec![1, 2, 3, 4]).await;
        settle().await;
        assert_eq!(round.session().sent_count(), 1);

        let mut flipped = record.clone();
        flipped.status = GameStatus::Active;
        store.update_game(flipped).await.unwrap();

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert!(round.session().is_finished());
        assert_eq!(round.session().sent_count(), 1);
        assert_eq!(gateway.recipients(), vec![OWNER, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn discarding_the_round_stops_the_broadcast() {
        let record = ready_game();
        let (engine, _store, gateway) = engine_with(&record).await;

        let round = open_round(&engine, &record, vec![1, 2, 3, 4]).await;
        settle().await;
        assert_eq!(round.session().sent_count(), 1);

        engine.discard_invite_round(record.id).await;
        assert!(round.session().is_finished());

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(gateway.recipients(), vec![OWNER, 1]);
    }
}
