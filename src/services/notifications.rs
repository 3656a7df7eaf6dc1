//! Chat notices sent through the messaging gateway.
//!
//! Delivery here is best-effort: a dropped notice is logged and never fails
//! the operation that produced it. The one exception is
//! [`report_failure`], which escalates engine faults to the operator chat.

use tracing::{error, warn};

use crate::{
    dao::models::{GameParticipation, GameRecord, ParticipationResult, UserId},
    error::ServiceError,
    messaging::MessageRef,
    state::SharedEngine,
};

/// Deliver a text to one user, swallowing failures.
///
/// Returns the message handle when the platform accepted the send, so
/// callers can edit the notice later.
pub async fn notify_user(
    engine: &SharedEngine,
    user_id: UserId,
    text: String,
) -> Option<MessageRef> {
    match engine.gateway().send(user_id, text).await {
        Ok(message) => Some(message),
        Err(err) => {
            warn!(user_id, error = %err, "notification dropped");
            None
        }
    }
}

/// Tell the owner their game cleared moderation and invites are going out.
pub async fn notify_round_opened(
    engine: &SharedEngine,
    record: &GameRecord,
    eligible: u32,
) -> Option<MessageRef> {
    let text = format!(
        "\"{}\" was approved! Inviting {} eligible players now.",
        record.title, eligible
    );
    notify_user(engine, record.owner, text).await
}

/// Tell the owner another player took a seat.
pub async fn notify_player_joined(
    engine: &SharedEngine,
    record: &GameRecord,
    player: UserId,
    accepted: u32,
) {
    let text = format!(
        "A player joined \"{}\" ({accepted}/{} seats taken).",
        record.title, record.max_players
    );
    let _ = notify_user(engine, record.owner, text).await;
    let _ = notify_user(
        engine,
        player,
        format!("You're in! \"{}\" starts once the host launches it.", record.title),
    )
    .await;
}

/// Tell every accepted player the game is underway.
pub async fn notify_game_started(engine: &SharedEngine, record: &GameRecord, players: &[UserId]) {
    for &player in players {
        let text = format!("\"{}\" has started. Good luck!", record.title);
        let _ = notify_user(engine, player, text).await;
    }
}

/// Tell the owner and every accepted player the game was withdrawn.
pub async fn notify_game_canceled(engine: &SharedEngine, record: &GameRecord, players: &[UserId]) {
    let _ = notify_user(
        engine,
        record.owner,
        format!("\"{}\" was canceled.", record.title),
    )
    .await;
    for &player in players {
        let text = format!("\"{}\" was canceled by its host.", record.title);
        let _ = notify_user(engine, player, text).await;
    }
}

/// Tell the owner their game lapsed without enough players.
pub async fn notify_game_expired(engine: &SharedEngine, record: &GameRecord) {
    let text = format!(
        "\"{}\" expired: not enough players accepted in time.",
        record.title
    );
    let _ = notify_user(engine, record.owner, text).await;
}

/// Send each participant their personal result once a game has ended.
pub async fn notify_results(
    engine: &SharedEngine,
    record: &GameRecord,
    rows: &[GameParticipation],
) {
    for row in rows {
        let text = match row.result {
            ParticipationResult::Win => format!(
                "You won \"{}\"! {} starcoins credited.",
                record.title, row.reward_amount
            ),
            ParticipationResult::Draw => format!("\"{}\" ended in a draw.", record.title),
            _ => format!("\"{}\" has ended. Better luck next time!", record.title),
        };
        let _ = notify_user(engine, row.user_id, text).await;
    }
}

/// Escalate an engine fault to the operator chat.
///
/// Always logged; the chat notice goes out only when an operator chat is
/// configured.
pub async fn report_failure(engine: &SharedEngine, operation: &str, err: &ServiceError) {
    error!(operation, error = %err, "engine operation failed");
    let Some(operator) = engine.config().operator else {
        return;
    };

    let text = format!("Engine failure in `{operation}`: {err}");
    if let Err(send_err) = engine.gateway().send(operator, text).await {
        warn!(error = %send_err, "operator report dropped");
    }
}

/// Pass an operation result through, reporting infrastructure failures to
/// the operator on the way.
///
/// Domain failures (validation, capacity, eligibility and the like) belong
/// to the calling user and are handed back silently.
pub async fn surface<T>(
    engine: &SharedEngine,
    operation: &str,
    result: Result<T, ServiceError>,
) -> Result<T, ServiceError> {
    if let Err(err) = &result {
        if err.is_infrastructure() {
            report_failure(engine, operation, err).await;
        }
    }
    result
}
