use thiserror::Error;

use crate::dao::models::GameStatus;

/// Events that move a game record through its lifecycle.
///
/// Submission is not an event: records are born in
/// [`GameStatus::Moderation`]. Everything after that goes through
/// [`next_status`] so the full transition table lives in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Administrator clears the game for invites.
    Approve,
    /// Owner launches the game with its accepted players.
    Start,
    /// Owner withdraws the game before it starts.
    CancelPending,
    /// Owner closes the game and commits results.
    End,
    /// Invite window lapsed without the game starting.
    Expire,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The status the record was in when the invalid event was received.
    pub from: GameStatus,
    /// The event that cannot be applied from this status.
    pub event: LifecycleEvent,
}

/// Compute the status an event leads to, or reject the pair as invalid.
///
/// Terminal statuses accept no event at all, so a finished, canceled or
/// expired record can never be revived.
pub fn next_status(
    from: GameStatus,
    event: LifecycleEvent,
) -> Result<GameStatus, InvalidTransition> {
    let next = match (from, event) {
        (GameStatus::Moderation, LifecycleEvent::Approve) => GameStatus::Ready,
        (GameStatus::Ready, LifecycleEvent::Start) => GameStatus::Active,
        (GameStatus::Moderation, LifecycleEvent::CancelPending)
        | (GameStatus::Ready, LifecycleEvent::CancelPending) => GameStatus::Canceled,
        (GameStatus::Active, LifecycleEvent::End) => GameStatus::Ended,
        (GameStatus::Ready, LifecycleEvent::Expire) => GameStatus::Expired,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}
