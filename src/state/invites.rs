use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, Ordering},
};

use tokio::{sync::Mutex, task::JoinHandle};
use tracing::warn;

/// Live counters for one invite round.
///
/// One session exists per game while it sits in the ready status. The
/// broadcaster task bumps `sent`, accepting players bump `accepted`, and the
/// cancel flag asks the task to stop at its next checkpoint.
#[derive(Debug)]
pub struct InviteSession {
    eligible: u32,
    sent: AtomicU32,
    accepted: AtomicU32,
    canceled: AtomicBool,
    finished: AtomicBool,
}

impl InviteSession {
    /// Create counters for a round targeting `eligible` players.
    pub fn new(eligible: u32) -> Self {
        InviteSession {
            eligible,
            sent: AtomicU32::new(0),
            accepted: AtomicU32::new(0),
            canceled: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    /// Players the round targets in total.
    pub fn eligible_count(&self) -> u32 {
        self.eligible
    }

    /// Invite deliveries attempted so far.
    pub fn sent_count(&self) -> u32 {
        self.sent.load(Ordering::SeqCst)
    }

    /// Players who accepted so far.
    pub fn accepted_count(&self) -> u32 {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Record one delivery attempt.
    pub fn record_attempt(&self) {
        self.sent.fetch_add(1, Ordering::SeqCst);
    }

    /// Claim one seat, keeping the accepted count within `max_players`.
    ///
    /// Returns `false` without changing anything when the round is full, so
    /// two racing accepts can never both land on the last seat.
    pub fn try_reserve_seat(&self, max_players: u32) -> bool {
        self.accepted
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |accepted| {
                (accepted < max_players).then_some(accepted + 1)
            })
            .is_ok()
    }

    /// Give back a seat claimed by [`InviteSession::try_reserve_seat`] after
    /// a downstream failure.
    pub fn release_seat(&self) {
        let _ = self
            .accepted
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |accepted| {
                accepted.checked_sub(1)
            });
    }

    /// Ask the broadcaster to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    /// Whether a cancel was requested.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Mark the broadcaster as done; set by the task itself on exit.
    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    /// Whether the broadcaster has exited.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Registry entry tying an [`InviteSession`] to its broadcaster task.
#[derive(Debug)]
pub struct InviteRound {
    session: Arc<InviteSession>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl InviteRound {
    /// Create a round around freshly made counters. The broadcaster handle
    /// is attached separately once the task has been spawned.
    pub fn new(session: Arc<InviteSession>) -> Self {
        InviteRound {
            session,
            handle: Mutex::new(None),
        }
    }

    /// Counters shared with the broadcaster task.
    pub fn session(&self) -> &Arc<InviteSession> {
        &self.session
    }

    /// Store the spawned broadcaster handle.
    ///
    /// A cancel that raced the spawn wins: the handle is reaped on the spot
    /// instead of being stored.
    pub async fn attach_handle(&self, handle: JoinHandle<()>) {
        let mut slot = self.handle.lock().await;
        if self.session.is_canceled() {
            drop(slot);
            reap(handle).await;
            self.session.mark_finished();
            return;
        }
        *slot = Some(handle);
    }

    /// Stop the broadcaster and wait until it has fully exited.
    ///
    /// Safe to call on a round whose task already finished, and more than
    /// once; later calls are no-ops.
    pub async fn cancel_and_wait(&self) {
        self.session.cancel();
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            reap(handle).await;
        }
        self.session.mark_finished();
    }
}

/// Abort a task and swallow its expected cancellation error.
async fn reap(handle: JoinHandle<()>) {
    handle.abort();
    if let Err(err) = handle.await {
        if !err.is_cancelled() {
            warn!(error = %err, "invite broadcaster terminated abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seats_stop_at_the_limit() {
        let session = InviteSession::new(10);
        assert!(session.try_reserve_seat(2));
        assert!(session.try_reserve_seat(2));
        assert!(!session.try_reserve_seat(2));
        assert_eq!(session.accepted_count(), 2);

        session.release_seat();
        assert!(session.try_reserve_seat(2));
    }

    #[test]
    fn releasing_an_empty_session_does_not_underflow() {
        let session = InviteSession::new(1);
        session.release_seat();
        assert_eq!(session.accepted_count(), 0);
    }

    #[tokio::test]
    async fn cancel_reaps_a_sleeping_broadcaster() {
        let session = Arc::new(InviteSession::new(3));
        let round = InviteRound::new(session.clone());
        let task_session = session.clone();
        let handle = tokio::spawn(async move {
            loop {
                if task_session.is_canceled() {
                    return;
                }
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            }
        });
        round.attach_handle(handle).await;

        round.cancel_and_wait().await;
        assert!(session.is_canceled());
        assert!(session.is_finished());

        // Idempotent.
        round.cancel_and_wait().await;
    }

    #[tokio::test]
    async fn cancel_that_raced_the_spawn_still_wins() {
        let session = Arc::new(InviteSession::new(3));
        let round = InviteRound::new(session.clone());

        round.cancel_and_wait().await;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });
        round.attach_handle(handle).await;

        assert!(session.is_finished());
        assert!(round.handle.lock().await.is_none());
    }
}
