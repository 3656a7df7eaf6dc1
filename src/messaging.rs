//! Outbound messaging seam between the engine and the chat platform.
//!
//! The engine never talks to the platform API directly; it formats text and
//! hands it to a [`MessagingGateway`] supplied by the embedding bot. That
//! keeps delivery concerns (API clients, markup, retries-after-restart) out
//! of the game logic and makes every notification observable in tests.

use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::dao::models::UserId;

/// Handle to a delivered message, usable for later edits.
pub type MessageRef = i64;

/// Error returned by gateway delivery attempts.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// The platform throttled us; retry after the given pause.
    #[error("rate limited, retry in {retry_after:?}")]
    RateLimited {
        /// Pause requested by the platform before the next attempt.
        retry_after: Duration,
    },
    /// Any other delivery failure (blocked bot, deleted account, outage).
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Outbound messaging operations the engine needs from the bot layer.
pub trait MessagingGateway: Send + Sync {
    /// Deliver a text message to a user's private chat.
    fn send(
        &self,
        user_id: UserId,
        text: String,
    ) -> BoxFuture<'static, Result<MessageRef, SendError>>;
    /// Replace the text of a previously delivered message.
    fn edit(&self, message: MessageRef, text: String) -> BoxFuture<'static, Result<(), SendError>>;
}

/// Gateway that silently drops every message.
///
/// Useful for headless runs and tests that do not care about notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGateway;

impl MessagingGateway for NullGateway {
    fn send(
        &self,
        _user_id: UserId,
        _text: String,
    ) -> BoxFuture<'static, Result<MessageRef, SendError>> {
        Box::pin(async move { Ok(0) })
    }

    fn edit(
        &self,
        _message: MessageRef,
        _text: String,
    ) -> BoxFuture<'static, Result<(), SendError>> {
        Box::pin(async move { Ok(()) })
    }
}
