use thiserror::Error;

use crate::{
    dao::{kv::KvError, store::StorageError},
    state::lifecycle::InvalidTransition,
};

/// Errors that can occur in service layer operations.
///
/// Every public engine operation returns this type. Variants that carry a
/// message are safe to surface verbatim in a chat reply; `Storage` and
/// `Ephemeral` wrap backend failures and should be reported to the operator
/// instead of the end user.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Persistent record store is unavailable.
    #[error("storage unavailable")]
    Storage(#[source] StorageError),
    /// Ephemeral key-value store is unavailable.
    #[error("ephemeral store unavailable")]
    Ephemeral(#[source] KvError),
    /// Invalid or incomplete input provided by the player.
    #[error("invalid input: {0}")]
    Validation(String),
    /// Requested record was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Operation cannot be performed in the current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Participant or resource bounds were exceeded.
    #[error("capacity: {0}")]
    Capacity(String),
    /// Player does not qualify for the operation.
    #[error("not eligible: {0}")]
    Eligibility(String),
    /// Operation raced with a concurrent change and lost.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl ServiceError {
    /// Whether the error stems from a backend outage rather than player input.
    ///
    /// Infrastructure failures get reported to the operator channel; every
    /// other variant is answered to the player who triggered it.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, ServiceError::Storage(_) | ServiceError::Ephemeral(_))
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Storage(err)
    }
}

impl From<KvError> for ServiceError {
    fn from(err: KvError) -> Self {
        ServiceError::Ephemeral(err)
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}
