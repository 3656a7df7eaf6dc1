use std::error::Error;

use futures::future::BoxFuture;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    dao::models::{GameParticipation, GameRecord, PlayerProfile, ResourceStateRecord, UserId},
    economy::ResourceKind,
};

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Backend-agnostic failure raised by [`RecordStore`] implementations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not serve the request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// What the backend was asked to do when it failed.
        message: String,
        /// Underlying backend failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Wrap a backend failure, keeping it as the error source.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Abstraction over the persistence layer for games, participations, player
/// profiles and resource regeneration state.
///
/// Game records and participations are fully owned by the engine. Profiles
/// belong to the account service; the engine only reads rang/balance and
/// credits payouts through [`RecordStore::credit_balance`].
pub trait RecordStore: Send + Sync {
    fn create_game(&self, game: GameRecord) -> BoxFuture<'static, StorageResult<()>>;
    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameRecord>>>;
    fn update_game(&self, game: GameRecord) -> BoxFuture<'static, StorageResult<()>>;
    /// Remove the game and its participations; `false` when nothing matched.
    fn delete_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    fn create_participation(
        &self,
        row: GameParticipation,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn update_participation(
        &self,
        row: GameParticipation,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Participations of one game, in join order (owner row first).
    fn list_participants(
        &self,
        game_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<GameParticipation>>>;
    fn find_profile(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerProfile>>>;
    /// Profiles whose rang falls inside `min..=max`, ordered by user id.
    fn list_profiles_by_rang(
        &self,
        min: u8,
        max: u8,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerProfile>>>;
    /// Atomically add `delta` starcoins and return the new balance.
    fn credit_balance(
        &self,
        user_id: UserId,
        delta: i64,
    ) -> BoxFuture<'static, StorageResult<i64>>;
    fn find_resource(
        &self,
        user_id: UserId,
        kind: ResourceKind,
    ) -> BoxFuture<'static, StorageResult<Option<ResourceStateRecord>>>;
    fn upsert_resource(
        &self,
        record: ResourceStateRecord,
    ) -> BoxFuture<'static, StorageResult<()>>;
}
