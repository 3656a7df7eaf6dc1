use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{
    dao::{
        models::{GameParticipation, GameRecord, PlayerProfile, ResourceStateRecord, UserId},
        store::{RecordStore, StorageResult},
    },
    economy::ResourceKind,
};

/// Process-local [`RecordStore`] backend.
///
/// Backs tests and single-process deployments; a database-backed
/// implementation slots in behind the same trait.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    games: DashMap<Uuid, GameRecord>,
    participations: DashMap<Uuid, Vec<GameParticipation>>,
    profiles: DashMap<UserId, PlayerProfile>,
    resources: DashMap<(UserId, ResourceKind), ResourceStateRecord>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a player profile.
    ///
    /// Profile creation belongs to the account service, so [`RecordStore`]
    /// has no method for it; embedders and tests seed profiles directly.
    pub fn insert_profile(&self, profile: PlayerProfile) {
        self.profiles.insert(profile.user_id, profile);
    }
}

impl RecordStore for InMemoryStore {
    fn create_game(&self, game: GameRecord) -> BoxFuture<'static, StorageResult<()>> {
        self.games.insert(game.id, game);
        Box::pin(async move { Ok(()) })
    }

    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameRecord>>> {
        let found = self.games.get(&id).map(|entry| entry.clone());
        Box::pin(async move { Ok(found) })
    }

    fn update_game(&self, game: GameRecord) -> BoxFuture<'static, StorageResult<()>> {
        self.games.insert(game.id, game);
        Box::pin(async move { Ok(()) })
    }

    fn delete_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let removed = self.games.remove(&id).is_some();
        self.participations.remove(&id);
        Box::pin(async move { Ok(removed) })
    }

    fn create_participation(
        &self,
        row: GameParticipation,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.participations.entry(row.game_id).or_default().push(row);
        Box::pin(async move { Ok(()) })
    }

    fn update_participation(
        &self,
        row: GameParticipation,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let mut rows = self.participations.entry(row.game_id).or_default();
        match rows.iter_mut().find(|existing| existing.user_id == row.user_id) {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
        Box::pin(async move { Ok(()) })
    }

    fn list_participants(
        &self,
        game_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<GameParticipation>>> {
        let rows = self
            .participations
            .get(&game_id)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        Box::pin(async move { Ok(rows) })
    }

    fn find_profile(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerProfile>>> {
        let found = self.profiles.get(&user_id).map(|entry| entry.clone());
        Box::pin(async move { Ok(found) })
    }

    fn list_profiles_by_rang(
        &self,
        min: u8,
        max: u8,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerProfile>>> {
        let mut matched: Vec<PlayerProfile> = self
            .profiles
            .iter()
            .filter(|entry| (min..=max).contains(&entry.rang))
            .map(|entry| entry.clone())
            .collect();
        matched.sort_by_key(|profile| profile.user_id);
        Box::pin(async move { Ok(matched) })
    }

    fn credit_balance(&self, user_id: UserId, delta: i64) -> BoxFuture<'static, StorageResult<i64>> {
        let mut profile = self.profiles.entry(user_id).or_insert_with(|| PlayerProfile {
            user_id,
            rang: 1,
            balance: 0,
        });
        profile.balance += delta;
        let balance = profile.balance;
        Box::pin(async move { Ok(balance) })
    }

    fn find_resource(
        &self,
        user_id: UserId,
        kind: ResourceKind,
    ) -> BoxFuture<'static, StorageResult<Option<ResourceStateRecord>>> {
        let found = self
            .resources
            .get(&(user_id, kind))
            .map(|entry| entry.clone());
        Box::pin(async move { Ok(found) })
    }

    fn upsert_resource(
        &self,
        record: ResourceStateRecord,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.resources.insert((record.user_id, record.kind), record);
        Box::pin(async move { Ok(()) })
    }
}
