pub mod drafts;
pub mod invites;
pub mod lifecycle;
pub mod scheduler;
pub mod selection;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    dao::{kv::EphemeralKv, store::RecordStore},
    messaging::MessagingGateway,
};

pub use self::invites::{InviteRound, InviteSession};
pub use self::scheduler::ResourceScheduler;
pub use self::selection::{Page, SelectionCommand, paginate};
use self::{drafts::GameDraftStore, selection::SelectionPanel};

/// Shared handle to the engine, cloned into background tasks.
pub type SharedEngine = Arc<Engine>;

/// Central engine object owning storage handles, in-flight registries and
/// tunables.
///
/// Backends are injected once at construction; everything else (services,
/// timers, broadcasters) borrows them from here. There are no globals, so
/// tests can run any number of engines side by side.
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn RecordStore>,
    gateway: Arc<dyn MessagingGateway>,
    scheduler: Arc<ResourceScheduler>,
    drafts: GameDraftStore,
    selection: SelectionPanel,
    invites: DashMap<Uuid, Arc<InviteRound>>,
    game_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl Engine {
    /// Construct a new [`Engine`] wrapped in an [`Arc`] so background tasks
    /// can hold it.
    pub fn new(
        store: Arc<dyn RecordStore>,
        kv: Arc<dyn EphemeralKv>,
        gateway: Arc<dyn MessagingGateway>,
        config: EngineConfig,
    ) -> SharedEngine {
        let scheduler = Arc::new(ResourceScheduler::new(store.clone(), gateway.clone()));
        let drafts = GameDraftStore::new(kv.clone(), config.draft_ttl);
        let selection = SelectionPanel::new(kv, config.selection_ttl);

        Arc::new(Self {
            config,
            store,
            gateway,
            scheduler,
            drafts,
            selection,
            invites: DashMap::new(),
            game_locks: DashMap::new(),
        })
    }

    /// Engine tunables.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Persistent record store.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Outbound messaging gateway.
    pub fn gateway(&self) -> &Arc<dyn MessagingGateway> {
        &self.gateway
    }

    /// Resource regeneration scheduler.
    pub fn scheduler(&self) -> &Arc<ResourceScheduler> {
        &self.scheduler
    }

    /// Staged game drafts.
    pub fn drafts(&self) -> &GameDraftStore {
        &self.drafts
    }

    /// Winner selection panels.
    pub fn selection(&self) -> &SelectionPanel {
        &self.selection
    }

    /// Mutex serializing lifecycle operations on one game record.
    pub fn game_lock(&self, game_id: Uuid) -> Arc<Mutex<()>> {
        self.game_locks.entry(game_id).or_default().clone()
    }

    /// Live invite round of a game, while one exists.
    pub fn invite_round(&self, game_id: Uuid) -> Option<Arc<InviteRound>> {
        self.invites.get(&game_id).map(|entry| entry.clone())
    }

    /// Register the invite round of a freshly approved game.
    ///
    /// A leftover round under the same id is cancelled first, keeping the
    /// one-round-per-game invariant even if an approval is somehow replayed.
    pub async fn install_invite_round(&self, game_id: Uuid, round: Arc<InviteRound>) {
        if let Some((_, old)) = self.invites.remove(&game_id) {
            debug!(game_id = %game_id, "replacing a live invite round");
            old.cancel_and_wait().await;
        }
        self.invites.insert(game_id, round);
    }

    /// Cancel and drop the invite round of a game, waiting for its
    /// broadcaster to exit. No-op when none is registered.
    pub async fn discard_invite_round(&self, game_id: Uuid) {
        if let Some((_, round)) = self.invites.remove(&game_id) {
            round.cancel_and_wait().await;
        }
    }

    /// Stop every background task the engine spawned.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        let games: Vec<Uuid> = self.invites.iter().map(|entry| *entry.key()).collect();
        for game_id in games {
            self.discard_invite_round(game_id).await;
        }
        info!("engine stopped; background tasks drained");
    }
}
