use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::economy::{GameKind, ResourceKind};

/// Numeric user identifier assigned by the chat platform.
pub type UserId = i64;

/// Lifecycle status stored on a [`GameRecord`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Submitted, waiting for an administrator verdict.
    Moderation,
    /// Approved; invite round open, players may accept.
    Ready,
    /// Underway with a locked participant list.
    Active,
    /// Finished with results and payouts committed.
    Ended,
    /// Withdrawn before it started.
    Canceled,
    /// Invite window closed without enough players.
    Expired,
}

impl GameStatus {
    /// Whether the record can never change status again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GameStatus::Ended | GameStatus::Canceled | GameStatus::Expired
        )
    }
}

/// How the reward pool on a game is split between its winners.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RewardPolicy {
    /// One pool divided evenly across all winners.
    FromAllWins,
    /// The full amount granted to every winner.
    ToEachWinner,
}

/// Error returned when a draft names a reward policy outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown reward policy `{0}`")]
pub struct UnknownRewardPolicy(pub String);

impl FromStr for RewardPolicy {
    type Err = UnknownRewardPolicy;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "from_all_wins" => Ok(RewardPolicy::FromAllWins),
            "to_each_winner" => Ok(RewardPolicy::ToEachWinner),
            other => Err(UnknownRewardPolicy(other.to_string())),
        }
    }
}

/// Player-hosted game persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameRecord {
    /// Primary key of the game.
    pub id: Uuid,
    /// Player who composed and hosts the game.
    pub owner: UserId,
    /// Display title shown in invites.
    pub title: String,
    /// Free-form description shown in invites.
    pub description: String,
    /// Which interactive game is being hosted.
    pub kind: GameKind,
    /// Reward pool (or per-winner amount, see `reward_policy`) in starcoins.
    pub reward_starcoins: u64,
    /// How `reward_starcoins` is split between winners.
    pub reward_policy: RewardPolicy,
    /// Lowest rang allowed to accept an invite.
    pub min_rang: u8,
    /// Highest rang allowed to accept an invite.
    pub max_rang: u8,
    /// Fewest non-owner players needed to start.
    pub min_players: u32,
    /// Most non-owner players that may accept.
    pub max_players: u32,
    /// Current lifecycle status.
    pub status: GameStatus,
    /// Submission timestamp for auditing.
    pub created_at: OffsetDateTime,
    /// When the invite round opened, set on approval.
    pub invite_started_at: Option<OffsetDateTime>,
    /// When play began, set on start.
    pub started_at: Option<OffsetDateTime>,
    /// When the record reached a terminal status.
    pub ended_at: Option<OffsetDateTime>,
}

/// Outcome recorded on a participation once its game has ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParticipationResult {
    /// Still playing; the game has not ended.
    InGame,
    /// Named a winner by the owner.
    Win,
    /// Finished without winning.
    Lose,
    /// Finished even with the rest of the field.
    Draw,
}

/// Link between one player and one game, persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameParticipation {
    /// Game the player belongs to.
    pub game_id: Uuid,
    /// The participating player.
    pub user_id: UserId,
    /// Whether this row is the hosting owner.
    pub is_owner: bool,
    /// Whether results have been committed for this row.
    pub completed: bool,
    /// Outcome, `InGame` until the game ends.
    pub result: ParticipationResult,
    /// Starcoins credited for this game.
    pub reward_amount: u64,
}

impl GameParticipation {
    /// Row created for the hosting owner at approval time.
    pub fn owner_row(game_id: Uuid, owner: UserId) -> Self {
        GameParticipation {
            game_id,
            user_id: owner,
            is_owner: true,
            completed: false,
            result: ParticipationResult::InGame,
            reward_amount: 0,
        }
    }

    /// Row created when an invited player accepts.
    pub fn player_row(game_id: Uuid, user_id: UserId) -> Self {
        GameParticipation {
            game_id,
            user_id,
            is_owner: false,
            completed: false,
            result: ParticipationResult::InGame,
            reward_amount: 0,
        }
    }
}

/// Subset of the platform user profile the engine reads and credits.
///
/// Profiles are owned by the account service; the engine never creates them
/// except implicitly when crediting a brand-new balance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerProfile {
    /// The profile owner.
    pub user_id: UserId,
    /// Progression rang, `1..=MAX_RANG`.
    pub rang: u8,
    /// Spendable starcoin balance.
    pub balance: i64,
}

/// Persisted regeneration state of one resource for one player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceStateRecord {
    /// The resource owner.
    pub user_id: UserId,
    /// Which resource this row tracks.
    pub kind: ResourceKind,
    /// Units currently stored.
    pub current: u32,
    /// Purchased boost level, indexes the balance table.
    pub boost_level: u8,
}

impl ResourceStateRecord {
    /// Fresh row for a player who has never spent this resource: full
    /// capacity at boost level zero.
    pub fn fresh(user_id: UserId, kind: ResourceKind) -> Self {
        ResourceStateRecord {
            user_id,
            kind,
            current: kind.capacity(0),
            boost_level: 0,
        }
    }
}
