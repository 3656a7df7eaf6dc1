//! Lifecycle orchestration for player-hosted games.
//!
//! Every operation re-reads the persisted record, validates the move through
//! [`crate::state::lifecycle`] and runs under the per-game lock, so
//! concurrent commands against one game serialize instead of racing.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{
        GameParticipation, GameRecord, GameStatus, ParticipationResult, RewardPolicy, UserId,
    },
    economy::{GameKind, MAX_RANG},
    error::ServiceError,
    services::{invite_service, notifications, reward_service},
    state::{
        Page, SelectionCommand, SharedEngine,
        lifecycle::{self, LifecycleEvent},
        paginate,
    },
};

/// Draft field: display title.
pub const FIELD_TITLE: &str = "title";
/// Draft field: free-form description shown in invites.
pub const FIELD_DESCRIPTION: &str = "description";
/// Draft field: reward pool or per-winner amount in starcoins.
pub const FIELD_REWARD: &str = "reward_starcoins";
/// Draft field: hosted game kind tag.
pub const FIELD_KIND: &str = "type_game";
/// Draft field: how the reward is split between winners.
pub const FIELD_REWARD_POLICY: &str = "reward_policy";
/// Draft field: lowest rang allowed to join.
pub const FIELD_MIN_RANG: &str = "min_rang";
/// Draft field: highest rang allowed to join.
pub const FIELD_MAX_RANG: &str = "max_rang";
/// Draft field: fewest players needed to start.
pub const FIELD_MIN_PLAYERS: &str = "min_players";
/// Draft field: most players allowed to accept.
pub const FIELD_MAX_PLAYERS: &str = "max_players";

/// Fields a draft must carry before it can be submitted.
pub const REQUIRED_FIELDS: [&str; 4] = [FIELD_TITLE, FIELD_DESCRIPTION, FIELD_REWARD, FIELD_KIND];

/// Caller-facing snapshot of a game record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSummary {
    /// Game id.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Hosted game kind.
    pub kind: GameKind,
    /// Current lifecycle status.
    pub status: GameStatus,
    /// Reward pool or per-winner amount in starcoins.
    pub reward_starcoins: u64,
    /// How the reward is split between winners.
    pub reward_policy: RewardPolicy,
    /// Seats available to invited players.
    pub max_players: u32,
}

impl From<GameRecord> for GameSummary {
    fn from(record: GameRecord) -> Self {
        GameSummary {
            id: record.id,
            title: record.title,
            kind: record.kind,
            status: record.status,
            reward_starcoins: record.reward_starcoins,
            reward_policy: record.reward_policy,
            max_players: record.max_players,
        }
    }
}

/// Persist the owner's staged draft as a new game awaiting moderation.
///
/// Fails with a validation error naming the offending field; the draft is
/// kept so the owner can fix it and resubmit.
pub async fn submit(engine: &SharedEngine, owner: UserId) -> Result<GameSummary, ServiceError> {
    notifications::surface(engine, "submit", run_submit(engine, owner).await).await
}

/// Approve a moderated game and open its invite round.
pub async fn approve(engine: &SharedEngine, game_id: Uuid) -> Result<GameSummary, ServiceError> {
    notifications::surface(engine, "approve", run_approve(engine, game_id).await).await
}

/// Accept an invite. Returns how many players have joined so far.
pub async fn player_accept(
    engine: &SharedEngine,
    game_id: Uuid,
    user_id: UserId,
) -> Result<u32, ServiceError> {
    notifications::surface(
        engine,
        "player_accept",
        run_player_accept(engine, game_id, user_id).await,
    )
    .await
}

/// Move a game with enough accepted players from ready to active.
pub async fn start(engine: &SharedEngine, game_id: Uuid) -> Result<GameSummary, ServiceError> {
    notifications::surface(engine, "start", run_start(engine, game_id).await).await
}

/// Withdraw a game that has not started yet, deleting its record.
pub async fn cancel_pending(engine: &SharedEngine, game_id: Uuid) -> Result<(), ServiceError> {
    notifications::surface(
        engine,
        "cancel_pending",
        run_cancel_pending(engine, game_id).await,
    )
    .await
}

/// Finish an active game: commit results, pay winners, notify everyone.
///
/// Returns the closed-out participation rows, owner row first.
pub async fn end(
    engine: &SharedEngine,
    game_id: Uuid,
    winners: &[UserId],
) -> Result<Vec<GameParticipation>, ServiceError> {
    notifications::surface(engine, "end", run_end(engine, game_id, winners).await).await
}

/// Expire a ready game whose invite window closed without a start.
///
/// Intended caller is the janitor layer that sweeps stale games.
pub async fn expire(engine: &SharedEngine, game_id: Uuid) -> Result<(), ServiceError> {
    notifications::surface(engine, "expire", run_expire(engine, game_id).await).await
}

/// Apply one winner-picker command and return the resulting candidate set.
pub async fn update_selection(
    engine: &SharedEngine,
    owner: UserId,
    game_id: Uuid,
    command: SelectionCommand,
) -> Result<Vec<UserId>, ServiceError> {
    notifications::surface(
        engine,
        "update_selection",
        run_update_selection(engine, owner, game_id, command).await,
    )
    .await
}

/// One page of the winner-picker candidate list.
pub async fn selection_page(
    engine: &SharedEngine,
    game_id: Uuid,
    page: usize,
) -> Result<Page<UserId>, ServiceError> {
    notifications::surface(
        engine,
        "selection_page",
        run_selection_page(engine, game_id, page).await,
    )
    .await
}

/// Winners currently picked on the owner's panel, in ascending user order.
pub async fn selected_winners(
    engine: &SharedEngine,
    owner: UserId,
    game_id: Uuid,
) -> Result<Vec<UserId>, ServiceError> {
    let result = engine
        .selection()
        .selected(owner, game_id)
        .await
        .map_err(ServiceError::from);
    notifications::surface(engine, "selected_winners", result).await
}

async fn run_submit(engine: &SharedEngine, owner: UserId) -> Result<GameSummary, ServiceError> {
    let fields = engine.drafts().get_all(owner).await?;
    let record = build_record(owner, &fields)?;

    engine.store().create_game(record.clone()).await?;
    if let Err(err) = engine.drafts().clear(owner).await {
        warn!(owner, error = %err, "submitted draft not cleared");
    }

    info!(game_id = %record.id, owner, kind = %record.kind, "game submitted for moderation");
    Ok(record.into())
}

async fn run_approve(engine: &SharedEngine, game_id: Uuid) -> Result<GameSummary, ServiceError> {
    let lock = engine.game_lock(game_id);
    let _guard = lock.lock().await;

    let mut record = load_game(engine, game_id).await?;
    record.status = lifecycle::next_status(record.status, LifecycleEvent::Approve)?;
    record.invite_started_at = Some(OffsetDateTime::now_utc());

    let rows = engine.store().list_participants(game_id).await?;
    if !rows.iter().any(|row| row.is_owner) {
        engine
            .store()
            .create_participation(GameParticipation::owner_row(game_id, record.owner))
            .await?;
    }

    let eligible: Vec<UserId> = engine
        .store()
        .list_profiles_by_rang(record.min_rang, record.max_rang)
        .await?
        .into_iter()
        .map(|profile| profile.user_id)
        .filter(|&user_id| user_id != record.owner)
        .collect();

    engine.store().update_game(record.clone()).await?;
    invite_service::open_round(engine, &record, eligible).await;

    info!(game_id = %game_id, title = %record.title, "game approved; invite round open");
    Ok(record.into())
}

async fn run_player_accept(
    engine: &SharedEngine,
    game_id: Uuid,
    user_id: UserId,
) -> Result<u32, ServiceError> {
    let lock = engine.game_lock(game_id);
    let _guard = lock.lock().await;

    let record = load_game(engine, game_id).await?;
    if record.status != GameStatus::Ready {
        return Err(ServiceError::InvalidState(format!(
            "game `{game_id}` is not taking players"
        )));
    }
    if user_id == record.owner {
        return Err(ServiceError::Eligibility(
            "the host cannot join their own game".into(),
        ));
    }
    if !invite_window_open(engine, &record) {
        return Err(ServiceError::Eligibility(
            "the invite window for this game has closed".into(),
        ));
    }

    let Some(profile) = engine.store().find_profile(user_id).await? else {
        return Err(ServiceError::NotFound(format!(
            "player `{user_id}` has no profile"
        )));
    };
    if profile.rang < record.min_rang || profile.rang > record.max_rang {
        return Err(ServiceError::Eligibility(format!(
            "rang {} is outside this game's {}..={} bracket",
            profile.rang, record.min_rang, record.max_rang
        )));
    }

    let rows = engine.store().list_participants(game_id).await?;
    if rows.iter().any(|row| row.user_id == user_id) {
        return Err(ServiceError::Conflict(format!(
            "player `{user_id}` already joined"
        )));
    }
    let accepted = rows.iter().filter(|row| !row.is_owner).count() as u32;
    if accepted >= record.max_players {
        return Err(ServiceError::Capacity(format!(
            "all {} seats are taken",
            record.max_players
        )));
    }

    // Mirror the count into the live round so its summary stays honest and
    // a race outside the game lock can never land on the last seat twice.
    let round = engine.invite_round(game_id);
    if let Some(round) = &round {
        if !round.session().try_reserve_seat(record.max_players) {
            return Err(ServiceError::Capacity(format!(
                "all {} seats are taken",
                record.max_players
            )));
        }
    }

    let row = GameParticipation::player_row(game_id, user_id);
    if let Err(err) = engine.store().create_participation(row).await {
        if let Some(round) = &round {
            round.session().release_seat();
        }
        return Err(err.into());
    }

    let joined = accepted + 1;
    notifications::notify_player_joined(engine, &record, user_id, joined).await;
    info!(game_id = %game_id, user_id, joined, "player accepted an invite");
    Ok(joined)
}

async fn run_start(engine: &SharedEngine, game_id: Uuid) -> Result<GameSummary, ServiceError> {
    let lock = engine.game_lock(game_id);
    let _guard = lock.lock().await;

    let mut record = load_game(engine, game_id).await?;
    let next = lifecycle::next_status(record.status, LifecycleEvent::Start)?;

    let players = non_owner_players(engine, game_id).await?;
    let required = record.min_players.max(2);
    if (players.len() as u32) < required {
        return Err(ServiceError::Capacity(format!(
            "only {} of {} players joined; invite more and retry",
            players.len(),
            required
        )));
    }

    engine.discard_invite_round(game_id).await;

    record.status = next;
    record.started_at = Some(OffsetDateTime::now_utc());
    engine.store().update_game(record.clone()).await?;

    notifications::notify_game_started(engine, &record, &players).await;
    info!(game_id = %game_id, players = players.len(), "game started");
    Ok(record.into())
}

async fn run_cancel_pending(engine: &SharedEngine, game_id: Uuid) -> Result<(), ServiceError> {
    let lock = engine.game_lock(game_id);
    let _guard = lock.lock().await;

    let record = load_game(engine, game_id).await?;
    lifecycle::next_status(record.status, LifecycleEvent::CancelPending)?;

    engine.discard_invite_round(game_id).await;
    let players = non_owner_players(engine, game_id).await?;

    if !engine.store().delete_game(game_id).await? {
        return Err(ServiceError::NotFound(format!(
            "game `{game_id}` is already gone"
        )));
    }

    notifications::notify_game_canceled(engine, &record, &players).await;
    info!(game_id = %game_id, "pending game canceled and deleted");
    Ok(())
}

async fn run_end(
    engine: &SharedEngine,
    game_id: Uuid,
    winners: &[UserId],
) -> Result<Vec<GameParticipation>, ServiceError> {
    let lock = engine.game_lock(game_id);
    let _guard = lock.lock().await;

    let mut record = load_game(engine, game_id).await?;
    let next = lifecycle::next_status(record.status, LifecycleEvent::End)?;

    let players = non_owner_players(engine, game_id).await?;
    let mut seen = HashSet::new();
    for winner in winners {
        if !players.contains(winner) {
            return Err(ServiceError::Validation(format!(
                "winner `{winner}` is not an accepted player of this game"
            )));
        }
        if !seen.insert(*winner) {
            return Err(ServiceError::Validation(format!(
                "winner `{winner}` is listed twice"
            )));
        }
    }

    // The record turns terminal before payouts go out: a payout failure
    // part-way can leave winners unpaid (the operator gets the report), but
    // a retry can never pay anyone twice.
    record.status = next;
    record.ended_at = Some(OffsetDateTime::now_utc());
    engine.store().update_game(record.clone()).await?;

    let committed =
        reward_service::commit_results(engine, &record, winners, ParticipationResult::Lose)
            .await?;

    if let Err(err) = engine.selection().discard(record.owner, game_id).await {
        warn!(game_id = %game_id, error = %err, "winner panel not discarded");
    }

    notifications::notify_results(engine, &record, &committed).await;
    info!(game_id = %game_id, winners = winners.len(), "game ended; results committed");
    Ok(committed)
}

async fn run_expire(engine: &SharedEngine, game_id: Uuid) -> Result<(), ServiceError> {
    let lock = engine.game_lock(game_id);
    let _guard = lock.lock().await;

    let mut record = load_game(engine, game_id).await?;
    let next = lifecycle::next_status(record.status, LifecycleEvent::Expire)?;
    if invite_window_open(engine, &record) {
        return Err(ServiceError::InvalidState(format!(
            "the invite window of game `{game_id}` is still open"
        )));
    }

    engine.discard_invite_round(game_id).await;
    record.status = next;
    record.ended_at = Some(OffsetDateTime::now_utc());
    engine.store().update_game(record.clone()).await?;

    notifications::notify_game_expired(engine, &record).await;
    info!(game_id = %game_id, "game expired before gathering enough players");
    Ok(())
}

async fn run_update_selection(
    engine: &SharedEngine,
    owner: UserId,
    game_id: Uuid,
    command: SelectionCommand,
) -> Result<Vec<UserId>, ServiceError> {
    let record = load_game(engine, game_id).await?;
    if owner != record.owner {
        return Err(ServiceError::Eligibility(
            "only the host picks winners".into(),
        ));
    }
    if record.status != GameStatus::Active {
        return Err(ServiceError::InvalidState(
            "winners can only be picked while the game is running".into(),
        ));
    }

    let candidates = non_owner_players(engine, game_id).await?;
    if let SelectionCommand::Toggle(user_id) = command {
        if !candidates.contains(&user_id) {
            return Err(ServiceError::Validation(format!(
                "player `{user_id}` is not part of this game"
            )));
        }
    }

    let picked = engine
        .selection()
        .apply(owner, game_id, command, &candidates)
        .await?;
    debug!(game_id = %game_id, picked = picked.len(), "winner panel updated");
    Ok(picked)
}

async fn run_selection_page(
    engine: &SharedEngine,
    game_id: Uuid,
    page: usize,
) -> Result<Page<UserId>, ServiceError> {
    load_game(engine, game_id).await?;
    let candidates = non_owner_players(engine, game_id).await?;
    Ok(paginate(&candidates, page, engine.config().page_size))
}

async fn load_game(engine: &SharedEngine, game_id: Uuid) -> Result<GameRecord, ServiceError> {
    let Some(record) = engine.store().find_game(game_id).await? else {
        return Err(ServiceError::NotFound(format!(
            "game `{game_id}` not found"
        )));
    };
    Ok(record)
}

async fn non_owner_players(
    engine: &SharedEngine,
    game_id: Uuid,
) -> Result<Vec<UserId>, ServiceError> {
    let rows = engine.store().list_participants(game_id).await?;
    Ok(rows
        .into_iter()
        .filter(|row| !row.is_owner)
        .map(|row| row.user_id)
        .collect())
}

/// Whether players may still accept invites for this record.
///
/// A missing open stamp counts as closed; better to refuse a join than to
/// let an inconsistent record take players forever.
fn invite_window_open(engine: &SharedEngine, record: &GameRecord) -> bool {
    let Some(started) = record.invite_started_at else {
        return false;
    };
    let elapsed: std::time::Duration = (OffsetDateTime::now_utc() - started)
        .try_into()
        .unwrap_or_default();
    elapsed <= engine.config().invite_window
}

fn build_record(
    owner: UserId,
    fields: &HashMap<String, Value>,
) -> Result<GameRecord, ServiceError> {
    let title = required_text(fields, FIELD_TITLE)?;
    let description = required_text(fields, FIELD_DESCRIPTION)?;
    let reward_starcoins =
        number_field(fields, FIELD_REWARD)?.ok_or_else(|| missing(FIELD_REWARD))?;
    let kind = required_text(fields, FIELD_KIND)?
        .parse::<GameKind>()
        .map_err(|err| ServiceError::Validation(err.to_string()))?;

    let reward_policy = match fields.get(FIELD_REWARD_POLICY).and_then(Value::as_str) {
        Some(raw) => raw
            .parse::<RewardPolicy>()
            .map_err(|err| ServiceError::Validation(err.to_string()))?,
        None => RewardPolicy::FromAllWins,
    };

    let (default_min, default_max) = kind.default_player_bounds();
    let min_players = count_field(fields, FIELD_MIN_PLAYERS, default_min)?;
    let max_players = count_field(fields, FIELD_MAX_PLAYERS, default_max)?;
    if max_players == 0 {
        return Err(ServiceError::Validation(format!(
            "draft field `{FIELD_MAX_PLAYERS}` must be at least 1"
        )));
    }
    if min_players > max_players {
        return Err(ServiceError::Validation(format!(
            "draft field `{FIELD_MIN_PLAYERS}` ({min_players}) exceeds \
             `{FIELD_MAX_PLAYERS}` ({max_players})"
        )));
    }

    let min_rang = rang_field(fields, FIELD_MIN_RANG, 1)?;
    let max_rang = rang_field(fields, FIELD_MAX_RANG, MAX_RANG)?;
    if min_rang > max_rang {
        return Err(ServiceError::Validation(format!(
            "draft field `{FIELD_MIN_RANG}` ({min_rang}) exceeds `{FIELD_MAX_RANG}` ({max_rang})"
        )));
    }

    Ok(GameRecord {
        id: Uuid::new_v4(),
        owner,
        title,
        description,
        kind,
        reward_starcoins,
        reward_policy,
        min_rang,
        max_rang,
        min_players,
        max_players,
        status: GameStatus::Moderation,
        created_at: OffsetDateTime::now_utc(),
        invite_started_at: None,
        started_at: None,
        ended_at: None,
    })
}

fn missing(name: &str) -> ServiceError {
    ServiceError::Validation(format!("draft field `{name}` is missing"))
}

fn required_text(fields: &HashMap<String, Value>, name: &str) -> Result<String, ServiceError> {
    let Some(value) = fields.get(name) else {
        return Err(missing(name));
    };
    let text = value.as_str().map(str::trim).unwrap_or_default();
    if text.is_empty() {
        return Err(ServiceError::Validation(format!(
            "draft field `{name}` must be non-empty text"
        )));
    }
    Ok(text.to_string())
}

/// Numeric draft field; accepts a JSON number or a numeric string, since
/// values typed into a chat arrive as text.
fn number_field(fields: &HashMap<String, Value>, name: &str) -> Result<Option<u64>, ServiceError> {
    let Some(value) = fields.get(name) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    };
    parsed.map(Some).ok_or_else(|| {
        ServiceError::Validation(format!(
            "draft field `{name}` must be a non-negative number"
        ))
    })
}

fn count_field(
    fields: &HashMap<String, Value>,
    name: &str,
    default: u32,
) -> Result<u32, ServiceError> {
    let Some(raw) = number_field(fields, name)? else {
        return Ok(default);
    };
    u32::try_from(raw)
        .map_err(|_| ServiceError::Validation(format!("draft field `{name}` is out of range")))
}

fn rang_field(
    fields: &HashMap<String, Value>,
    name: &str,
    default: u8,
) -> Result<u8, ServiceError> {
    let Some(raw) = number_field(fields, name)? else {
        return Ok(default);
    };
    u8::try_from(raw)
        .ok()
        .filter(|rang| (1..=MAX_RANG).contains(rang))
        .ok_or_else(|| {
            ServiceError::Validation(format!(
                "draft field `{name}` must be between 1 and {MAX_RANG}"
            ))
        })
}
