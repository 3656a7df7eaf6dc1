//! Reward computation and payout commit for finished games.

use tracing::debug;

use crate::{
    dao::models::{GameParticipation, GameRecord, ParticipationResult, RewardPolicy, UserId},
    error::ServiceError,
    state::SharedEngine,
};

/// Starcoins each winner receives from `pool` under `policy`.
///
/// Pooled payouts divide evenly; the integer remainder stays undistributed.
/// Zero winners means zero payout regardless of policy.
pub fn compute_share(policy: RewardPolicy, pool: u64, winner_count: usize) -> u64 {
    if winner_count == 0 {
        return 0;
    }
    match policy {
        RewardPolicy::FromAllWins => pool / winner_count as u64,
        RewardPolicy::ToEachWinner => pool,
    }
}

/// Close out every participation row of a finished game and pay the winners.
///
/// Participants in `winners` are marked `Win` and credited their share;
/// everyone else, the owner included, gets `loser_result` and nothing. Rows
/// are committed one by one with no cross-participant atomicity: a storage
/// failure part-way leaves earlier rows paid and later ones untouched, and
/// surfaces to the caller as a storage error.
///
/// Returns the committed rows, owner row first.
pub async fn commit_results(
    engine: &SharedEngine,
    record: &GameRecord,
    winners: &[UserId],
    loser_result: ParticipationResult,
) -> Result<Vec<GameParticipation>, ServiceError> {
    let rows = engine.store().list_participants(record.id).await?;
    let share = compute_share(record.reward_policy, record.reward_starcoins, winners.len());

    if record.reward_policy == RewardPolicy::FromAllWins && !winners.is_empty() {
        let remainder = record.reward_starcoins % winners.len() as u64;
        if remainder > 0 {
            debug!(game_id = %record.id, remainder, "pooled payout remainder stays undistributed");
        }
    }

    let mut committed = Vec::with_capacity(rows.len());
    for mut row in rows {
        row.completed = true;
        if winners.contains(&row.user_id) {
            row.result = ParticipationResult::Win;
            row.reward_amount = share;
        } else {
            row.result = loser_result;
            row.reward_amount = 0;
        }
        engine.store().update_participation(row.clone()).await?;

        if row.reward_amount > 0 {
            let balance = engine
                .store()
                .credit_balance(row.user_id, row.reward_amount as i64)
                .await?;
            debug!(
                game_id = %record.id,
                user_id = row.user_id,
                amount = row.reward_amount,
                balance,
                "winner credited"
            );
        }
        committed.push(row);
    }
    Ok(committed)
}
