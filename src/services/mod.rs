/// Clicker taps: spend energy, credit starcoins, arm the refill.
pub mod clicker_service;
/// Game lifecycle orchestration from draft to payout.
pub mod game_service;
/// Invite broadcasting for approved games.
pub mod invite_service;
/// Best-effort chat notices and operator escalation.
pub mod notifications;
/// Reward computation and payout commit.
pub mod reward_service;
