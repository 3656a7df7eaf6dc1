//! Closed sets of resource and game kinds plus their balance tables.
//!
//! Every regenerating resource and every playable game kind is enumerated
//! here; adding a new one means adding a variant and a table row, nothing is
//! discovered at runtime.

use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest rang a player profile can reach.
pub const MAX_RANG: u8 = 10;

/// Balance values for one boost level of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoostLevel {
    /// Maximum stored units at this level.
    pub capacity: u32,
    /// Pause before one spent unit grows back to full capacity.
    pub regen_delay: Duration,
    /// Starcoins earned per spent unit at this level.
    pub payout: u64,
}

/// Kinds of regenerating per-user resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Tap-game energy.
    Clicker,
    /// Geolocation hunt attempts.
    GeoHunt,
}

const CLICKER_LEVELS: [BoostLevel; 6] = [
    BoostLevel {
        capacity: 100,
        regen_delay: Duration::from_secs(3600),
        payout: 1,
    },
    BoostLevel {
        capacity: 150,
        regen_delay: Duration::from_secs(3000),
        payout: 1,
    },
    BoostLevel {
        capacity: 200,
        regen_delay: Duration::from_secs(2400),
        payout: 2,
    },
    BoostLevel {
        capacity: 300,
        regen_delay: Duration::from_secs(1800),
        payout: 2,
    },
    BoostLevel {
        capacity: 450,
        regen_delay: Duration::from_secs(1200),
        payout: 3,
    },
    BoostLevel {
        capacity: 600,
        regen_delay: Duration::from_secs(900),
        payout: 5,
    },
];

const GEO_HUNT_LEVELS: [BoostLevel; 4] = [
    BoostLevel {
        capacity: 3,
        regen_delay: Duration::from_secs(21600),
        payout: 25,
    },
    BoostLevel {
        capacity: 5,
        regen_delay: Duration::from_secs(14400),
        payout: 25,
    },
    BoostLevel {
        capacity: 8,
        regen_delay: Duration::from_secs(10800),
        payout: 40,
    },
    BoostLevel {
        capacity: 12,
        regen_delay: Duration::from_secs(7200),
        payout: 60,
    },
];

impl ResourceKind {
    /// Every resource kind the platform knows about.
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Clicker, ResourceKind::GeoHunt];

    /// Balance values for the given boost level.
    ///
    /// Levels past the end of the table clamp to the last entry, so a profile
    /// whose boost outruns a shortened table keeps working on the best tier.
    pub fn value_by_level(self, level: u8) -> &'static BoostLevel {
        let table: &'static [BoostLevel] = match self {
            ResourceKind::Clicker => &CLICKER_LEVELS,
            ResourceKind::GeoHunt => &GEO_HUNT_LEVELS,
        };
        let index = usize::from(level).min(table.len() - 1);
        &table[index]
    }

    /// Maximum stored units at the given boost level.
    pub fn capacity(self, level: u8) -> u32 {
        self.value_by_level(level).capacity
    }

    /// Regeneration pause at the given boost level.
    pub fn regen_delay(self, level: u8) -> Duration {
        self.value_by_level(level).regen_delay
    }

    /// Stable snake_case tag used in storage keys and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Clicker => "clicker",
            ResourceKind::GeoHunt => "geo_hunt",
        }
    }

    /// Human-facing name for chat messages.
    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Clicker => "energy",
            ResourceKind::GeoHunt => "hunt attempts",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of player-hosted interactive games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    /// Head-to-head match between exactly two players.
    Duel,
    /// Bracket play for a small field.
    Tournament,
    /// Free-for-all quiz round.
    Quiz,
}

impl GameKind {
    /// Default participant bounds `(min, max)` applied when a draft leaves
    /// them unset.
    pub fn default_player_bounds(self) -> (u32, u32) {
        match self {
            GameKind::Duel => (2, 2),
            GameKind::Tournament => (4, 16),
            GameKind::Quiz => (2, 32),
        }
    }

    /// Stable snake_case tag used in drafts and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            GameKind::Duel => "duel",
            GameKind::Tournament => "tournament",
            GameKind::Quiz => "quiz",
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a draft names a game kind outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown game kind `{0}`")]
pub struct UnknownGameKind(pub String);

impl FromStr for GameKind {
    type Err = UnknownGameKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "duel" => Ok(GameKind::Duel),
            "tournament" => Ok(GameKind::Tournament),
            "quiz" => Ok(GameKind::Quiz),
            other => Err(UnknownGameKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_clamp_to_the_top_tier() {
        let top = ResourceKind::Clicker.value_by_level(5);
        assert_eq!(ResourceKind::Clicker.value_by_level(42), top);
        assert_eq!(ResourceKind::GeoHunt.capacity(200), 12);
    }

    #[test]
    fn capacities_grow_with_boost_level() {
        for kind in ResourceKind::ALL {
            let mut previous = 0;
            for level in 0..8 {
                let capacity = kind.capacity(level);
                assert!(capacity >= previous, "{kind} capacity shrank at {level}");
                previous = capacity;
            }
        }
    }

    #[test]
    fn game_kind_parses_round_trip() {
        for kind in [GameKind::Duel, GameKind::Tournament, GameKind::Quiz] {
            assert_eq!(kind.as_str().parse::<GameKind>(), Ok(kind));
        }
        assert!("poker".parse::<GameKind>().is_err());
    }
}
