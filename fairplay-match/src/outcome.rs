use crate::record::MatchRecord;
use fairplay_core::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Win,
    Draw,
    Lose,
}

impl Outcome {
    /// Payout as a multiple of the wager.
    pub fn multiplier(self) -> u64 {
        match self {
            Outcome::Win => 2,
            Outcome::Draw => 1,
            Outcome::Lose => 0,
        }
    }

    /// Balance change for a given wager.
    pub fn net(self, wager: u64) -> i64 {
        let wager = i64::try_from(wager).unwrap_or(i64::MAX);
        match self {
            Outcome::Win => wager,
            Outcome::Draw => 0,
            Outcome::Lose => -wager,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Draw => "draw",
            Outcome::Lose => "lose",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a resolved record from `local`'s point of view.
///
/// Only three comparisons on `winner`: the local address wins; the protocol
/// address or the zero address is a draw; anything else is a loss.
pub fn classify(record: &MatchRecord, local: &Address, protocol: &Address) -> Outcome {
    if record.winner == *local {
        Outcome::Win
    } else if record.winner == *protocol || record.winner.is_zero() {
        Outcome::Draw
    } else {
        Outcome::Lose
    }
}
