use crate::error::MatchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A rock/paper/scissors move.
///
/// The label is what gets hashed and revealed; the ordinal is what the ledger
/// stores once revealed (0 means "not revealed").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Move {
    Rock,
    Paper,
    Scissors,
}

impl Move {
    pub const ALL: [Move; 3] = [Move::Rock, Move::Paper, Move::Scissors];

    pub fn label(self) -> &'static str {
        match self {
            Move::Rock => "Rock",
            Move::Paper => "Paper",
            Move::Scissors => "Scissors",
        }
    }

    pub fn ordinal(self) -> u64 {
        match self {
            Move::Rock => 1,
            Move::Paper => 2,
            Move::Scissors => 3,
        }
    }

    pub fn from_ordinal(ordinal: u64) -> Option<Move> {
        match ordinal {
            1 => Some(Move::Rock),
            2 => Some(Move::Paper),
            3 => Some(Move::Scissors),
            _ => None,
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Move {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Move::ALL
            .into_iter()
            .find(|m| m.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MatchError::InvalidMove(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("rock".parse::<Move>().unwrap(), Move::Rock);
        assert_eq!(" PAPER ".parse::<Move>().unwrap(), Move::Paper);
        assert!("lizard".parse::<Move>().is_err());
    }

    #[test]
    fn test_ordinals() {
        for m in Move::ALL {
            assert_eq!(Move::from_ordinal(m.ordinal()), Some(m));
        }
        assert_eq!(Move::from_ordinal(0), None);
    }
}
