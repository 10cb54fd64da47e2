//! Fixed-layout match record as persisted by the ledger.
//!
//! | offset | width | field |
//! |---|---|---|
//! | 0 | 32 | player1 |
//! | 32 | 32 | player2 |
//! | 64 | 8 | wager |
//! | 72 | 8 | state |
//! | 80 | 32 | commitment1 |
//! | 112 | 32 | commitment2 |
//! | 144 | 8 | move1 |
//! | 152 | 8 | move2 |
//! | 160 | 32 | winner |
//!
//! Integers are big-endian.

use crate::moves::Move;
use fairplay_core::{Address, Commitment, FairPlayError, MatchId, StorageKey};
use serde::{Deserialize, Serialize};

pub const RECORD_LEN: usize = 192;
pub const MATCH_KEY_PREFIX: &[u8] = b"match_";

/// Record key for a match: `"match_" || be_u64(match_id)`.
pub fn storage_key(match_id: MatchId) -> StorageKey {
    let mut key = Vec::with_capacity(MATCH_KEY_PREFIX.len() + 8);
    key.extend_from_slice(MATCH_KEY_PREFIX);
    key.extend_from_slice(&match_id.to_be_bytes());
    StorageKey::new(key)
}

/// Lifecycle ordinal written by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemotePhase {
    Created,
    Committed,
    Revealed,
    Resolved,
    Unknown(u64),
}

impl RemotePhase {
    pub fn from_ordinal(ordinal: u64) -> Self {
        match ordinal {
            0 => RemotePhase::Created,
            2 => RemotePhase::Committed,
            3 => RemotePhase::Revealed,
            4 => RemotePhase::Resolved,
            other => RemotePhase::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub player1: Address,
    pub player2: Address,
    pub wager: u64,
    pub state: u64,
    pub commitment1: Commitment,
    pub commitment2: Commitment,
    pub move1: u64,
    pub move2: u64,
    pub winner: Address,
}

impl MatchRecord {
    /// Record as it looks right after creation.
    pub fn created(player1: Address, wager: u64) -> Self {
        Self {
            player1,
            player2: Address::ZERO,
            wager,
            state: 0,
            commitment1: Commitment::ZERO,
            commitment2: Commitment::ZERO,
            move1: 0,
            move2: 0,
            winner: Address::ZERO,
        }
    }

    /// Decodes a record. Buffers shorter than [`RECORD_LEN`] are rejected
    /// whole; bytes past it are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, FairPlayError> {
        if bytes.len() < RECORD_LEN {
            return Err(FairPlayError::MalformedRecord {
                expected: RECORD_LEN,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            player1: Address::new(read_32(bytes, 0)),
            player2: Address::new(read_32(bytes, 32)),
            wager: read_u64(bytes, 64),
            state: read_u64(bytes, 72),
            commitment1: Commitment::new(read_32(bytes, 80)),
            commitment2: Commitment::new(read_32(bytes, 112)),
            move1: read_u64(bytes, 144),
            move2: read_u64(bytes, 152),
            winner: Address::new(read_32(bytes, 160)),
        })
    }

    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[0..32].copy_from_slice(self.player1.as_bytes());
        out[32..64].copy_from_slice(self.player2.as_bytes());
        out[64..72].copy_from_slice(&self.wager.to_be_bytes());
        out[72..80].copy_from_slice(&self.state.to_be_bytes());
        out[80..112].copy_from_slice(self.commitment1.as_bytes());
        out[112..144].copy_from_slice(self.commitment2.as_bytes());
        out[144..152].copy_from_slice(&self.move1.to_be_bytes());
        out[152..160].copy_from_slice(&self.move2.to_be_bytes());
        out[160..192].copy_from_slice(self.winner.as_bytes());
        out
    }

    pub fn remote_phase(&self) -> RemotePhase {
        RemotePhase::from_ordinal(self.state)
    }

    pub fn has_opponent(&self) -> bool {
        !self.player2.is_zero()
    }

    pub fn is_player(&self, address: &Address) -> bool {
        self.player1 == *address || self.player2 == *address
    }

    /// The commitment slot belonging to `address`, if it is a player.
    pub fn commitment_of(&self, address: &Address) -> Option<Commitment> {
        if self.player1 == *address {
            Some(self.commitment1)
        } else if self.player2 == *address {
            Some(self.commitment2)
        } else {
            None
        }
    }

    /// The other player's revealed move as seen from `address`.
    pub fn opponent_move(&self, address: &Address) -> Option<Move> {
        if self.player1 == *address {
            Move::from_ordinal(self.move2)
        } else if self.player2 == *address {
            Move::from_ordinal(self.move1)
        } else {
            None
        }
    }
}

fn read_32(bytes: &[u8], offset: usize) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes[offset..offset + 32]);
    out
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_be_bytes(out)
}
