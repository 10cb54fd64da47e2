//! Action request wire types and the transaction execution pipeline.
//!
//! An [`ActionRequest`] is an unsigned application call: one protocol
//! [`Action`] plus the sender, the network parameters it is valid under and the
//! storage keys it must be authorized against. Requests are inert values until
//! handed to the [`TransactionPipeline`].

pub mod pipeline;

pub use pipeline::TransactionPipeline;

use crate::types::{hex32, hex_vec, Address, Commitment, MatchId, StorageKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512_256};
use std::fmt;

/// Validity window used when deriving params from the last round.
pub const DEFAULT_VALIDITY_ROUNDS: u64 = 1000;

/// One protocol action and exactly the payload it needs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    Create {
        wager: u64,
    },
    Join {
        match_id: MatchId,
    },
    Commit {
        match_id: MatchId,
        commitment: Commitment,
    },
    Reveal {
        match_id: MatchId,
        move_label: String,
        secret: String,
    },
    Resolve {
        match_id: MatchId,
    },
}

impl Action {
    pub fn tag(&self) -> &'static str {
        match self {
            Action::Create { .. } => "create",
            Action::Join { .. } => "join",
            Action::Commit { .. } => "commit",
            Action::Reveal { .. } => "reveal",
            Action::Resolve { .. } => "resolve",
        }
    }

    pub fn match_id(&self) -> Option<MatchId> {
        match self {
            Action::Create { .. } => None,
            Action::Join { match_id }
            | Action::Commit { match_id, .. }
            | Action::Reveal { match_id, .. }
            | Action::Resolve { match_id } => Some(*match_id),
        }
    }

    /// Application call arguments: the tag, then an 8-byte big-endian integer
    /// (wager for create, MatchId otherwise), then the action payload.
    pub fn app_args(&self) -> Vec<Vec<u8>> {
        let mut args = vec![self.tag().as_bytes().to_vec()];
        match self {
            Action::Create { wager } => args.push(wager.to_be_bytes().to_vec()),
            Action::Join { match_id } | Action::Resolve { match_id } => {
                args.push(match_id.to_be_bytes().to_vec())
            }
            Action::Commit {
                match_id,
                commitment,
            } => {
                args.push(match_id.to_be_bytes().to_vec());
                args.push(commitment.as_bytes().to_vec());
            }
            Action::Reveal {
                match_id,
                move_label,
                secret,
            } => {
                args.push(match_id.to_be_bytes().to_vec());
                args.push(move_label.as_bytes().to_vec());
                args.push(secret.as_bytes().to_vec());
            }
        }
        args
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create { wager } => f.debug_struct("Create").field("wager", wager).finish(),
            Action::Join { match_id } => {
                f.debug_struct("Join").field("match_id", match_id).finish()
            }
            Action::Commit {
                match_id,
                commitment,
            } => f
                .debug_struct("Commit")
                .field("match_id", match_id)
                .field("commitment", commitment)
                .finish(),
            Action::Reveal {
                match_id,
                move_label,
                ..
            } => f
                .debug_struct("Reveal")
                .field("match_id", match_id)
                .field("move_label", move_label)
                .field("secret", &"<redacted>")
                .finish(),
            Action::Resolve { match_id } => {
                f.debug_struct("Resolve").field("match_id", match_id).finish()
            }
        }
    }
}

/// Network-supplied parameters a request is valid under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxParams {
    pub fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
}

impl TxParams {
    pub fn from_last_round(fee: u64, last_round: u64, genesis_id: impl Into<String>) -> Self {
        Self {
            fee,
            first_valid: last_round,
            last_valid: last_round + DEFAULT_VALIDITY_ROUNDS,
            genesis_id: genesis_id.into(),
        }
    }
}

/// Identifier shared by every member of an atomic group.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(#[serde(with = "hex32")] pub [u8; 32]);

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Unsigned application call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub sender: Address,
    pub app_id: u64,
    pub params: TxParams,
    pub action: Action,
    pub boxes: Vec<StorageKey>,
    pub group: Option<GroupId>,
}

impl ActionRequest {
    /// Canonical signing preimage.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(192);
        buf.extend_from_slice(b"FP");
        buf.extend_from_slice(&self.app_id.to_be_bytes());
        buf.extend_from_slice(self.sender.as_bytes());
        buf.extend_from_slice(&self.params.fee.to_be_bytes());
        buf.extend_from_slice(&self.params.first_valid.to_be_bytes());
        buf.extend_from_slice(&self.params.last_valid.to_be_bytes());
        push_bytes(&mut buf, self.params.genesis_id.as_bytes());

        let args = self.action.app_args();
        buf.extend_from_slice(&(args.len() as u32).to_be_bytes());
        for arg in &args {
            push_bytes(&mut buf, arg);
        }

        buf.extend_from_slice(&(self.boxes.len() as u32).to_be_bytes());
        for key in &self.boxes {
            push_bytes(&mut buf, key.as_bytes());
        }

        match &self.group {
            Some(group) => buf.extend_from_slice(&group.0),
            None => buf.extend_from_slice(&[0u8; 32]),
        }
        buf
    }

    /// `SHA-512/256("TX" || encode())`.
    pub fn id(&self) -> [u8; 32] {
        let mut hasher = Sha512_256::new();
        hasher.update(b"TX");
        hasher.update(self.encode());
        hasher.finalize().into()
    }

    pub fn txid(&self) -> String {
        hex::encode(self.id())
    }
}

fn push_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRequest {
    pub request: ActionRequest,
    pub signer: Address,
    #[serde(with = "hex_vec")]
    pub signature: Vec<u8>,
}

/// Returned by a broadcast; identifies what to wait for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationHandle {
    pub txid: String,
    pub submitted_round: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub txid: String,
    pub confirmed_round: u64,
    pub group: Option<GroupId>,
}
