//! Two-player commit-reveal matches on the FairPlay ledger application.
//!
//! Both players stake the same wager, commit `SHA-256(move || secret)`,
//! then reveal. The ledger resolves the match and pays out; this crate only
//! tracks the local side of a match and submits the player's actions.

pub mod builder;
pub mod client;
pub mod commitment;
pub mod error;
pub mod moves;
pub mod outcome;
pub mod record;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{BuiltAction, RequestBuilder};
pub use client::{MatchClient, OpponentWatch};
pub use commitment::{commit, verify, Secret};
pub use error::{MatchError, Result};
pub use moves::Move;
pub use outcome::{classify, Outcome};
pub use record::{storage_key, MatchRecord, RemotePhase, RECORD_LEN};
pub use session::{HistoryEntry, MatchSession, Phase, PollStep, PollToken, Settlement};
