//! FairPlay core - shared building blocks for the match protocol client
//!
//! Ledger-facing types, the ledger and signer accessors, the transaction
//! execution pipeline and local history storage. Match semantics live in
//! `fairplay-match`.

pub mod config;
pub mod error;
pub mod keys;
pub mod ledger;
pub mod storage;
pub mod tx;
pub mod types;

pub use config::ClientConfig;
pub use error::{FairPlayError, Result};
pub use keys::KeypairSigner;
pub use ledger::{HttpLedger, LedgerReader, LedgerSubmitter, Signer};
pub use storage::{HistoryStore, HistoryTotals, RoundRecord, Storage};
pub use tx::{
    Action, ActionRequest, ConfirmationHandle, GroupId, Receipt, SignedRequest,
    TransactionPipeline, TxParams,
};
pub use types::{Address, Commitment, MatchId, StorageKey};
