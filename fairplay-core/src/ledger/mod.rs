//! Accessors for the remote ledger and the signing agent.
//!
//! The ledger owns balances, consensus and the match logic itself; the client
//! only reads state from it and submits signed requests to it.

pub mod http;

pub use http::HttpLedger;

use crate::error::Result;
use crate::tx::{ActionRequest, ConfirmationHandle, Receipt, SignedRequest, TxParams};
use crate::types::{Address, StorageKey};
use async_trait::async_trait;

#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Global match counter (id of the most recently created match).
    async fn read_counter(&self) -> Result<u64>;

    /// Raw record bytes, `None` when the record does not exist.
    async fn read_record(&self, key: &StorageKey) -> Result<Option<Vec<u8>>>;

    async fn suggested_params(&self) -> Result<TxParams>;
}

#[async_trait]
pub trait LedgerSubmitter: Send + Sync {
    async fn broadcast(&self, signed: &[SignedRequest]) -> Result<ConfirmationHandle>;

    async fn await_confirmation(
        &self,
        handle: &ConfirmationHandle,
        max_rounds: u64,
    ) -> Result<Receipt>;
}

/// External agent holding a participant's key.
///
/// Returns exactly one signed request per input or an error; a partial list is
/// never a success.
#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    async fn sign(&self, requests: &[ActionRequest]) -> Result<Vec<SignedRequest>>;
}
