use thiserror::Error;

pub type Result<T> = std::result::Result<T, FairPlayError>;

#[derive(Error, Debug)]
pub enum FairPlayError {
    #[error("Malformed match record: expected at least {expected} bytes, got {actual}")]
    MalformedRecord { expected: usize, actual: usize },

    #[error("Signing rejected: {0}")]
    SigningRejected(String),

    #[error("Broadcast rejected: {0}")]
    BroadcastRejected(String),

    #[error("Transaction {txid} not confirmed after {rounds} rounds")]
    ConfirmationTimeout { txid: String, rounds: u64 },

    #[error("Invalid match id: {0}")]
    InvalidMatchId(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Key error: {0}")]
    Key(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FairPlayError {
    pub fn signing_rejected(msg: impl Into<String>) -> Self {
        Self::SigningRejected(msg.into())
    }

    pub fn broadcast_rejected(msg: impl Into<String>) -> Self {
        Self::BroadcastRejected(msg.into())
    }

    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    pub fn key(msg: impl Into<String>) -> Self {
        Self::Key(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Failures that originate on the remote side and can be retried as-is.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::SigningRejected(_)
                | Self::BroadcastRejected(_)
                | Self::ConfirmationTimeout { .. }
                | Self::Ledger(_)
        )
    }
}

impl From<reqwest::Error> for FairPlayError {
    fn from(err: reqwest::Error) -> Self {
        FairPlayError::Ledger(err.to_string())
    }
}
