use crate::session::Phase;
use fairplay_core::{FairPlayError, MatchId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MatchError>;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error(transparent)]
    Core(#[from] FairPlayError),

    #[error("Predicted match {predicted} is not ours and no later match up to {counter} is either")]
    PredictionRace { predicted: MatchId, counter: u64 },

    #[error("An action is already in flight ({0:?})")]
    ActionInFlight(Phase),

    #[error("Invalid phase: expected {expected}, session is {actual:?}")]
    InvalidPhase { expected: &'static str, actual: Phase },

    #[error("No active match")]
    NoActiveMatch,

    #[error("Invalid move: {0}")]
    InvalidMove(String),

    #[error("Stored move and secret do not reproduce the commitment")]
    CommitmentMismatch,

    #[error("Opponent polling was cancelled")]
    PollCancelled,

    /// The submission confirmed, so the match exists, but reading it back failed.
    #[error("Match {match_id} was confirmed but could not be read back: {source}")]
    ReadBackFailed {
        match_id: MatchId,
        source: FairPlayError,
    },
}

impl MatchError {
    /// Whether the same phase can simply be triggered again.
    ///
    /// `ReadBackFailed` is not: resubmitting would open or join a second time.
    pub fn is_recoverable(&self) -> bool {
        match self {
            MatchError::Core(e) => e.is_remote(),
            MatchError::PredictionRace { .. } => true,
            _ => false,
        }
    }
}
