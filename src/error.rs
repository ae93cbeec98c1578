use ethers::types::{Address, TxHash};
use thiserror::Error;

use crate::models::FormField;

pub type Result<T, E = SessionError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum SessionError {
    /// No wallet was injected, so there is nothing to bind a contract handle to.
    #[error("no wallet provider detected, install a wallet extension to continue")]
    ProviderUnavailable,

    #[error("invalid transaction form: {0}")]
    Validation(#[from] ValidationError),

    /// The user declined a wallet prompt.
    #[error("wallet rejected the request: {0}")]
    ProviderRejected(String),

    #[error("rpc error: {0}")]
    Network(String),

    /// The value transfer was mined but its ledger entry was never appended.
    #[error("transfer {tx_hash:?} was mined but its ledger entry was not recorded: {reason}")]
    PartialSubmission { tx_hash: TxHash, reason: String },

    #[error("transfer {0:?} was mined with a failed status")]
    TransferFailed(TxHash),

    #[error("no account is connected")]
    NotConnected,

    #[error("a submission is already in flight")]
    SubmissionInFlight,

    #[error("transfer was sent by {expected:?} but {connected:?} is connected")]
    AccountMismatch {
        expected: Address,
        connected: Address,
    },

    #[error("no pending ledger append for transfer {0:?}")]
    UnknownPendingAppend(TxHash),

    #[error("contract error: {0}")]
    Contract(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),
}

impl SessionError {
    /// Whether the error left funds moved without a matching ledger entry.
    pub fn is_partial_submission(&self) -> bool {
        matches!(self, SessionError::PartialSubmission { .. })
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(src: serde_json::Error) -> SessionError {
        SessionError::Storage(src.to_string())
    }
}

impl From<std::io::Error> for SessionError {
    fn from(src: std::io::Error) -> SessionError {
        SessionError::Storage(src.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    EmptyField(FormField),

    #[error("{0:?} is not a valid address")]
    InvalidAddress(String),

    #[error("{0:?} is not a valid ether amount")]
    InvalidAmount(String),
}
