//! error types for the oracle client

use thiserror::Error;

use crate::records::RecordKind;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("source fetch failed: {0}")]
    SourceFetch(String),

    #[error("malformed {kind} record at index {index}: {reason}")]
    MalformedRecord {
        kind: RecordKind,
        index: usize,
        reason: String,
    },

    #[error("action rejected: {0}")]
    ActionRejected(String),

    #[error("action already in progress for request {0}")]
    ActionInProgress(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid field value: {0}")]
    InvalidField(String),

    #[error("oracle is not deployed")]
    NotDeployed,

    #[error("oracle is already deployed")]
    AlreadyDeployed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: u128, need: u128 },
}

impl OracleError {
    /// wrap a collaborator failure as a rejected action, keeping rejections as-is
    pub fn into_rejection(self) -> Self {
        match self {
            OracleError::ActionRejected(_) | OracleError::ActionInProgress(_) => self,
            other => OracleError::ActionRejected(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, OracleError>;
