//! Domain-level errors (no external dependencies)

use std::path::PathBuf;
use thiserror::Error;

/// Domain errors represent corrupt input and rule violations.
/// These are independent of infrastructure concerns.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("malformed descriptor envelope {path}: {message}")]
    MalformedEnvelope { path: PathBuf, message: String },

    #[error("invalid base64 in {path}: {message}")]
    InvalidBase64 { path: PathBuf, message: String },

    #[error("malformed descriptor {path}: {message}")]
    MalformedDescriptor { path: PathBuf, message: String },

    #[error("invalid entity archive name: {0}")]
    InvalidArchiveName(String),

    #[error("pull request does not change any files")]
    NoChangedFiles,

    #[error(
        "This PR contains more than an entity change. That is not allowed without explicit review."
    )]
    TooManyChanges { count: usize },

    #[error("The entity file is expected to be named {expected}. Please remediate.")]
    UnexpectedEntityFile { expected: String, actual: String },

    #[error("invalid pull request reference: {0}")]
    InvalidPullRequestRef(String),

    #[error("invalid staking ledger config: {0}")]
    InvalidLedgerConfig(String),

    #[error("invalid allocations table: {0}")]
    InvalidAllocations(String),

    #[error("entity descriptor for \"{0}\" does not exist")]
    MissingEntityDescriptor(String),

    #[error("staking ledger: {0}")]
    Ledger(String),
}

impl DomainError {
    /// Whether this error is corrupt package data (as opposed to a rule violation).
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            DomainError::MalformedEnvelope { .. }
                | DomainError::InvalidBase64 { .. }
                | DomainError::MalformedDescriptor { .. }
                | DomainError::InvalidArchiveName(_)
                | DomainError::InvalidLedgerConfig(_)
                | DomainError::InvalidAllocations(_)
                | DomainError::MissingEntityDescriptor(_)
        )
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
