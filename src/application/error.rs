//! Application-level errors (wraps domain errors)

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::DomainError;

/// Application errors wrap domain errors and add application-level context.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("package directory already exists: {0}")]
    PackageDirExists(PathBuf),

    #[error("config error: {message}")]
    Config { message: String },

    #[error("{program} exited with {}: {stderr}", describe_exit(.exit_code))]
    CommandFailed {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("operation failed: {context}")]
    OperationFailed {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("status {code}"),
        None => "no status (killed by signal)".to_string(),
    }
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
