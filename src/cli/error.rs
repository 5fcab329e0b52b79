//! CLI-level errors (wraps infrastructure errors)

use thiserror::Error;

use crate::application::ApplicationError;
use crate::domain::DomainError;
use crate::exitcode;
use crate::infrastructure::InfraError;

/// CLI errors are the top-level error type.
/// These are what get displayed to the user.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Infra(#[from] InfraError),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("{0}")]
    Usage(String),
}

impl From<ApplicationError> for CliError {
    fn from(e: ApplicationError) -> Self {
        CliError::Infra(InfraError::Application(e))
    }
}

impl From<DomainError> for CliError {
    fn from(e: DomainError) -> Self {
        ApplicationError::Domain(e).into()
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Get the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidArgs(_) | CliError::Usage(_) => exitcode::USAGE,
            CliError::Infra(e) => match e {
                InfraError::Io { .. } => exitcode::IOERR,
                InfraError::Http { .. } => exitcode::UNAVAILABLE,
                InfraError::Application(app) => application_exit_code(app),
            },
        }
    }
}

fn application_exit_code(e: &ApplicationError) -> i32 {
    match e {
        ApplicationError::Domain(DomainError::InvalidPullRequestRef(_)) => exitcode::CONFIG,
        ApplicationError::Domain(d) if d.is_data_error() => exitcode::DATAERR,
        ApplicationError::Domain(_) => exitcode::INVALID,
        ApplicationError::Config { .. } => exitcode::CONFIG,
        ApplicationError::NotADirectory(_) => exitcode::NOINPUT,
        ApplicationError::PackageDirExists(_) => exitcode::CANTCREAT,
        ApplicationError::CommandFailed { .. } => exitcode::SOFTWARE,
        ApplicationError::OperationFailed { source, .. } => {
            match source.downcast_ref::<InfraError>() {
                Some(InfraError::Http { .. }) => exitcode::UNAVAILABLE,
                _ => exitcode::IOERR,
            }
        }
    }
}
