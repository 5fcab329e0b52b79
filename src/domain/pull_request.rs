//! Entity pull request rules
//!
//! An entity PR may touch exactly one file: `entities/<author>-entity.tar.gz`.

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::package::ARCHIVE_SUFFIX;

pub const ENTITIES_DIR: &str = "entities";

/// A pull request as reported by the source-control API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub author: String,
    pub changed_files: Vec<String>,
}

/// The only file an author may change: `entities/<author>-entity.tar.gz`.
pub fn expected_entity_file(author: &str) -> String {
    format!("{ENTITIES_DIR}/{author}{ARCHIVE_SUFFIX}")
}

/// Extract the PR number from a git ref such as `refs/pull/42/merge`.
///
/// The third `/`-separated component must be an integer; the leading
/// components are not inspected.
pub fn parse_pull_request_ref(git_ref: &str) -> DomainResult<u64> {
    git_ref
        .trim()
        .split('/')
        .nth(2)
        .and_then(|number| number.parse().ok())
        .ok_or_else(|| DomainError::InvalidPullRequestRef(git_ref.to_string()))
}

/// Check that `pr` is a single-file entity change by its own author.
pub fn check_entity_change(pr: &PullRequest) -> DomainResult<()> {
    let expected = expected_entity_file(&pr.author);
    match pr.changed_files.as_slice() {
        [] => Err(DomainError::NoChangedFiles),
        [only] if *only == expected => Ok(()),
        [only] => Err(DomainError::UnexpectedEntityFile {
            expected,
            actual: only.clone(),
        }),
        files => Err(DomainError::TooManyChanges { count: files.len() }),
    }
}
