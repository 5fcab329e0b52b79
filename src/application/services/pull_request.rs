//! Entity pull request validation

use std::sync::Arc;

use tracing::{info, instrument};

use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::pull_request::check_entity_change;
use crate::domain::PullRequest;
use crate::infrastructure::traits::SourceControl;

/// Checks that a pull request only adds the author's own entity archive.
pub struct PullRequestService {
    scm: Arc<dyn SourceControl>,
}

impl PullRequestService {
    pub fn new(scm: Arc<dyn SourceControl>) -> Self {
        Self { scm }
    }

    /// Fetch the pull request and apply the entity change rules.
    #[instrument(level = "debug", skip(self))]
    pub fn validate(&self, repository: &str, number: u64) -> ApplicationResult<PullRequest> {
        let pr = self
            .scm
            .pull_request(repository, number)
            .map_err(|e| ApplicationError::OperationFailed {
                context: format!("fetch pull request {repository}#{number}"),
                source: Box::new(e),
            })?;
        info!(
            "Pull request #{} by {} changes {} file(s)",
            pr.number,
            pr.author,
            pr.changed_files.len()
        );

        check_entity_change(&pr)?;
        Ok(pr)
    }
}
