//! Service container for dependency injection
//!
//! Wires up all services with their dependencies.

use std::sync::Arc;

use crate::application::services::{
    AddressDeriver, DryRunService, GenesisService, NodeAddressDeriver, PullRequestService,
    StakingService, UnpackService,
};
use crate::application::ApplicationError;
use crate::config::Settings;
use crate::infrastructure::github::GithubClient;
use crate::infrastructure::traits::{
    CommandRunner, FileSystem, RealCommandRunner, RealFileSystem, SourceControl,
};
use crate::infrastructure::InfraResult;

/// Container holding the shared dependencies and building services from them.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,

    /// Command runner abstraction
    pub cmd: Arc<dyn CommandRunner>,
}

impl ServiceContainer {
    /// Create a new service container with real implementations.
    pub fn new(settings: Settings) -> Self {
        Self::with_deps(
            settings,
            Arc::new(RealFileSystem),
            Arc::new(RealCommandRunner),
        )
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(
        settings: Settings,
        fs: Arc<dyn FileSystem>,
        cmd: Arc<dyn CommandRunner>,
    ) -> Self {
        let settings = Arc::new(settings);

        Self { settings, fs, cmd }
    }

    /// Unpack service; addresses are derived when enabled in settings.
    pub fn unpack_service(&self) -> UnpackService {
        let deriver = self.settings.derive_addresses.then(|| {
            Arc::new(NodeAddressDeriver::new(
                self.cmd.clone(),
                self.settings.node_command(),
            )) as Arc<dyn AddressDeriver>
        });
        UnpackService::new(self.fs.clone(), deriver)
    }

    pub fn genesis_service(&self) -> GenesisService {
        GenesisService::new(self.fs.clone(), self.cmd.clone(), self.settings.clone())
    }

    /// Staking service; entity addresses always come from the node binary.
    pub fn staking_service(&self) -> StakingService {
        let deriver = Arc::new(NodeAddressDeriver::new(
            self.cmd.clone(),
            self.settings.node_command(),
        ));
        StakingService::new(self.fs.clone(), deriver, self.settings.clone())
    }

    pub fn dry_run_service(&self) -> DryRunService {
        DryRunService::new(self.fs.clone(), self.cmd.clone(), self.settings.clone())
    }

    /// PR service backed by the GitHub API; requires a token.
    pub fn pull_request_service(&self) -> InfraResult<PullRequestService> {
        let github = &self.settings.github;
        let token = github
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApplicationError::Config {
                message: "GITHUB_TOKEN is not set".into(),
            })?;
        let client = GithubClient::new(&github.api_url, token)?;
        Ok(self.pull_request_service_with(Arc::new(client)))
    }

    /// PR service with a custom source-control backend (for testing).
    pub fn pull_request_service_with(&self, scm: Arc<dyn SourceControl>) -> PullRequestService {
        PullRequestService::new(scm)
    }
}
