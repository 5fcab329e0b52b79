//! Node smoke test against a generated genesis document
//!
//! Boots the node in a throwaway data directory and checks that it survives
//! the configured wall-clock budget.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::config::Settings;
use crate::infrastructure::traits::{CommandRunner, FileSystem, TimedOutcome};

/// Outcome of a dry run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DryRunOutcome {
    /// Still running at the deadline and shut down cleanly on SIGTERM.
    SurvivedTimeout,
    /// Exited cleanly before the deadline.
    ExitedCleanly,
}

/// Node data directory layout below the temporary root.
struct NodeLayout {
    node_dir: PathBuf,
    genesis_dir: PathBuf,
    config_file: PathBuf,
    genesis_file: PathBuf,
}

impl NodeLayout {
    fn new(root: &Path) -> Self {
        let node_dir = root.join("node");
        let genesis_dir = node_dir.join("genesis");
        Self {
            config_file: node_dir.join("config.yml"),
            genesis_file: genesis_dir.join("genesis.json"),
            node_dir,
            genesis_dir,
        }
    }
}

/// Runs the node binary against a genesis document with a deadline.
pub struct DryRunService {
    fs: Arc<dyn FileSystem>,
    cmd: Arc<dyn CommandRunner>,
    settings: Arc<Settings>,
}

impl DryRunService {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        cmd: Arc<dyn CommandRunner>,
        settings: Arc<Settings>,
    ) -> Self {
        Self { fs, cmd, settings }
    }

    /// Boot the node for at most `timeout`.
    ///
    /// The temporary data directory is removed when this returns.
    #[instrument(level = "debug", skip(self))]
    pub fn run(&self, genesis_path: &Path, timeout: Duration) -> ApplicationResult<DryRunOutcome> {
        if !self.fs.is_file(genesis_path) {
            return Err(ApplicationError::OperationFailed {
                context: format!("genesis document not found: {}", genesis_path.display()),
                source: Box::new(std::io::Error::from(std::io::ErrorKind::NotFound)),
            });
        }

        let tmp = TempDir::new().map_err(|e| ApplicationError::OperationFailed {
            context: "create temporary node directory".into(),
            source: Box::new(e),
        })?;
        info!("Creating storage directory at {}", tmp.path().display());
        let layout = self.prepare(tmp.path(), genesis_path)?;

        let program = self.settings.node_command();
        let config_arg = layout.config_file.to_string_lossy().into_owned();
        let args = ["--config", config_arg.as_str()];
        debug!("run: {} {:?} timeout={:?}", program, args, timeout);

        let outcome = self
            .cmd
            .run_with_timeout(&program, &args, timeout)
            .map_err(|e| ApplicationError::OperationFailed {
                context: format!("run {program}"),
                source: Box::new(e),
            })?;

        match outcome {
            TimedOutcome::TimedOut(status) if status.success() => {
                info!("Node still running after {:?}, shut down cleanly", timeout);
                Ok(DryRunOutcome::SurvivedTimeout)
            }
            TimedOutcome::TimedOut(status) => Err(ApplicationError::CommandFailed {
                program,
                exit_code: status.code(),
                stderr: "node did not shut down cleanly after SIGTERM".into(),
            }),
            TimedOutcome::Exited(status) if status.success() => {
                warn!("Node exited before the deadline with success status");
                Ok(DryRunOutcome::ExitedCleanly)
            }
            TimedOutcome::Exited(status) => Err(ApplicationError::CommandFailed {
                program,
                exit_code: status.code(),
                stderr: "node exited before the dry-run deadline".into(),
            }),
        }
    }

    /// Create the node directories, config file and genesis copy under `root`.
    fn prepare(&self, root: &Path, genesis_path: &Path) -> ApplicationResult<NodeLayout> {
        let layout = NodeLayout::new(root);
        self.fs
            .create_private_dir(&layout.node_dir)
            .with_path_context("create node dir", &layout.node_dir)?;
        self.fs
            .create_private_dir(&layout.genesis_dir)
            .with_path_context("create genesis dir", &layout.genesis_dir)?;

        let config = node_config(root, &self.settings.dry_run.listen_address);
        self.fs
            .write(&layout.config_file, &config)
            .with_path_context("write node config", &layout.config_file)?;
        self.fs
            .copy(genesis_path, &layout.genesis_file)
            .with_path_context("copy genesis", &layout.genesis_file)?;
        Ok(layout)
    }
}

/// Minimal node configuration for a throwaway validator.
pub fn node_config(root: &Path, listen_address: &str) -> String {
    let root = root.display();
    format!(
        r#"datadir: {root}/node
genesis:
  file: {root}/node/genesis/genesis.json

tendermint:
  abci:
    prune:
      strategy: none
  core:
    listen_address: {listen_address}

  db:
    backend: badger
  debug:
    addr_book_lenient: false
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_root_when_rendering_node_config_then_points_into_root() {
        let config = node_config(Path::new("/tmp/x"), "tcp://0.0.0.0:26656");

        assert!(config.starts_with("datadir: /tmp/x/node\n"));
        assert!(config.contains("  file: /tmp/x/node/genesis/genesis.json\n"));
        assert!(config.contains("listen_address: tcp://0.0.0.0:26656"));
        assert!(config.contains("backend: badger"));
    }
}
