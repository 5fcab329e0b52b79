//! Genesis document generation via `<node> genesis init`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use itertools::Itertools;
use tracing::{debug, info, instrument};

use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::config::Settings;
use crate::domain::genesis::chain_id;
use crate::domain::{GenesisEntity, GenesisPlan};
use crate::infrastructure::traits::{CommandRunner, FileSystem};

/// Builds and runs the genesis init command, then normalizes its output.
pub struct GenesisService {
    fs: Arc<dyn FileSystem>,
    cmd: Arc<dyn CommandRunner>,
    settings: Arc<Settings>,
}

impl GenesisService {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        cmd: Arc<dyn CommandRunner>,
        settings: Arc<Settings>,
    ) -> Self {
        Self { fs, cmd, settings }
    }

    /// Assemble the plan for the given package directories.
    ///
    /// In test-only mode `test_entities_dir` is required and its packages are
    /// the only ones contributing nodes.
    pub fn plan(
        &self,
        entities_dir: &Path,
        test_entities_dir: Option<&Path>,
        now: &DateTime<Local>,
    ) -> ApplicationResult<GenesisPlan> {
        let genesis = &self.settings.genesis;
        let test_only = genesis.test_only;

        let mut entities: Vec<GenesisEntity> = self
            .entity_dirs(entities_dir)?
            .iter()
            .map(|dir| GenesisEntity::from_package_dir(dir, !test_only))
            .collect();

        if test_only {
            let test_dir = test_entities_dir.ok_or_else(|| ApplicationError::Config {
                message: "test-only mode requires a test entities directory".into(),
            })?;
            entities.extend(
                self.entity_dirs(test_dir)?
                    .iter()
                    .map(|dir| GenesisEntity::from_package_dir(dir, true)),
            );
        } else if let Some(test_dir) = test_entities_dir {
            debug!("plan: ignoring {} outside test-only mode", test_dir.display());
        }

        let prefix = if test_only {
            &genesis.test_chain_id_prefix
        } else {
            &genesis.chain_id_prefix
        };

        Ok(GenesisPlan {
            chain_id: chain_id(prefix, now),
            output_path: genesis.output_path.clone(),
            staking_path: genesis.staking_path.clone(),
            params: genesis.consensus.clone(),
            entities,
            test_only,
        })
    }

    /// Run `genesis init` for `plan` and pretty-print the resulting document.
    #[instrument(level = "debug", skip(self, plan), fields(chain_id = %plan.chain_id))]
    pub fn generate(&self, plan: &GenesisPlan) -> ApplicationResult<PathBuf> {
        let program = self.settings.node_command();
        let args = plan.to_args();
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        info!(
            "Generating genesis {} with {} entities",
            plan.chain_id,
            plan.entities.len()
        );
        debug!("generate: {} {}", program, args.join(" "));

        let output = self
            .cmd
            .run(&program, &arg_refs)
            .map_err(|e| ApplicationError::OperationFailed {
                context: format!("run {program}"),
                source: Box::new(e),
            })?;
        if !output.status.success() {
            return Err(ApplicationError::CommandFailed {
                program,
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!("Pretty printing genesis");
        self.pretty_print(&plan.output_path)?;
        Ok(plan.output_path.clone())
    }

    /// Rewrite a JSON document with sorted keys and two-space indentation.
    pub fn pretty_print(&self, path: &Path) -> ApplicationResult<()> {
        let content = self
            .fs
            .read(path)
            .with_path_context("read genesis document", path)?;
        let document: serde_json::Value =
            serde_json::from_slice(&content).map_err(|e| ApplicationError::OperationFailed {
                context: format!("parse genesis document: {}", path.display()),
                source: Box::new(e),
            })?;
        let pretty =
            serde_json::to_string_pretty(&document).map_err(|e| ApplicationError::OperationFailed {
                context: format!("serialize genesis document: {}", path.display()),
                source: Box::new(e),
            })?;
        self.fs
            .write(path, &pretty)
            .with_path_context("write genesis document", path)
    }

    /// Package directories directly inside `dir`, sorted; plain files are skipped.
    pub fn entity_dirs(&self, dir: &Path) -> ApplicationResult<Vec<PathBuf>> {
        if !self.fs.is_dir(dir) {
            return Err(ApplicationError::NotADirectory(dir.to_path_buf()));
        }
        let dirs = self
            .fs
            .read_dir(dir)
            .with_path_context("read entities dir", dir)?
            .into_iter()
            .filter(|p| self.fs.is_dir(p))
            .sorted()
            .collect();
        Ok(dirs)
    }
}
