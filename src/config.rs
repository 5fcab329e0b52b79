//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/genesis-ci/genesis-ci.toml`
//! 3. Explicit config file: `--config <file>`
//! 4. Environment variables: `GENESIS_CI_*` prefix (`__` separates nested keys)
//! 5. CI variables: `OASIS_NODE_PATH`, `GENESIS_OUTPUT_PATH`, `STAKING_GENESIS_PATH`,
//!    `OASIS_TEST_ONLY`, `GITHUB_TOKEN`, `GITHUB_REPOSITORY`
//!
//! Command line flags are applied on top by the CLI layer.

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::expand_env_vars;
use crate::domain::ConsensusParameters;
use crate::infrastructure::github::DEFAULT_API_URL;

/// Genesis document generation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenesisConfig {
    /// Where `genesis init` writes the document
    pub output_path: PathBuf,
    /// Staking ledger passed to `--staking`
    pub staking_path: PathBuf,
    /// Build a test network: no nodes for submitted entities, test entities added
    pub test_only: bool,
    pub chain_id_prefix: String,
    pub test_chain_id_prefix: String,
    pub consensus: ConsensusParameters,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("/tmp/genesis.json"),
            staking_path: PathBuf::from("/tmp/staking.json"),
            test_only: false,
            chain_id_prefix: "quest".into(),
            test_chain_id_prefix: "test".into(),
            consensus: ConsensusParameters::default(),
        }
    }
}

/// Node smoke-test settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DryRunConfig {
    /// Seconds the node must survive
    pub timeout_secs: u64,
    /// Tendermint P2P listen address written to the node config
    pub listen_address: String,
}

impl Default for DryRunConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            listen_address: "tcp://0.0.0.0:26656".into(),
        }
    }
}

/// Staking ledger inputs. The ledger is written to `genesis.staking_path`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StakingConfig {
    /// YAML ledger config: supply, accounts, commission bounds, CSV labels
    pub ledger_config: Option<PathBuf>,
    /// Allocations table (CSV)
    pub allocations: Option<PathBuf>,
    /// Staking consensus parameters (JSON)
    pub params: Option<PathBuf>,
}

/// Source-control API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GithubConfig {
    pub api_url: String,
    /// `owner/name` of the entities repository
    pub repository: Option<String>,
    /// API token; only ever read from the environment
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            repository: None,
            token: None,
        }
    }
}

/// Unified configuration for genesis-ci.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Node binary used for genesis init, address derivation and dry runs
    pub node_binary: PathBuf,
    /// Manifest CSV path (default: `<dest_dir>/entities.csv`)
    pub manifest_path: Option<PathBuf>,
    /// Derive entity addresses with the node binary while unpacking
    pub derive_addresses: bool,
    pub genesis: GenesisConfig,
    pub dry_run: DryRunConfig,
    pub github: GithubConfig,
    pub staking: StakingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            node_binary: PathBuf::from("oasis-node"),
            manifest_path: None,
            derive_addresses: true,
            genesis: GenesisConfig::default(),
            dry_run: DryRunConfig::default(),
            github: GithubConfig::default(),
            staking: StakingConfig::default(),
        }
    }
}

/// Get the XDG config directory for genesis-ci.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "genesis-ci").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("genesis-ci.toml"))
}

impl Settings {
    /// Load settings with layered precedence (see module docs).
    pub fn load(config_file: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut files = Vec::new();
        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                files.push(global_path);
            }
        }
        if let Some(explicit) = config_file {
            if !explicit.is_file() {
                return Err(ApplicationError::Config {
                    message: format!("config file not found: {}", explicit.display()),
                });
            }
            files.push(explicit.to_path_buf());
        }

        let mut settings = Self::build(&files, true)?;
        settings.apply_ci_overrides(|key| std::env::var(key).ok());
        settings.expand_paths();
        Ok(settings)
    }

    /// Load defaults overlaid with the given TOML files only (no environment).
    pub fn from_files(files: &[PathBuf]) -> Result<Self, ApplicationError> {
        let mut settings = Self::build(files, false)?;
        settings.expand_paths();
        Ok(settings)
    }

    fn build(files: &[PathBuf], with_env: bool) -> Result<Self, ApplicationError> {
        let defaults = Config::try_from(&Settings::default()).map_err(config_err)?;
        let mut builder = Config::builder().add_source(defaults);

        for file in files {
            builder = builder.add_source(File::from(file.as_path()).required(true));
        }

        if with_env {
            builder = builder.add_source(
                Environment::with_prefix("GENESIS_CI")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config = builder.build().map_err(config_err)?;
        config.try_deserialize().map_err(config_err)
    }

    /// Apply the variables the CI workflows set.
    ///
    /// `lookup` is `std::env::var` in production.
    pub fn apply_ci_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("OASIS_NODE_PATH") {
            self.node_binary = PathBuf::from(val);
        }
        if let Some(val) = lookup("GENESIS_OUTPUT_PATH") {
            self.genesis.output_path = PathBuf::from(val);
        }
        if let Some(val) = lookup("STAKING_GENESIS_PATH") {
            self.genesis.staking_path = PathBuf::from(val);
        }
        if let Some(val) = lookup("OASIS_TEST_ONLY") {
            self.genesis.test_only = val == "true";
        }
        if let Some(val) = lookup("GITHUB_TOKEN").filter(|t| !t.is_empty()) {
            self.github.token = Some(val);
        }
        if self.github.repository.is_none() {
            self.github.repository = lookup("GITHUB_REPOSITORY").filter(|r| !r.is_empty());
        }
    }

    /// Expand shell variables and tilde in path-like fields.
    ///
    /// Handles `~`, `$VAR`, and `${VAR}` syntax.
    fn expand_paths(&mut self) {
        let expand = |p: &Path| PathBuf::from(expand_env_vars(p.to_string_lossy().as_ref()));

        self.node_binary = expand(&self.node_binary);
        self.manifest_path = self.manifest_path.as_deref().map(expand);
        self.genesis.output_path = expand(&self.genesis.output_path);
        self.genesis.staking_path = expand(&self.genesis.staking_path);
        for path in [
            &mut self.staking.ledger_config,
            &mut self.staking.allocations,
            &mut self.staking.params,
        ] {
            *path = path.as_deref().map(expand);
        }
    }

    /// Node binary as a command string.
    pub fn node_command(&self) -> String {
        self.node_binary.to_string_lossy().into_owned()
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# genesis-ci configuration
#
# Locations (by precedence, lowest to highest):
#   Global:   ~/.config/genesis-ci/genesis-ci.toml
#   Explicit: --config <file>
#   Env:      GENESIS_CI_* variables, e.g. GENESIS_CI_GENESIS__TEST_ONLY=true
#   CI:       OASIS_NODE_PATH, GENESIS_OUTPUT_PATH, STAKING_GENESIS_PATH,
#             OASIS_TEST_ONLY, GITHUB_TOKEN, GITHUB_REPOSITORY

# Node binary (genesis init, pubkey2address, dry runs)
# node_binary = "oasis-node"

# Manifest CSV written by `unpack` (default: <dest_dir>/entities.csv)
# manifest_path = "/tmp/entities.csv"

# Derive entity addresses while unpacking
# derive_addresses = true

[genesis]
# output_path = "/tmp/genesis.json"
# staking_path = "/tmp/staking.json"
# test_only = false
# chain_id_prefix = "quest"
# test_chain_id_prefix = "test"

[genesis.consensus]
# epoch_interval = 600
# timeout_commit = "5s"
# empty_block_interval = "0s"
# max_tx_size = "32kb"
# max_evidence_age_blocks = 100000
# max_evidence_age_time = "172800000000000ns"
# backend = "tendermint"
# max_validators = 100
# max_validators_per_entity = 1
# min_validators = 10
# test_min_validators = 3

[dry_run]
# timeout_secs = 10
# listen_address = "tcp://0.0.0.0:26656"

[github]
# api_url = "https://api.github.com"
# repository = "owner/entities"

[staking]
# ledger_config = "staking_ledger_config.yaml"
# allocations = "allocations.csv"
# params = "staking_params.json"
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn given_no_config_when_building_then_uses_defaults() {
        let settings = Settings::from_files(&[]).expect("load defaults");

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.dry_run.timeout_secs, 10);
        assert_eq!(settings.genesis.consensus.min_validators, 10);
    }

    #[test]
    fn given_ci_variables_when_applying_overrides_then_replaces_values() {
        let vars: HashMap<&str, &str> = [
            ("OASIS_NODE_PATH", "/opt/oasis-node"),
            ("GENESIS_OUTPUT_PATH", "/out/genesis.json"),
            ("OASIS_TEST_ONLY", "true"),
            ("GITHUB_TOKEN", "secret"),
            ("GITHUB_REPOSITORY", "acme/entities"),
        ]
        .into_iter()
        .collect();
        let mut settings = Settings::default();

        settings.apply_ci_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(settings.node_binary, PathBuf::from("/opt/oasis-node"));
        assert_eq!(settings.genesis.output_path, PathBuf::from("/out/genesis.json"));
        assert_eq!(settings.genesis.staking_path, PathBuf::from("/tmp/staking.json"));
        assert!(settings.genesis.test_only);
        assert_eq!(settings.github.token.as_deref(), Some("secret"));
        assert_eq!(settings.github.repository.as_deref(), Some("acme/entities"));
    }

    #[test]
    fn given_configured_repository_when_applying_overrides_then_keeps_it() {
        let mut settings = Settings::default();
        settings.github.repository = Some("mine/entities".into());

        settings.apply_ci_overrides(|k| (k == "GITHUB_REPOSITORY").then(|| "ci/repo".to_string()));

        assert_eq!(settings.github.repository.as_deref(), Some("mine/entities"));
    }

    #[test]
    fn given_token_when_serializing_then_token_is_not_shown() {
        let mut settings = Settings::default();
        settings.github.token = Some("secret".into());

        let toml = settings.to_toml().unwrap();

        assert!(!toml.contains("secret"));
        assert!(toml.contains("node_binary"));
    }

    #[test]
    fn given_tilde_in_staking_inputs_when_expand_paths_then_expands_to_home() {
        let mut settings = Settings::default();
        settings.staking.ledger_config = Some(PathBuf::from("~/ledger.yaml"));

        settings.expand_paths();

        let home = std::env::var("HOME").expect("HOME should be set");
        assert!(settings
            .staking
            .ledger_config
            .unwrap()
            .starts_with(&home));
        assert_eq!(settings.staking.params, None);
    }

    #[test]
    fn given_tilde_in_node_binary_when_expand_paths_then_expands_to_home() {
        let mut settings = Settings {
            node_binary: PathBuf::from("~/bin/oasis-node"),
            ..Settings::default()
        };

        settings.expand_paths();

        let home = std::env::var("HOME").expect("HOME should be set");
        assert!(settings.node_binary.starts_with(&home));
    }
}
