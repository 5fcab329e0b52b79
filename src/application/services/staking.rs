//! Staking ledger generation from unpacked entity packages
//!
//! Inputs: the ledger config (YAML), the allocations table (CSV), the staking
//! consensus parameters (JSON) and a directory of unpacked packages whose
//! entity descriptors provide the entity addresses.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use itertools::Itertools;
use tracing::{debug, info, instrument};

use crate::application::services::AddressDeriver;
use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::config::Settings;
use crate::domain::package::ENTITY_GENESIS;
use crate::domain::staking::{build_ledger, parse_allocations};
use crate::domain::{
    Address, DomainError, EntityDescriptor, LedgerConfig, SignedEnvelope, StakingGenesis,
};
use crate::infrastructure::traits::FileSystem;

/// Builds the staking ledger and writes it to `genesis.staking_path`.
pub struct StakingService {
    fs: Arc<dyn FileSystem>,
    deriver: Arc<dyn AddressDeriver>,
    settings: Arc<Settings>,
}

impl StakingService {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        deriver: Arc<dyn AddressDeriver>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            fs,
            deriver,
            settings,
        }
    }

    /// Build the ledger for the packages in `entities_dir` and write it as JSON.
    #[instrument(level = "debug", skip(self))]
    pub fn generate(&self, entities_dir: &Path) -> ApplicationResult<StakingGenesis> {
        let staking = &self.settings.staking;
        let config_path = required(
            &staking.ledger_config,
            "staking.ledger_config",
            "--ledger-config",
        )?;
        let allocations_path =
            required(&staking.allocations, "staking.allocations", "--allocations")?;
        let params_path = required(&staking.params, "staking.params", "--params")?;
        let test_only = self.settings.genesis.test_only;

        let config_text = self
            .fs
            .read_to_string(config_path)
            .with_path_context("read ledger config", config_path)?;
        let config = LedgerConfig::from_yaml(&config_text)?;

        let table = self
            .fs
            .read(allocations_path)
            .with_path_context("read allocations", allocations_path)?;
        let allocations = parse_allocations(&table, &config)?;

        let params = self.load_params(params_path)?;
        let entities = self.entity_addresses(entities_dir)?;

        info!(
            "Building staking ledger: {} entities, {} allocations, test_only={}",
            entities.len(),
            allocations.len(),
            test_only
        );
        let ledger = build_ledger(&config, &allocations, &entities, test_only)?;
        let genesis =
            ledger.into_genesis(params, &config.token_symbol, config.token_value_exponent)?;

        let output = &self.settings.genesis.staking_path;
        let json =
            serde_json::to_string(&genesis).map_err(|e| ApplicationError::OperationFailed {
                context: "serialize staking ledger".into(),
                source: Box::new(e),
            })?;
        self.fs
            .write(output, &json)
            .with_path_context("write staking ledger", output)?;
        info!("Staking ledger written to {}", output.display());
        Ok(genesis)
    }

    /// Staking consensus parameters, kept as opaque JSON.
    fn load_params(&self, path: &Path) -> ApplicationResult<serde_json::Value> {
        let bytes = self
            .fs
            .read(path)
            .with_path_context("read staking parameters", path)?;
        let params: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| ApplicationError::OperationFailed {
                context: format!("parse staking parameters: {}", path.display()),
                source: Box::new(e),
            })?;
        if !params.is_object() {
            return Err(DomainError::InvalidLedgerConfig(format!(
                "staking parameters in {} are not a JSON object",
                path.display()
            ))
            .into());
        }
        Ok(params)
    }

    /// Lowercased package directory name to entity address.
    ///
    /// Every package directory must hold an entity descriptor.
    pub fn entity_addresses(
        &self,
        entities_dir: &Path,
    ) -> ApplicationResult<BTreeMap<String, Address>> {
        if !self.fs.is_dir(entities_dir) {
            return Err(ApplicationError::NotADirectory(entities_dir.to_path_buf()));
        }
        let dirs: Vec<PathBuf> = self
            .fs
            .read_dir(entities_dir)
            .with_path_context("read entities dir", entities_dir)?
            .into_iter()
            .filter(|p| self.fs.is_dir(p))
            .sorted()
            .collect();

        let mut addresses = BTreeMap::new();
        for dir in dirs {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            let descriptor = dir.join(ENTITY_GENESIS);
            if !self.fs.is_file(&descriptor) {
                return Err(DomainError::MissingEntityDescriptor(name).into());
            }

            let bytes = self
                .fs
                .read(&descriptor)
                .with_path_context("read entity descriptor", &descriptor)?;
            let raw = SignedEnvelope::from_json(&bytes, &descriptor)?.raw_value(&descriptor)?;
            let entity = EntityDescriptor::from_cbor(&raw, &descriptor)?;
            let address = self.deriver.derive_address(&entity.id.to_base64())?;
            info!("Entity {} has address {}", name, address);

            if addresses.insert(name.clone(), address).is_some() {
                return Err(DomainError::Ledger(format!(
                    "duplicate definitions of entity's account named {name}"
                ))
                .into());
            }
        }
        debug!("entity_addresses: {:?}", addresses);
        Ok(addresses)
    }
}

fn required<'a>(path: &'a Option<PathBuf>, key: &str, flag: &str) -> ApplicationResult<&'a Path> {
    path.as_deref().ok_or_else(|| ApplicationError::Config {
        message: format!("{key} is not set (use {flag})"),
    })
}
