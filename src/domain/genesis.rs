//! Genesis document parameters and the `genesis init` argument vector

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::domain::package::{ENTITY_GENESIS, NODE_GENESIS};

/// Consensus and scheduler flags passed to `genesis init`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConsensusParameters {
    pub epoch_interval: u64,
    pub timeout_commit: String,
    pub empty_block_interval: String,
    pub max_tx_size: String,
    pub max_evidence_age_blocks: u64,
    pub max_evidence_age_time: String,
    pub backend: String,
    pub max_validators: u32,
    pub max_validators_per_entity: u32,
    pub min_validators: u32,
    /// Used instead of `min_validators` for test-only networks
    pub test_min_validators: u32,
}

impl Default for ConsensusParameters {
    fn default() -> Self {
        Self {
            epoch_interval: 600,
            timeout_commit: "5s".into(),
            empty_block_interval: "0s".into(),
            max_tx_size: "32kb".into(),
            max_evidence_age_blocks: 100_000,
            max_evidence_age_time: "172800000000000ns".into(),
            backend: "tendermint".into(),
            max_validators: 100,
            max_validators_per_entity: 1,
            min_validators: 10,
            test_min_validators: 3,
        }
    }
}

/// `<prefix>-YYYY-MM-DD-<unix seconds>`
pub fn chain_id<Tz: TimeZone>(prefix: &str, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}-{}", prefix, now.format("%Y-%m-%d-%s"))
}

/// Descriptor files contributed by one unpacked package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisEntity {
    pub entity: PathBuf,
    pub node: Option<PathBuf>,
}

impl GenesisEntity {
    pub fn from_package_dir(package_dir: &Path, with_node: bool) -> Self {
        Self {
            entity: package_dir.join(ENTITY_GENESIS),
            node: with_node.then(|| package_dir.join(NODE_GENESIS)),
        }
    }
}

/// Everything needed to run `genesis init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisPlan {
    pub chain_id: String,
    pub output_path: PathBuf,
    pub staking_path: PathBuf,
    pub params: ConsensusParameters,
    pub entities: Vec<GenesisEntity>,
    pub test_only: bool,
}

impl GenesisPlan {
    pub fn min_validators(&self) -> u32 {
        if self.test_only {
            self.params.test_min_validators
        } else {
            self.params.min_validators
        }
    }

    /// Arguments for the node binary, in the order the node documents them.
    pub fn to_args(&self) -> Vec<String> {
        let p = &self.params;
        let mut args: Vec<String> = vec![
            "genesis".into(),
            "init".into(),
            "--genesis.file".into(),
            self.output_path.display().to_string(),
            "--chain.id".into(),
            self.chain_id.clone(),
            "--staking".into(),
            self.staking_path.display().to_string(),
            "--epochtime.tendermint.interval".into(),
            p.epoch_interval.to_string(),
            "--consensus.tendermint.timeout_commit".into(),
            p.timeout_commit.clone(),
            "--consensus.tendermint.empty_block_interval".into(),
            p.empty_block_interval.clone(),
            "--consensus.tendermint.max_tx_size".into(),
            p.max_tx_size.clone(),
            "--consensus.tendermint.max_evidence_age_blocks".into(),
            p.max_evidence_age_blocks.to_string(),
            "--consensus.tendermint.max_evidence_age_time".into(),
            p.max_evidence_age_time.clone(),
            "--consensus.backend".into(),
            p.backend.clone(),
            "--scheduler.max_validators".into(),
            p.max_validators.to_string(),
            "--scheduler.max_validators_per_entity".into(),
            p.max_validators_per_entity.to_string(),
        ];

        for entity in &self.entities {
            args.push("--entity".into());
            args.push(entity.entity.display().to_string());
            if let Some(node) = &entity.node {
                args.push("--node".into());
                args.push(node.display().to_string());
            }
        }

        args.push("--scheduler.min_validators".into());
        args.push(self.min_validators().to_string());
        args
    }
}
