//! Domain layer: entity packages, descriptors, genesis plans, staking ledger, PR rules
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod descriptor;
pub mod error;
pub mod genesis;
pub mod package;
pub mod pull_request;
pub mod staking;

pub use descriptor::{DescriptorId, EntityDescriptor, NodeDescriptor, SignedEnvelope};
pub use error::{DomainError, DomainResult};
pub use genesis::{ConsensusParameters, GenesisEntity, GenesisPlan};
pub use package::{Address, EntityPackage, FailureReason, PackageReport, UnpackReport};
pub use pull_request::PullRequest;
pub use staking::{LedgerConfig, Quantity, StakingGenesis};

/// Expand `~`, `$VAR` and `${VAR}` in a path-like string.
pub fn expand_env_vars(path: &str) -> String {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}
