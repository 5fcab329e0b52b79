//! Application services
//!
//! Concrete service implementations that orchestrate domain logic.
//! Services depend on I/O boundary traits (FileSystem, CommandRunner, etc.)
//! but are themselves concrete structs, not traits.

mod address;
mod dry_run;
mod genesis;
mod pull_request;
mod staking;
mod unpack;

pub use address::{AddressDeriver, NodeAddressDeriver};
pub use dry_run::{node_config, DryRunOutcome, DryRunService};
pub use genesis::GenesisService;
pub use pull_request::PullRequestService;
pub use staking::StakingService;
pub use unpack::{ArchiveEntry, UnpackService};
