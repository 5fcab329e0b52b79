//! genesis-ci: entity intake and genesis tooling for network launch CI
//!
//! Layers, outermost first:
//! - [`cli`]: argument parsing, command dispatch, exit codes
//! - [`infrastructure`]: real I/O, GitHub client, service wiring
//! - [`application`]: services orchestrating unpacking, genesis, dry runs, PR checks
//! - [`domain`]: descriptors, packages, genesis plans, PR rules (no I/O)

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
