//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

/// Entity intake and genesis tooling for network launch CI
#[derive(Parser, Debug)]
#[command(name = "genesis-ci")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Config file layered over the global config
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Node binary (overrides config and OASIS_NODE_PATH)
    #[arg(long, global = true, value_hint = ValueHint::ExecutablePath)]
    pub node_binary: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Unpack and validate entity archives, writing a manifest
    Unpack {
        /// Directory containing <owner>-entity.tar.gz archives
        #[arg(value_hint = ValueHint::DirPath)]
        source_dir: PathBuf,
        /// Directory receiving one subdirectory per owner
        #[arg(value_hint = ValueHint::DirPath)]
        dest_dir: PathBuf,
        /// Manifest CSV path (default: <dest_dir>/entities.csv)
        #[arg(long, value_hint = ValueHint::FilePath)]
        manifest: Option<PathBuf>,
        /// Skip address derivation
        #[arg(long)]
        no_address: bool,
    },

    /// Generate the genesis document from unpacked entities
    Generate {
        /// Directory of unpacked entity packages
        #[arg(value_hint = ValueHint::DirPath)]
        entities_dir: PathBuf,
        /// Directory of test entity packages (required with --test-only)
        #[arg(value_hint = ValueHint::DirPath)]
        test_entities_dir: Option<PathBuf>,
        /// Genesis output path
        #[arg(long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
        /// Staking ledger path
        #[arg(long, value_hint = ValueHint::FilePath)]
        staking: Option<PathBuf>,
        /// Build a test network
        #[arg(long)]
        test_only: bool,
    },

    /// Build the staking ledger from unpacked entities and the allocations table
    StakingGenesis {
        /// Directory of unpacked entity packages
        #[arg(value_hint = ValueHint::DirPath)]
        entities_dir: PathBuf,
        /// Ledger config (YAML)
        #[arg(long, value_hint = ValueHint::FilePath)]
        ledger_config: Option<PathBuf>,
        /// Allocations table (CSV)
        #[arg(long, value_hint = ValueHint::FilePath)]
        allocations: Option<PathBuf>,
        /// Staking consensus parameters (JSON)
        #[arg(long, value_hint = ValueHint::FilePath)]
        params: Option<PathBuf>,
        /// Staking ledger output path
        #[arg(long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
        /// Also apply the config's test-only entities
        #[arg(long)]
        test_only: bool,
    },

    /// Boot a node against a genesis document for a few seconds
    DryRun {
        /// Genesis document to test
        #[arg(value_hint = ValueHint::FilePath)]
        genesis_path: PathBuf,
        /// Seconds the node must keep running
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Check that a pull request only adds the author's entity archive
    ValidatePr {
        /// Repository as owner/name (default: config or GITHUB_REPOSITORY)
        #[arg(long)]
        repo: Option<String>,
        /// Pull request ref such as refs/pull/42/merge
        #[arg(long = "ref", env = "GITHUB_REF")]
        git_ref: Option<String>,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Create config template
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show config paths
    Path,
}
