//! Command dispatch: load settings, wire services, render results

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use clap::CommandFactory;
use clap_complete::generate;
use tracing::{debug, instrument};

use crate::application::services::DryRunOutcome;
use crate::application::{ApplicationError, DEFAULT_MANIFEST_NAME};
use crate::cli::args::{Cli, Commands, ConfigCommands};
use crate::cli::output;
use crate::cli::{CliError, CliResult};
use crate::config::{global_config_path, Settings};
use crate::domain::pull_request::parse_pull_request_ref;
use crate::exitcode;
use crate::infrastructure::di::ServiceContainer;

/// Run the parsed command line and return the process exit code.
pub fn execute(cli: &Cli) -> CliResult<i32> {
    if let Commands::Completion { shell } = &cli.command {
        let mut cmd = Cli::command();
        generate(*shell, &mut cmd, "genesis-ci", &mut io::stdout());
        return Ok(exitcode::OK);
    }

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(node_binary) = &cli.node_binary {
        settings.node_binary = node_binary.clone();
    }

    match &cli.command {
        Commands::Unpack {
            source_dir,
            dest_dir,
            manifest,
            no_address,
        } => {
            if *no_address {
                settings.derive_addresses = false;
            }
            let manifest = manifest
                .clone()
                .or_else(|| settings.manifest_path.clone())
                .unwrap_or_else(|| dest_dir.join(DEFAULT_MANIFEST_NAME));
            cmd_unpack(settings, source_dir, dest_dir, &manifest)
        }
        Commands::Generate {
            entities_dir,
            test_entities_dir,
            output,
            staking,
            test_only,
        } => {
            if let Some(path) = output {
                settings.genesis.output_path = path.clone();
            }
            if let Some(path) = staking {
                settings.genesis.staking_path = path.clone();
            }
            if *test_only {
                settings.genesis.test_only = true;
            }
            cmd_generate(settings, entities_dir, test_entities_dir.as_deref())
        }
        Commands::StakingGenesis {
            entities_dir,
            ledger_config,
            allocations,
            params,
            output,
            test_only,
        } => {
            let staking = &mut settings.staking;
            for (slot, flag) in [
                (&mut staking.ledger_config, ledger_config),
                (&mut staking.allocations, allocations),
                (&mut staking.params, params),
            ] {
                if let Some(path) = flag {
                    *slot = Some(path.clone());
                }
            }
            if let Some(path) = output {
                settings.genesis.staking_path = path.clone();
            }
            if *test_only {
                settings.genesis.test_only = true;
            }
            cmd_staking_genesis(settings, entities_dir)
        }
        Commands::DryRun {
            genesis_path,
            timeout,
        } => {
            let secs = timeout.unwrap_or(settings.dry_run.timeout_secs);
            cmd_dry_run(settings, genesis_path, Duration::from_secs(secs))
        }
        Commands::ValidatePr { repo, git_ref } => {
            let repository = repo
                .clone()
                .or_else(|| settings.github.repository.clone());
            cmd_validate_pr(settings, repository, git_ref.as_deref())
        }
        Commands::Config { command } => cmd_config(&settings, command),
        Commands::Completion { .. } => Ok(exitcode::OK),
    }
}

#[instrument(level = "debug", skip(settings))]
fn cmd_unpack(
    settings: Settings,
    source_dir: &Path,
    dest_dir: &Path,
    manifest: &Path,
) -> CliResult<i32> {
    let container = ServiceContainer::new(settings);
    let report = container
        .unpack_service()
        .unpack_all(source_dir, dest_dir, manifest)?;

    output::header("Entity packages");
    for package in &report.packages {
        if package.valid {
            match &package.address {
                Some(address) => output::success_detail(&format!("{} ({})", package.owner, address)),
                None => output::success_detail(&package.owner),
            }
        } else {
            let reasons: Vec<String> = package.failures.iter().map(|f| f.to_string()).collect();
            output::failure(&format!("{}: {}", package.owner, reasons.join("; ")));
        }
    }
    output::action("Manifest", &report.manifest_path.display());

    if report.is_success() {
        Ok(exitcode::OK)
    } else {
        output::error(&format!(
            "invalid entity packages: {}",
            report.invalid_owners().join(", ")
        ));
        Ok(exitcode::INVALID)
    }
}

#[instrument(level = "debug", skip(settings))]
fn cmd_generate(
    settings: Settings,
    entities_dir: &Path,
    test_entities_dir: Option<&Path>,
) -> CliResult<i32> {
    let entities_dir = resolve_dir(entities_dir)?;
    let test_entities_dir = test_entities_dir.map(resolve_dir).transpose()?;

    let container = ServiceContainer::new(settings);
    let service = container.genesis_service();
    let plan = service.plan(&entities_dir, test_entities_dir.as_deref(), &Local::now())?;
    let path = service.generate(&plan)?;

    output::success(&format!("Genesis {} written", plan.chain_id));
    output::detail(&path.display());
    Ok(exitcode::OK)
}

#[instrument(level = "debug", skip(settings))]
fn cmd_staking_genesis(settings: Settings, entities_dir: &Path) -> CliResult<i32> {
    let output_path = settings.genesis.staking_path.clone();
    let container = ServiceContainer::new(settings);
    let genesis = container.staking_service().generate(entities_dir)?;

    let delegations: usize = genesis.delegations.values().map(|d| d.len()).sum();
    output::success(&format!(
        "Staking ledger: {} accounts, {} delegations",
        genesis.ledger.len(),
        delegations
    ));
    output::detail(&format!("common pool {}", genesis.common_pool));
    output::action("Written", &output_path.display());
    Ok(exitcode::OK)
}

#[instrument(level = "debug", skip(settings))]
fn cmd_dry_run(settings: Settings, genesis_path: &Path, timeout: Duration) -> CliResult<i32> {
    let container = ServiceContainer::new(settings);
    match container.dry_run_service().run(genesis_path, timeout)? {
        DryRunOutcome::SurvivedTimeout => {
            output::success(&format!("Node ran for {}s", timeout.as_secs()))
        }
        DryRunOutcome::ExitedCleanly => {
            output::warning("node exited cleanly before the deadline")
        }
    }
    Ok(exitcode::OK)
}

#[instrument(level = "debug", skip(settings))]
fn cmd_validate_pr(
    settings: Settings,
    repository: Option<String>,
    git_ref: Option<&str>,
) -> CliResult<i32> {
    let git_ref = git_ref.ok_or_else(|| config_error("GITHUB_REF is not set (use --ref)"))?;
    let number = parse_pull_request_ref(git_ref)?;
    let repository = repository
        .ok_or_else(|| config_error("repository is not set (use --repo or GITHUB_REPOSITORY)"))?;
    debug!("cmd_validate_pr: {}#{}", repository, number);

    let container = ServiceContainer::new(settings);
    let pr = container
        .pull_request_service()?
        .validate(&repository, number)?;

    output::success(&format!(
        "Pull request #{} by {} only changes its entity archive",
        pr.number, pr.author
    ));
    Ok(exitcode::OK)
}

fn cmd_config(settings: &Settings, command: &ConfigCommands) -> CliResult<i32> {
    match command {
        ConfigCommands::Show => {
            output::info(&settings.to_toml()?);
        }
        ConfigCommands::Path => {
            let path = global_path()?;
            let marker = if path.exists() { "exists" } else { "not found" };
            output::info(&format!("{} ({})", path.display(), marker));
        }
        ConfigCommands::Init { force } => {
            let path = global_path()?;
            if path.exists() && !force {
                return Err(CliError::Usage(format!(
                    "config already exists: {} (use --force to overwrite)",
                    path.display()
                )));
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| io_error("create config dir", e))?;
            }
            std::fs::write(&path, Settings::template())
                .map_err(|e| io_error("write config", e))?;
            output::action("Created", &path.display());
        }
    }
    Ok(exitcode::OK)
}

fn global_path() -> CliResult<PathBuf> {
    global_config_path().ok_or_else(|| config_error("cannot determine config directory"))
}

fn config_error(message: &str) -> CliError {
    ApplicationError::Config {
        message: message.to_string(),
    }
    .into()
}

fn io_error(context: &str, source: io::Error) -> CliError {
    crate::infrastructure::InfraError::io(context, source).into()
}

/// Entity dirs are handed to the node, which runs elsewhere: make them absolute.
fn resolve_dir(path: &Path) -> CliResult<PathBuf> {
    std::path::absolute(path).map_err(|e| io_error(&format!("resolve {}", path.display()), e))
}
