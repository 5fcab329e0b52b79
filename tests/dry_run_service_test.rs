//! Tests for DryRunService

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use common::{exit_status, FakeCommandRunner};
use genesis_ci::application::services::{DryRunOutcome, DryRunService};
use genesis_ci::application::ApplicationError;
use genesis_ci::config::Settings;
use genesis_ci::infrastructure::traits::{RealFileSystem, TimedOutcome};
use genesis_ci::util::testing::init_test_setup;

fn service(cmd: Arc<FakeCommandRunner>) -> DryRunService {
    let settings = Settings {
        node_binary: PathBuf::from("/opt/oasis-node"),
        ..Settings::default()
    };
    DryRunService::new(Arc::new(RealFileSystem), cmd, Arc::new(settings))
}

fn genesis_file(temp: &TempDir) -> PathBuf {
    let path = temp.path().join("genesis.json");
    std::fs::write(&path, r#"{"chain_id": "test"}"#).unwrap();
    path
}

#[test]
fn given_node_still_running_at_deadline_when_dry_run_then_passes() {
    // Arrange
    init_test_setup();
    let temp = TempDir::new().unwrap();
    let genesis = genesis_file(&temp);
    let cmd = Arc::new(
        FakeCommandRunner::succeeding("").with_timed_outcome(TimedOutcome::TimedOut(exit_status(0))),
    );

    // Act
    let outcome = service(cmd.clone())
        .run(&genesis, Duration::from_secs(10))
        .unwrap();

    // Assert
    assert_eq!(outcome, DryRunOutcome::SurvivedTimeout);
    let calls = cmd.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][0], "/opt/oasis-node");
    assert_eq!(calls[0][1], "--config");
    assert!(calls[0][2].ends_with("node/config.yml"));
    // temporary node directory is removed afterwards
    assert!(!PathBuf::from(&calls[0][2]).exists());
}

#[test]
fn given_node_exiting_early_with_error_when_dry_run_then_fails() {
    // Arrange
    init_test_setup();
    let temp = TempDir::new().unwrap();
    let genesis = genesis_file(&temp);
    let cmd = Arc::new(
        FakeCommandRunner::succeeding("").with_timed_outcome(TimedOutcome::Exited(exit_status(1))),
    );

    // Act
    let err = service(cmd).run(&genesis, Duration::from_secs(10)).unwrap_err();

    // Assert
    assert!(matches!(
        err,
        ApplicationError::CommandFailed {
            exit_code: Some(1),
            ..
        }
    ));
}

#[test]
fn given_node_failing_to_shut_down_cleanly_when_dry_run_then_fails() {
    // Arrange
    init_test_setup();
    let temp = TempDir::new().unwrap();
    let genesis = genesis_file(&temp);
    let cmd = Arc::new(
        FakeCommandRunner::succeeding("").with_timed_outcome(TimedOutcome::TimedOut(exit_status(3))),
    );

    // Act
    let err = service(cmd).run(&genesis, Duration::from_secs(10)).unwrap_err();

    // Assert
    assert!(matches!(
        err,
        ApplicationError::CommandFailed {
            exit_code: Some(3),
            ..
        }
    ));
}

#[test]
fn given_missing_genesis_when_dry_run_then_fails_before_running_node() {
    // Arrange
    init_test_setup();
    let temp = TempDir::new().unwrap();
    let cmd = Arc::new(
        FakeCommandRunner::succeeding("").with_timed_outcome(TimedOutcome::TimedOut(exit_status(0))),
    );

    // Act
    let result = service(cmd.clone()).run(&temp.path().join("missing.json"), Duration::from_secs(1));

    // Assert
    assert!(matches!(result, Err(ApplicationError::OperationFailed { .. })));
    assert!(cmd.calls().is_empty());
}

#[cfg(unix)]
#[test]
fn given_real_process_trapping_sigterm_when_run_with_timeout_then_shutdown_status_reported() {
    use genesis_ci::infrastructure::traits::{CommandRunner, RealCommandRunner};

    // Arrange
    let runner = RealCommandRunner;
    let script = "trap 'echo got-term >&2; exit 3' TERM; while true; do sleep 0.1; done";

    // Act
    let outcome = runner
        .run_with_timeout("sh", &["-c", script], Duration::from_millis(500))
        .unwrap();

    // Assert
    match outcome {
        TimedOutcome::TimedOut(status) => assert_eq!(status.code(), Some(3)),
        TimedOutcome::Exited(status) => panic!("exited before the deadline: {status}"),
    }
}

#[cfg(unix)]
#[test]
fn given_real_process_exiting_zero_on_sigterm_when_run_with_timeout_then_clean_shutdown() {
    use genesis_ci::infrastructure::traits::{CommandRunner, RealCommandRunner};

    // Arrange
    let runner = RealCommandRunner;
    let script = "trap 'exit 0' TERM; while true; do sleep 0.1; done";

    // Act
    let outcome = runner
        .run_with_timeout("sh", &["-c", script], Duration::from_millis(500))
        .unwrap();

    // Assert
    assert_eq!(outcome, TimedOutcome::TimedOut(exit_status(0)));
}

#[cfg(unix)]
#[test]
fn given_node_trapping_sigterm_with_error_when_dry_run_then_fails() {
    use genesis_ci::infrastructure::traits::RealCommandRunner;
    use std::os::unix::fs::PermissionsExt;

    // Arrange
    init_test_setup();
    let temp = TempDir::new().unwrap();
    let genesis = genesis_file(&temp);
    let node = temp.path().join("fake-node");
    std::fs::write(
        &node,
        "#!/bin/sh\ntrap 'echo got-term >&2; exit 3' TERM\nwhile true; do sleep 0.1; done\n",
    )
    .unwrap();
    std::fs::set_permissions(&node, std::fs::Permissions::from_mode(0o755)).unwrap();
    let settings = Settings {
        node_binary: node,
        ..Settings::default()
    };
    let service = DryRunService::new(
        Arc::new(RealFileSystem),
        Arc::new(RealCommandRunner),
        Arc::new(settings),
    );

    // Act
    let err = service.run(&genesis, Duration::from_millis(500)).unwrap_err();

    // Assert
    assert!(matches!(
        err,
        ApplicationError::CommandFailed {
            exit_code: Some(3),
            ..
        }
    ));
}

#[cfg(unix)]
#[test]
fn given_real_failing_process_when_dry_run_then_exit_status_reported() {
    use genesis_ci::infrastructure::traits::{CommandRunner, RealCommandRunner};

    // Arrange
    let runner = RealCommandRunner;

    // Act
    let outcome = runner
        .run_with_timeout("false", &[], Duration::from_secs(5))
        .unwrap();

    // Assert
    match outcome {
        TimedOutcome::Exited(status) => assert!(!status.success()),
        TimedOutcome::TimedOut(_) => panic!("`false` should exit immediately"),
    }
}
