//! I/O boundary traits for testability
//!
//! These traits abstract external I/O operations, allowing services
//! to be tested with mock implementations.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output, Stdio};
use std::time::{Duration, Instant};

use crate::domain::PullRequest;
use crate::infrastructure::InfraResult;

/// Filesystem abstraction for testability.
pub trait FileSystem: Send + Sync {
    /// Read file contents as bytes.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Read file contents to string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Write string content to file.
    fn write(&self, path: &Path, content: &str) -> io::Result<()>;

    /// Create (or truncate) a file for streaming writes.
    fn create_file(&self, path: &Path) -> io::Result<Box<dyn Write + Send>>;

    /// Check if path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Check if path is a regular file (symlinks are followed).
    fn is_file(&self, path: &Path) -> bool;

    /// Check if path is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Create a single directory. Fails if it already exists.
    fn create_dir(&self, path: &Path) -> io::Result<()>;

    /// Create a single directory readable only by the owner. Fails if it already exists.
    fn create_private_dir(&self, path: &Path) -> io::Result<()>;

    /// Create directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Entries of a directory (full paths), in no particular order.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Copy file from source to destination.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;
}

/// How a time-limited command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedOutcome {
    /// Exited on its own before the deadline.
    Exited(ExitStatus),
    /// Still running at the deadline; sent SIGTERM, then ended with this status.
    TimedOut(ExitStatus),
}

/// External command runner abstraction.
pub trait CommandRunner: Send + Sync {
    /// Run a command with arguments, capturing stdout and stderr.
    fn run(&self, cmd: &str, args: &[&str]) -> io::Result<Output>;

    /// Run a command with inherited stdio, asking it to shut down at `timeout`.
    fn run_with_timeout(&self, cmd: &str, args: &[&str], timeout: Duration)
        -> io::Result<TimedOutcome>;
}

/// Source-control API abstraction (pull request metadata).
pub trait SourceControl: Send + Sync {
    /// Author and full list of changed file names of a pull request.
    fn pull_request(&self, repository: &str, number: u64) -> InfraResult<PullRequest>;
}

// ============================================================
// REAL IMPLEMENTATIONS
// ============================================================

/// Real filesystem implementation.
#[derive(Debug, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        std::fs::write(path, content)
    }

    fn create_file(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(std::fs::File::create(path)?))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir(path)
    }

    fn create_private_dir(&self, path: &Path) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            std::fs::DirBuilder::new().mode(0o700).create(path)
        }
        #[cfg(not(unix))]
        {
            std::fs::create_dir(path)
        }
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect()
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        std::fs::copy(from, to)
    }
}

/// Real command runner implementation.
#[derive(Debug, Default)]
pub struct RealCommandRunner;

/// How often a time-limited child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

impl CommandRunner for RealCommandRunner {
    fn run(&self, cmd: &str, args: &[&str]) -> io::Result<Output> {
        std::process::Command::new(cmd).args(args).output()
    }

    fn run_with_timeout(
        &self,
        cmd: &str,
        args: &[&str],
        timeout: Duration,
    ) -> io::Result<TimedOutcome> {
        let mut child = std::process::Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .spawn()?;

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(TimedOutcome::Exited(status));
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline - now));
        }

        // The child may exit between the last poll and the signal.
        if child.try_wait()?.is_none() {
            terminate(&mut child)?;
        }
        let status = child.wait()?;
        Ok(TimedOutcome::TimedOut(status))
    }
}

/// Send SIGTERM so the child can shut down on its own terms.
#[cfg(unix)]
fn terminate(child: &mut std::process::Child) -> io::Result<()> {
    let pid = libc::pid_t::try_from(child.id())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: `pid` belongs to a child that has not been reaped yet.
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(err)
}

#[cfg(not(unix))]
fn terminate(child: &mut std::process::Child) -> io::Result<()> {
    child.kill()
}
