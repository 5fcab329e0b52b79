//! Entity manifest CSV
//!
//! One row per processed archive: `name,address,entity_id,node_id`.
//! Absent values are written as [`MISSING_VALUE`].

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::application::{ApplicationResult, IoResultExt};
use crate::domain::PackageReport;
use crate::infrastructure::traits::FileSystem;

pub const MANIFEST_HEADER: [&str; 4] = ["name", "address", "entity_id", "node_id"];

/// Placeholder for values that could not be loaded or derived.
pub const MISSING_VALUE: &str = "unknown_entity_package_invalid";

/// Default manifest file name inside the destination directory.
pub const DEFAULT_MANIFEST_NAME: &str = "entities.csv";

/// Row-at-a-time manifest writer. Every row is flushed as it is appended.
pub struct ManifestWriter {
    writer: csv::Writer<Box<dyn Write + Send>>,
    path: PathBuf,
    rows: usize,
}

impl ManifestWriter {
    /// Create (or truncate) the manifest and write the header.
    pub fn create(fs: &dyn FileSystem, path: &Path) -> ApplicationResult<Self> {
        debug!("manifest: create {}", path.display());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs.create_dir_all(parent)
                .with_path_context("create manifest dir", parent)?;
        }
        let file = fs
            .create_file(path)
            .with_path_context("create manifest", path)?;
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(MANIFEST_HEADER)
            .with_path_context("write manifest header", path)?;
        writer.flush().with_path_context("flush manifest", path)?;

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            rows: 0,
        })
    }

    pub fn append(&mut self, report: &PackageReport) -> ApplicationResult<()> {
        self.writer
            .write_record(Self::row(report))
            .with_path_context("write manifest row", &self.path)?;
        self.writer
            .flush()
            .with_path_context("flush manifest", &self.path)?;
        self.rows += 1;
        Ok(())
    }

    fn row(report: &PackageReport) -> [String; 4] {
        let or_missing = |v: Option<String>| v.unwrap_or_else(|| MISSING_VALUE.to_string());
        [
            report.owner.clone(),
            or_missing(report.address.as_ref().map(|a| a.to_string())),
            or_missing(report.entity_id.as_ref().map(|id| id.to_base64())),
            or_missing(report.node_id.as_ref().map(|id| id.to_base64())),
        ]
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
}
