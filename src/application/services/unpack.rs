//! Entity archive unpacking and package validation
//!
//! Processes every `<owner>-entity.tar.gz` in a source directory, in file name
//! order: extract allow-listed members into `<dest>/<owner>/`, validate the
//! descriptors, optionally derive the entity address and append a manifest row.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use itertools::Itertools;
use tar::{Archive, EntryType};
use tracing::{debug, error, info, instrument, warn};

use crate::application::manifest::ManifestWriter;
use crate::application::services::address::AddressDeriver;
use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::domain::package::{
    archive_owner, is_allowed_directory, is_allowed_file, normalize_member_name, ENTITY_GENESIS,
    EXPECTED_FILES, NODE_GENESIS,
};
use crate::domain::{
    Address, EntityDescriptor, EntityPackage, FailureReason, NodeDescriptor, PackageReport,
    SignedEnvelope, UnpackReport,
};
use crate::infrastructure::traits::FileSystem;

/// An entity archive found in the source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub owner: String,
    pub path: PathBuf,
}

/// Unpacks and validates entity packages.
pub struct UnpackService {
    fs: Arc<dyn FileSystem>,
    deriver: Option<Arc<dyn AddressDeriver>>,
}

impl UnpackService {
    /// `deriver` is `None` when address derivation is disabled.
    pub fn new(fs: Arc<dyn FileSystem>, deriver: Option<Arc<dyn AddressDeriver>>) -> Self {
        Self { fs, deriver }
    }

    /// Unpack all archives in `source_dir` below `dest_dir` and write the manifest.
    ///
    /// Structurally invalid packages are reported, not raised; corrupt
    /// descriptor data and I/O failures abort the run.
    #[instrument(level = "debug", skip(self))]
    pub fn unpack_all(
        &self,
        source_dir: &Path,
        dest_dir: &Path,
        manifest_path: &Path,
    ) -> ApplicationResult<UnpackReport> {
        if !self.fs.is_dir(source_dir) {
            return Err(ApplicationError::NotADirectory(source_dir.to_path_buf()));
        }
        let archives = self.list_archives(source_dir)?;
        info!(
            "Found {} entity archive(s) in {}",
            archives.len(),
            source_dir.display()
        );

        self.fs
            .create_dir_all(dest_dir)
            .with_path_context("create destination", dest_dir)?;
        let mut manifest = ManifestWriter::create(self.fs.as_ref(), manifest_path)?;
        let mut report = UnpackReport {
            packages: Vec::with_capacity(archives.len()),
            manifest_path: manifest_path.to_path_buf(),
        };

        for archive in &archives {
            info!("Unpacking {}", archive.owner);
            let package_dir = dest_dir.join(&archive.owner);
            if self.fs.exists(&package_dir) {
                return Err(ApplicationError::PackageDirExists(package_dir));
            }
            self.fs
                .create_dir(&package_dir)
                .with_path_context("create package dir", &package_dir)?;

            self.extract(&archive.path, &package_dir)?;
            let package = self.validate(&archive.owner, &package_dir)?;
            let address = self.derive_address(&package);

            let row = PackageReport::new(&package, address);
            manifest.append(&row)?;
            report.packages.push(row);
        }

        for owner in report.invalid_owners() {
            error!("Entity package for {} is invalid", owner);
        }
        debug!(
            "unpack_all: {} row(s) written to {}",
            manifest.rows(),
            manifest.path().display()
        );
        Ok(report)
    }

    /// Entity archives directly inside `dir`, sorted by file name.
    pub fn list_archives(&self, dir: &Path) -> ApplicationResult<Vec<ArchiveEntry>> {
        let entries = self
            .fs
            .read_dir(dir)
            .with_path_context("read source dir", dir)?;

        let mut archives = Vec::new();
        for path in entries
            .into_iter()
            .filter(|p| self.fs.is_file(p))
            .sorted_by(|a, b| a.file_name().cmp(&b.file_name()))
        {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                debug!("list_archives: skipping non-UTF-8 name {}", path.display());
                continue;
            };
            match archive_owner(file_name)? {
                Some(owner) => archives.push(ArchiveEntry {
                    owner: owner.to_string(),
                    path: path.clone(),
                }),
                None => debug!("list_archives: ignoring {}", file_name),
            }
        }
        Ok(archives)
    }

    /// Extract allow-listed members of a gzip-compressed tar into `package_dir`.
    ///
    /// Returns the normalized names that were extracted.
    pub fn extract(&self, archive: &Path, package_dir: &Path) -> ApplicationResult<Vec<String>> {
        let bytes = self.fs.read(archive).with_path_context("read archive", archive)?;
        let mut tar = Archive::new(GzDecoder::new(bytes.as_slice()));
        let mut extracted = Vec::new();

        let entries = tar.entries().with_path_context("open archive", archive)?;
        for entry in entries {
            let mut entry = entry.with_path_context("read archive entry", archive)?;
            let raw_name = entry
                .path()
                .with_path_context("read member name", archive)?
                .to_string_lossy()
                .into_owned();
            let name = normalize_member_name(&raw_name).to_string();
            let entry_type = entry.header().entry_type();

            if is_allowed_file(&name) {
                if entry_type != EntryType::Regular && entry_type != EntryType::Continuous {
                    warn!(
                        "Skipping {} in {}: not a regular file ({:?})",
                        name,
                        archive.display(),
                        entry_type
                    );
                    continue;
                }
                entry
                    .unpack_in(package_dir)
                    .with_path_context("extract member", &package_dir.join(&name))?;
            } else if is_allowed_directory(&name) {
                if entry_type != EntryType::Directory {
                    warn!(
                        "Skipping {} in {}: not a directory ({:?})",
                        name,
                        archive.display(),
                        entry_type
                    );
                    continue;
                }
                let dir = package_dir.join(&name);
                self.fs
                    .create_dir_all(&dir)
                    .with_path_context("create member dir", &dir)?;
            } else {
                debug!("extract: ignoring member {}", raw_name);
                continue;
            }
            extracted.push(name);
        }

        debug!("extract: {} -> {:?}", archive.display(), extracted);
        Ok(extracted)
    }

    /// Validate an unpacked package directory.
    pub fn validate(&self, owner: &str, package_dir: &Path) -> ApplicationResult<EntityPackage> {
        let mut package = EntityPackage::new(owner, package_dir.to_path_buf());

        for name in EXPECTED_FILES {
            if !self.fs.is_file(&package_dir.join(name)) {
                warn!("Entity package for {} is missing {}", owner, name);
                package
                    .failures
                    .push(FailureReason::MissingFile(name.to_string()));
            }
        }
        if !package.failures.is_empty() {
            return Ok(package);
        }

        let entity_path = package_dir.join(ENTITY_GENESIS);
        let entity = EntityDescriptor::from_cbor(&self.read_raw_value(&entity_path)?, &entity_path)?;
        if entity.version.is_none() {
            warn!(
                "Entity descriptor of {} has no version field (stale descriptor format)",
                owner
            );
        }
        package.entity = Some(entity);

        let node_path = package_dir.join(NODE_GENESIS);
        let node = NodeDescriptor::from_cbor(&self.read_raw_value(&node_path)?, &node_path)?;
        let node_id = node.id.clone();
        package.link_node(node);
        if package.node.is_none() {
            warn!(
                "Node {} of {} is not registered with the entity, rejecting it",
                node_id, owner
            );
        }

        Ok(package)
    }

    fn read_raw_value(&self, path: &Path) -> ApplicationResult<Vec<u8>> {
        let bytes = self.fs.read(path).with_path_context("read descriptor", path)?;
        let envelope = SignedEnvelope::from_json(&bytes, path)?;
        Ok(envelope.raw_value(path)?)
    }

    /// Failures are logged and leave the address absent.
    fn derive_address(&self, package: &EntityPackage) -> Option<Address> {
        let deriver = self.deriver.as_ref()?;
        let entity = package.entity.as_ref()?;
        match deriver.derive_address(&entity.id.to_base64()) {
            Ok(address) => {
                debug!("derive_address: {} -> {}", package.owner, address);
                Some(address)
            }
            Err(e) => {
                warn!("Could not derive address for {}: {}", package.owner, e);
                None
            }
        }
    }
}
