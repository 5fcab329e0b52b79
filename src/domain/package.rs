//! Entity packages: archive naming, allowed members, validation outcome
//!
//! An entity package is a `<owner>-entity.tar.gz` archive with the layout:
//!
//! ```text
//! entity/entity.json
//! entity/entity_genesis.json
//! node/node_genesis.json
//! ```

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::domain::descriptor::{DescriptorId, EntityDescriptor, NodeDescriptor};
use crate::domain::error::{DomainError, DomainResult};

pub const ARCHIVE_SUFFIX: &str = "-entity.tar.gz";

pub const ENTITY_JSON: &str = "entity/entity.json";
pub const ENTITY_GENESIS: &str = "entity/entity_genesis.json";
pub const NODE_GENESIS: &str = "node/node_genesis.json";

/// Files every package must contain.
pub const EXPECTED_FILES: [&str; 3] = [ENTITY_JSON, ENTITY_GENESIS, NODE_GENESIS];

/// Directory entries that may be extracted alongside the expected files.
pub const ALLOWED_DIRECTORIES: [&str; 2] = ["entity", "node"];

/// Derive the owner name from an archive file name.
///
/// Returns `Ok(None)` for files that are not entity archives.
pub fn archive_owner(file_name: &str) -> DomainResult<Option<&str>> {
    let Some(owner) = file_name.strip_suffix(ARCHIVE_SUFFIX) else {
        return Ok(None);
    };
    let degenerate = owner.is_empty() || owner == "." || owner == "..";
    if degenerate || owner.contains(|c: char| c == '/' || c == '\\') {
        return Err(DomainError::InvalidArchiveName(file_name.to_string()));
    }
    Ok(Some(owner))
}

/// Member name as used for allow-list matching: no leading `./`, no trailing `/`.
pub fn normalize_member_name(raw: &str) -> &str {
    let mut name = raw;
    while let Some(rest) = name.strip_prefix("./") {
        name = rest;
    }
    name.trim_end_matches('/')
}

pub fn is_allowed_file(name: &str) -> bool {
    EXPECTED_FILES.contains(&normalize_member_name(name))
}

pub fn is_allowed_directory(name: &str) -> bool {
    ALLOWED_DIRECTORIES.contains(&normalize_member_name(name))
}

/// Why a package is structurally invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// An expected file (relative to the package root) is absent.
    MissingFile(String),
    /// The node descriptor's id is not listed in the entity's `nodes`.
    NodeNotRegistered { node_id: DescriptorId },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::MissingFile(name) => write!(f, "expected file {name} missing"),
            FailureReason::NodeNotRegistered { node_id } => {
                write!(f, "node {node_id} is not registered with the entity")
            }
        }
    }
}

/// An unpacked entity package and what could be loaded from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityPackage {
    pub owner: String,
    pub path: PathBuf,
    pub entity: Option<EntityDescriptor>,
    pub node: Option<NodeDescriptor>,
    pub failures: Vec<FailureReason>,
}

impl EntityPackage {
    pub fn new(owner: impl Into<String>, path: PathBuf) -> Self {
        Self {
            owner: owner.into(),
            path,
            entity: None,
            node: None,
            failures: Vec::new(),
        }
    }

    /// Accept `node` only if the loaded entity lists it.
    ///
    /// Without a loaded entity the node cannot be linked and stays unloaded.
    pub fn link_node(&mut self, node: NodeDescriptor) {
        match &self.entity {
            Some(entity) if entity.has_node(&node.id) => self.node = Some(node),
            _ => self
                .failures
                .push(FailureReason::NodeNotRegistered { node_id: node.id }),
        }
    }

    /// Valid iff both descriptors are loaded.
    pub fn is_valid(&self) -> bool {
        self.entity.is_some() && self.node.is_some()
    }
}

/// Address derived from an entity public key, as printed by the node binary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Accept a single non-empty token; anything else is not an address.
    pub fn parse(output: &str) -> Option<Self> {
        let trimmed = output.trim();
        if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One manifest row worth of information about a processed archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReport {
    pub owner: String,
    pub address: Option<Address>,
    pub entity_id: Option<DescriptorId>,
    pub node_id: Option<DescriptorId>,
    pub valid: bool,
    pub failures: Vec<FailureReason>,
}

impl PackageReport {
    pub fn new(package: &EntityPackage, address: Option<Address>) -> Self {
        Self {
            owner: package.owner.clone(),
            address,
            entity_id: package.entity.as_ref().map(|e| e.id.clone()),
            node_id: package.node.as_ref().map(|n| n.id.clone()),
            valid: package.is_valid(),
            failures: package.failures.clone(),
        }
    }
}

/// Outcome of unpacking a directory of archives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpackReport {
    pub packages: Vec<PackageReport>,
    pub manifest_path: PathBuf,
}

impl UnpackReport {
    pub fn is_success(&self) -> bool {
        self.packages.iter().all(|p| p.valid)
    }

    pub fn invalid_owners(&self) -> Vec<&str> {
        self.packages
            .iter()
            .filter(|p| !p.valid)
            .map(|p| p.owner.as_str())
            .collect()
    }
}
