//! Entity address derivation through the node binary

use std::sync::Arc;

use tracing::debug;

use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::Address;
use crate::infrastructure::traits::CommandRunner;

/// Narrow seam for turning an entity public key into a staking address.
pub trait AddressDeriver: Send + Sync {
    /// `public_key` is standard base64.
    fn derive_address(&self, public_key: &str) -> ApplicationResult<Address>;
}

/// Runs `<node> stake pubkey2address --public_key <key>`.
pub struct NodeAddressDeriver {
    cmd: Arc<dyn CommandRunner>,
    node_binary: String,
}

impl NodeAddressDeriver {
    pub fn new(cmd: Arc<dyn CommandRunner>, node_binary: impl Into<String>) -> Self {
        Self {
            cmd,
            node_binary: node_binary.into(),
        }
    }
}

impl AddressDeriver for NodeAddressDeriver {
    fn derive_address(&self, public_key: &str) -> ApplicationResult<Address> {
        debug!("derive_address: public_key={}", public_key);
        let args = ["stake", "pubkey2address", "--public_key", public_key];
        let output = self
            .cmd
            .run(&self.node_binary, &args)
            .map_err(|e| ApplicationError::OperationFailed {
                context: format!("run {}", self.node_binary),
                source: Box::new(e),
            })?;

        if !output.status.success() {
            return Err(ApplicationError::CommandFailed {
                program: self.node_binary.clone(),
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Address::parse(&stdout).ok_or_else(|| ApplicationError::CommandFailed {
            program: self.node_binary.clone(),
            exit_code: output.status.code(),
            stderr: format!("unexpected pubkey2address output: {:?}", stdout.trim()),
        })
    }
}
