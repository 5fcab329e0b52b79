//! Signed descriptor envelopes and the CBOR records they carry
//!
//! Genesis descriptor files are JSON envelopes of the form
//! `{"untrusted_raw_value": "<base64>", "signature": {...}}`. The raw value is a
//! CBOR map. Entity descriptors carry `id`, `v` and `nodes`; node descriptors
//! carry at least `id`.

use std::fmt;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use ciborium::value::Value;
use serde::Deserialize;
use tracing::warn;

use crate::domain::error::{DomainError, DomainResult};

/// Raw identifier bytes (an ed25519 public key for well-formed packages).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorId(Vec<u8>);

impl DescriptorId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Standard base64 with padding, the form the node binary expects.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

/// JSON envelope around a CBOR-encoded descriptor.
///
/// The signature block is kept as opaque JSON: it is never verified, so its
/// shape must not decide whether a package is valid.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SignedEnvelope {
    pub untrusted_raw_value: String,
    #[serde(default)]
    pub signature: Option<serde_json::Value>,
}

impl SignedEnvelope {
    /// Parse an envelope from the bytes of `path`.
    pub fn from_json(bytes: &[u8], path: &Path) -> DomainResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| DomainError::MalformedEnvelope {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Base64-decode the raw value.
    pub fn raw_value(&self, path: &Path) -> DomainResult<Vec<u8>> {
        STANDARD
            .decode(self.untrusted_raw_value.trim())
            .map_err(|e| DomainError::InvalidBase64 {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }
}

/// Decoded entity descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub id: DescriptorId,
    /// Descriptor format version; `None` for stale pre-versioned descriptors.
    pub version: Option<u16>,
    /// Nodes registered under this entity. A CBOR `null` decodes to empty.
    pub nodes: Vec<DescriptorId>,
}

impl EntityDescriptor {
    pub fn from_cbor(raw: &[u8], path: &Path) -> DomainResult<Self> {
        let map = CborMap::decode(raw, path)?;
        Ok(Self {
            id: map.required_id("id")?,
            version: map.optional_version(),
            nodes: map.id_list("nodes")?,
        })
    }

    pub fn has_node(&self, node_id: &DescriptorId) -> bool {
        self.nodes.iter().any(|n| n == node_id)
    }
}

/// Decoded node descriptor. Only `id` takes part in validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub id: DescriptorId,
    pub version: Option<u16>,
    pub entity_id: Option<DescriptorId>,
}

impl NodeDescriptor {
    pub fn from_cbor(raw: &[u8], path: &Path) -> DomainResult<Self> {
        let map = CborMap::decode(raw, path)?;
        Ok(Self {
            id: map.required_id("id")?,
            version: map.optional_version(),
            entity_id: map.informational_id("entity_id"),
        })
    }
}

/// Text-keyed view over a decoded CBOR map.
struct CborMap<'a> {
    entries: Vec<(Value, Value)>,
    path: &'a Path,
}

impl<'a> CborMap<'a> {
    fn decode(raw: &[u8], path: &'a Path) -> DomainResult<Self> {
        let value: Value = ciborium::de::from_reader(raw).map_err(|e| {
            DomainError::MalformedDescriptor {
                path: path.to_path_buf(),
                message: format!("invalid CBOR: {e}"),
            }
        })?;
        match value {
            Value::Map(entries) => Ok(Self { entries, path }),
            _ => Err(malformed(path, "payload is not a CBOR map")),
        }
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| matches!(k, Value::Text(t) if t == key))
            .map(|(_, v)| v)
    }

    fn required_id(&self, key: &str) -> DomainResult<DescriptorId> {
        self.optional_id(key)?
            .ok_or_else(|| malformed(self.path, &format!("missing `{key}`")))
    }

    fn optional_id(&self, key: &str) -> DomainResult<Option<DescriptorId>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bytes(b)) => Ok(Some(DescriptorId::new(b.clone()))),
            Some(_) => Err(malformed(self.path, &format!("`{key}` is not a byte string"))),
        }
    }

    /// Like `optional_id`, but an ill-typed value is treated as absent.
    fn informational_id(&self, key: &str) -> Option<DescriptorId> {
        self.optional_id(key).unwrap_or_else(|e| {
            warn!("ignoring {e}");
            None
        })
    }

    /// Descriptor version. Absent, `null` or ill-typed all read as unversioned.
    fn optional_version(&self) -> Option<u16> {
        match self.get("v") {
            None | Some(Value::Null) => None,
            Some(Value::Integer(i)) => u16::try_from(i128::from(*i)).ok().or_else(|| {
                warn!("{}: `v` is out of range, treating as unversioned", self.path.display());
                None
            }),
            Some(_) => {
                warn!("{}: `v` is not an integer, treating as unversioned", self.path.display());
                None
            }
        }
    }

    fn id_list(&self, key: &str) -> DomainResult<Vec<DescriptorId>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::Bytes(b) => Ok(DescriptorId::new(b.clone())),
                    _ => Err(malformed(
                        self.path,
                        &format!("`{key}` contains a non byte string entry"),
                    )),
                })
                .collect(),
            Some(_) => Err(malformed(self.path, &format!("`{key}` is not an array"))),
        }
    }
}

fn malformed(path: &Path, message: &str) -> DomainError {
    DomainError::MalformedDescriptor {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cbor(value: &Value) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(value, &mut buf).unwrap();
        buf
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn given_entity_map_when_decoding_then_reads_id_version_and_nodes() {
        let raw = cbor(&Value::Map(vec![
            (text("v"), Value::Integer(1u8.into())),
            (text("id"), Value::Bytes(vec![1; 32])),
            (text("nodes"), Value::Array(vec![Value::Bytes(vec![2; 32])])),
        ]));

        let entity = EntityDescriptor::from_cbor(&raw, Path::new("e.json")).unwrap();

        assert_eq!(entity.id, DescriptorId::new(vec![1; 32]));
        assert_eq!(entity.version, Some(1));
        assert!(entity.has_node(&DescriptorId::new(vec![2; 32])));
    }

    #[test]
    fn given_null_nodes_and_no_version_when_decoding_then_empty_and_unversioned() {
        let raw = cbor(&Value::Map(vec![
            (text("id"), Value::Bytes(vec![1; 32])),
            (text("nodes"), Value::Null),
        ]));

        let entity = EntityDescriptor::from_cbor(&raw, Path::new("e.json")).unwrap();

        assert!(entity.nodes.is_empty());
        assert_eq!(entity.version, None);
    }

    #[test]
    fn given_non_map_payload_when_decoding_then_malformed() {
        let raw = cbor(&Value::Array(vec![]));

        let err = NodeDescriptor::from_cbor(&raw, Path::new("n.json")).unwrap_err();

        assert!(matches!(err, DomainError::MalformedDescriptor { .. }));
    }

    #[test]
    fn given_node_without_id_when_decoding_then_malformed() {
        let raw = cbor(&Value::Map(vec![(text("v"), Value::Integer(2u8.into()))]));

        let err = NodeDescriptor::from_cbor(&raw, Path::new("n.json")).unwrap_err();

        assert!(err.to_string().contains("missing `id`"));
    }

    #[test]
    fn given_garbage_bytes_when_decoding_then_malformed() {
        let err = EntityDescriptor::from_cbor(&[0xff, 0x00, 0x13], Path::new("e.json"))
            .unwrap_err();

        assert!(matches!(err, DomainError::MalformedDescriptor { .. }));
    }

    #[test]
    fn given_envelope_with_bad_base64_when_decoding_raw_value_then_invalid_base64() {
        let envelope =
            SignedEnvelope::from_json(br#"{"untrusted_raw_value": "!!!"}"#, Path::new("x"))
                .unwrap();

        let err = envelope.raw_value(Path::new("x")).unwrap_err();

        assert!(matches!(err, DomainError::InvalidBase64 { .. }));
    }

    #[test]
    fn given_envelope_with_unexpected_signature_shape_when_parsing_then_ignored() {
        let envelope = SignedEnvelope::from_json(
            br#"{"untrusted_raw_value":"oA==","signature":{}}"#,
            Path::new("x"),
        )
        .unwrap();

        assert_eq!(envelope.raw_value(Path::new("x")).unwrap(), vec![0xa0]);
    }

    #[test]
    fn given_null_version_and_text_entity_id_when_decoding_node_then_treated_as_absent() {
        let raw = cbor(&Value::Map(vec![
            (text("v"), Value::Null),
            (text("id"), Value::Bytes(vec![2; 32])),
            (text("entity_id"), text("not-bytes")),
        ]));

        let node = NodeDescriptor::from_cbor(&raw, Path::new("n.json")).unwrap();

        assert_eq!(node.id, DescriptorId::new(vec![2; 32]));
        assert_eq!(node.version, None);
        assert_eq!(node.entity_id, None);
    }

    #[test]
    fn given_text_version_when_decoding_entity_then_unversioned() {
        let raw = cbor(&Value::Map(vec![
            (text("v"), text("2")),
            (text("id"), Value::Bytes(vec![1; 32])),
        ]));

        let entity = EntityDescriptor::from_cbor(&raw, Path::new("e.json")).unwrap();

        assert_eq!(entity.version, None);
    }

    #[test]
    fn given_envelope_without_raw_value_when_parsing_then_malformed_envelope() {
        let err = SignedEnvelope::from_json(br#"{"signature": null}"#, Path::new("x"))
            .unwrap_err();

        assert!(matches!(err, DomainError::MalformedEnvelope { .. }));
    }
}
