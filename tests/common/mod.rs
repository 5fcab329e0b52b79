//! Shared fixtures: entity archives, descriptor envelopes, scripted collaborators

#![allow(dead_code)]

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::sync::Mutex;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use ciborium::value::Value;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Builder, EntryType, Header};

use genesis_ci::domain::PullRequest;
use genesis_ci::infrastructure::traits::{CommandRunner, SourceControl, TimedOutcome};
use genesis_ci::infrastructure::{InfraError, InfraResult};

pub const ENTITY_ID: [u8; 32] = [1; 32];
pub const NODE_ID: [u8; 32] = [2; 32];
pub const OTHER_NODE_ID: [u8; 32] = [3; 32];

// ============================================================
// Descriptors
// ============================================================

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn cbor(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf).unwrap();
    buf
}

/// Entity descriptor; `nodes: None` encodes a CBOR null.
pub fn entity_cbor(id: &[u8], nodes: Option<&[&[u8]]>, version: Option<u8>) -> Vec<u8> {
    let mut entries = vec![(text("id"), Value::Bytes(id.to_vec()))];
    if let Some(v) = version {
        entries.push((text("v"), Value::Integer(v.into())));
    }
    let nodes = match nodes {
        Some(ids) => Value::Array(ids.iter().map(|n| Value::Bytes(n.to_vec())).collect()),
        None => Value::Null,
    };
    entries.push((text("nodes"), nodes));
    cbor(&Value::Map(entries))
}

pub fn node_cbor(id: &[u8]) -> Vec<u8> {
    cbor(&Value::Map(vec![
        (text("v"), Value::Integer(1u8.into())),
        (text("id"), Value::Bytes(id.to_vec())),
        (text("entity_id"), Value::Bytes(ENTITY_ID.to_vec())),
    ]))
}

/// JSON envelope around a raw CBOR payload.
pub fn envelope(raw: &[u8]) -> Vec<u8> {
    serde_json::json!({
        "untrusted_raw_value": STANDARD.encode(raw),
        "signature": {"public_key": STANDARD.encode(ENTITY_ID), "signature": "c2ln"},
    })
    .to_string()
    .into_bytes()
}

// ============================================================
// Archives
// ============================================================

/// Builds gzip-compressed tar archives in memory.
pub struct ArchiveBuilder {
    builder: Builder<GzEncoder<Vec<u8>>>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            builder: Builder::new(GzEncoder::new(Vec::new(), Compression::default())),
        }
    }

    pub fn dir(mut self, name: &str) -> Self {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        self.builder
            .append_data(&mut header, name, io::empty())
            .unwrap();
        self
    }

    pub fn file(mut self, name: &str, content: &[u8]) -> Self {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        self.builder.append_data(&mut header, name, content).unwrap();
        self
    }

    pub fn symlink(mut self, name: &str, target: &str) -> Self {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        self.builder.append_link(&mut header, name, target).unwrap();
        self
    }

    /// A complete package whose node is registered with its entity.
    pub fn valid_package() -> Self {
        Self::new()
            .dir("entity")
            .file("entity/entity.json", b"{}")
            .file(
                "entity/entity_genesis.json",
                &envelope(&entity_cbor(&ENTITY_ID, Some(&[&NODE_ID]), Some(1))),
            )
            .dir("node")
            .file("node/node_genesis.json", &envelope(&node_cbor(&NODE_ID)))
    }

    pub fn write_to(self, path: &Path) {
        let gz = self.builder.into_inner().unwrap();
        std::fs::write(path, gz.finish().unwrap()).unwrap();
    }
}

// ============================================================
// Collaborators
// ============================================================

pub fn exit_status(code: i32) -> ExitStatus {
    ExitStatus::from_raw(code << 8)
}

pub fn output(code: i32, stdout: &str, stderr: &str) -> Output {
    Output {
        status: exit_status(code),
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

type Responder = Box<dyn Fn(&str, &[&str]) -> io::Result<Output> + Send + Sync>;

/// Records invocations and answers them from a closure.
pub struct FakeCommandRunner {
    responder: Responder,
    timed_outcome: Option<TimedOutcome>,
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl FakeCommandRunner {
    pub fn new(
        responder: impl Fn(&str, &[&str]) -> io::Result<Output> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            timed_outcome: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every command succeeds with `stdout`.
    pub fn succeeding(stdout: &'static str) -> Self {
        Self::new(move |_, _| Ok(output(0, stdout, "")))
    }

    pub fn with_timed_outcome(mut self, outcome: TimedOutcome) -> Self {
        self.timed_outcome = Some(outcome);
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, cmd: &str, args: &[&str]) {
        let mut call = vec![cmd.to_string()];
        call.extend(args.iter().map(|a| a.to_string()));
        self.calls.lock().unwrap().push(call);
    }
}

impl CommandRunner for FakeCommandRunner {
    fn run(&self, cmd: &str, args: &[&str]) -> io::Result<Output> {
        self.record(cmd, args);
        (self.responder)(cmd, args)
    }

    fn run_with_timeout(
        &self,
        cmd: &str,
        args: &[&str],
        _timeout: Duration,
    ) -> io::Result<TimedOutcome> {
        self.record(cmd, args);
        self.timed_outcome
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no outcome scripted"))
    }
}

/// Serves a fixed pull request or an HTTP failure.
pub struct FakeSourceControl {
    pub pr: Option<PullRequest>,
}

impl SourceControl for FakeSourceControl {
    fn pull_request(&self, _repository: &str, number: u64) -> InfraResult<PullRequest> {
        self.pr.clone().ok_or(InfraError::Http {
            message: format!("pull request {number} not found"),
            status: Some(404),
        })
    }
}

pub fn path_arg(call: &[String], flag: &str) -> Option<PathBuf> {
    call.iter()
        .position(|a| a == flag)
        .and_then(|i| call.get(i + 1))
        .map(PathBuf::from)
}
