//! Saved-state bundles: string keys mapped to opaque byte values.
//!
//! A bundle carries small pieces of session state across a pause/restart
//! cycle. `MemoryBundle` is the in-process store; `BundleFile` persists one as
//! JSON (values base64-encoded) so it survives a real process restart.
//!
//! On-disk format:
//! ```text
//! { "version": 1, "entries": { "<key>": "<base64 bytes>", ... } }
//! ```

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{SealkitError, SealkitResult};

const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Key/value store of byte-array entries supplied by the host lifecycle.
pub trait StateBundle {
    /// Return a copy of the value stored under `key`, if any.
    fn get_bytes(&self, key: &str) -> Option<Vec<u8>>;

    /// Store `value` under `key`, replacing any previous value.
    fn put_bytes(&mut self, key: &str, value: Vec<u8>);

    fn contains(&self, key: &str) -> bool {
        self.get_bytes(key).is_some()
    }
}

/// In-memory bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryBundle {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<u8>> {
        self.entries.remove(key)
    }

    /// Serialize to JSON bytes
    pub fn to_json(&self) -> SealkitResult<Vec<u8>> {
        let doc = BundleDocument {
            version: BUNDLE_FORMAT_VERSION,
            entries: self
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), B64.encode(v)))
                .collect(),
        };
        Ok(serde_json::to_vec_pretty(&doc)?)
    }

    /// Deserialize from JSON bytes
    pub fn from_json(data: &[u8]) -> SealkitResult<Self> {
        let doc: BundleDocument = serde_json::from_slice(data)?;
        if doc.version != BUNDLE_FORMAT_VERSION {
            return Err(SealkitError::Bundle(format!(
                "unsupported bundle version {} (expected {BUNDLE_FORMAT_VERSION})",
                doc.version
            )));
        }

        let mut entries = BTreeMap::new();
        for (key, encoded) in doc.entries {
            let value = B64
                .decode(&encoded)
                .map_err(|e| SealkitError::Bundle(format!("entry {key}: base64 decode: {e}")))?;
            entries.insert(key, value);
        }
        Ok(Self { entries })
    }
}

impl StateBundle for MemoryBundle {
    fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn put_bytes(&mut self, key: &str, value: Vec<u8>) {
        self.entries.insert(key.to_string(), value);
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

#[derive(Serialize, Deserialize)]
struct BundleDocument {
    version: u32,
    entries: BTreeMap<String, String>,
}

/// A `MemoryBundle` persisted to a JSON file.
#[derive(Debug, Clone)]
pub struct BundleFile {
    path: PathBuf,
}

impl BundleFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the bundle. A missing file means there is no saved state and
    /// yields `Ok(None)`.
    pub fn load(&self) -> SealkitResult<Option<MemoryBundle>> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let bundle = MemoryBundle::from_json(&data).map_err(|e| {
            SealkitError::Bundle(format!("parsing {}: {e}", self.path.display()))
        })?;
        tracing::debug!(path = %self.path.display(), entries = bundle.len(), "bundle loaded");
        Ok(Some(bundle))
    }

    /// Write the bundle, replacing the file atomically (temp file + rename).
    pub fn save(&self, bundle: &MemoryBundle) -> SealkitResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = bundle.to_json()?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = open_private(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!(path = %self.path.display(), entries = bundle.len(), "bundle saved");
        Ok(())
    }

    /// Delete the bundle file. Returns whether a file was removed.
    pub fn remove(&self) -> SealkitResult<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
