//! Persisted record of what has been applied.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use dofunc_core::{FunctionResource, NamespaceResource, ProviderError, ResourceRecord, Result};
use serde::{Deserialize, Serialize};

pub const STATE_VERSION: u32 = 1;

/// Tracked records keyed by manifest address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    #[serde(default)]
    pub functions: BTreeMap<String, ResourceRecord<FunctionResource>>,
    #[serde(default)]
    pub namespaces: BTreeMap<String, ResourceRecord<NamespaceResource>>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            functions: BTreeMap::new(),
            namespaces: BTreeMap::new(),
        }
    }
}

impl StateFile {
    /// Read the state file, or start empty when it does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ProviderError::io(format!("reading state file {}", path.display()), e));
            }
        };
        let state: StateFile = serde_json::from_str(&raw)
            .map_err(|e| ProviderError::decode(format!("state file {}", path.display()), e))?;
        if state.version > STATE_VERSION {
            return Err(ProviderError::configuration(format!(
                "state file {} has version {}, newest supported is {}",
                path.display(),
                state.version,
                STATE_VERSION
            )));
        }
        Ok(state)
    }

    /// Write the state through a temp file in the same directory and rename
    /// it into place, so readers never observe a torn file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| ProviderError::decode("serializing state", e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| ProviderError::io(format!("creating temp file in {}", dir.display()), e))?;
        tmp.write_all(&json)
            .and_then(|_| tmp.write_all(b"\n"))
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| ProviderError::io("writing state", e))?;
        tmp.persist(path)
            .map_err(|e| ProviderError::io(format!("replacing state file {}", path.display()), e.error))?;
        tracing::debug!(path = %path.display(), "state saved");
        Ok(())
    }

    /// Number of records that currently exist remotely.
    pub fn present_count(&self) -> usize {
        self.functions.values().filter(|r| r.is_present()).count()
            + self.namespaces.values().filter(|r| r.is_present()).count()
    }
}
