use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use evalgrid_core::{digest_parts, io_error, EvalResult, GroupKey};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::node::ComponentNode;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoredComponent {
    format: u32,
    group: String,
    key: String,
    kind: String,
    payload: Vec<u8>,
}

/// On-disk component store. Entries are a cache, never a source of truth:
/// anything missing or unreadable is reported as absent.
#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    /// Opens (creating if needed) the store directory.
    pub fn open(dir: impl Into<PathBuf>) -> EvalResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| io_error("cache-dir-create", err))?;
        Ok(Self { dir })
    }

    /// Store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Content signature of an entry, derived from its group and build key.
    pub fn signature(group: &GroupKey, node: &ComponentNode) -> String {
        digest_parts(&[group.as_str().as_bytes(), node.key().as_str().as_bytes()])
    }

    /// Path of the entry for a node.
    pub fn entry_path(&self, group: &GroupKey, node: &ComponentNode) -> PathBuf {
        self.dir.join(format!("{}.bin", Self::signature(group, node)))
    }

    /// Reads the payload stored for a node, if a valid entry exists.
    pub fn load(&self, group: &GroupKey, node: &ComponentNode) -> Option<Vec<u8>> {
        let path = self.entry_path(group, node);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => {
                debug!(key = %node.key(), "component not in disk cache");
                return None;
            }
        };
        let stored: StoredComponent = match bincode::deserialize(&bytes) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "discarding corrupt cache entry");
                let _ = fs::remove_file(&path);
                return None;
            }
        };
        if stored.format != FORMAT_VERSION
            || stored.group != group.as_str()
            || stored.key != node.key().as_str()
            || stored.kind != node.kind()
        {
            warn!(path = %path.display(), "discarding mismatched cache entry");
            let _ = fs::remove_file(&path);
            return None;
        }
        Some(stored.payload)
    }

    /// Writes a payload atomically (temporary file, then rename).
    pub fn save(&self, group: &GroupKey, node: &ComponentNode, payload: Vec<u8>) -> EvalResult<()> {
        let stored = StoredComponent {
            format: FORMAT_VERSION,
            group: group.as_str().to_string(),
            key: node.key().as_str().to_string(),
            kind: node.kind().to_string(),
            payload,
        };
        let bytes = bincode::serialize(&stored).map_err(|err| io_error("cache-encode", err))?;
        let mut tmp =
            NamedTempFile::new_in(&self.dir).map_err(|err| io_error("cache-tmp-create", err))?;
        tmp.write_all(&bytes)
            .map_err(|err| io_error("cache-tmp-write", err))?;
        tmp.persist(self.entry_path(group, node))
            .map_err(|err| io_error("cache-persist", err))?;
        Ok(())
    }
}
