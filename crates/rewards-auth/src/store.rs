//! JSON key→value file backing the token map and the user agent map
//!
//! Every write replaces the whole file atomically (temp file + rename), so a
//! crash mid-write leaves either the old or the new contents. A tokio Mutex
//! serializes writers inside the process; workers write disjoint keys, so the
//! last writer always carries every other worker's entries too.
//!
//! Loading never fails on bad contents: a corrupt file is logged and treated
//! as empty, because both maps are caches that rebuild themselves.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Thread-safe string map persisted as a pretty-printed JSON object.
pub struct JsonMapStore {
    path: PathBuf,
    state: Mutex<HashMap<String, String>>,
}

impl JsonMapStore {
    /// Load the map from `path`.
    ///
    /// A missing file or unparseable contents yield an empty map. Other I/O
    /// failures (permissions, path is a directory) are returned.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str::<HashMap<String, String>>(&contents) {
                Ok(map) => {
                    info!(path = %path.display(), entries = map.len(), "loaded store");
                    map
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "store file is corrupt, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "store file not found, starting empty");
                HashMap::new()
            }
            Err(e) => {
                return Err(Error::Io(format!("reading {}: {e}", path.display())));
            }
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let state = self.state.lock().await;
        state.get(key).cloned()
    }

    /// Insert or replace a value and persist to disk.
    pub async fn insert(&self, key: String, value: String) -> Result<()> {
        let mut state = self.state.lock().await;
        state.insert(key.clone(), value);
        debug!(key, "store entry updated");
        write_atomic(&self.path, &state).await
    }

    /// Return the existing value for `key`, or insert `make()` and persist.
    ///
    /// The boolean is true when a new value was created. The lookup and the
    /// insert happen under one lock acquisition. When persisting fails the
    /// value stays in memory and the error is returned alongside it.
    pub async fn get_or_insert_with<F>(&self, key: &str, make: F) -> (String, bool, Result<()>)
    where
        F: FnOnce() -> String,
    {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.get(key) {
            return (existing.clone(), false, Ok(()));
        }
        let value = make();
        state.insert(key.to_owned(), value.clone());
        let persisted = write_atomic(&self.path, &state).await;
        (value, true, persisted)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write the map atomically with 0600 permissions (the token map holds
/// bearer tokens).
async fn write_atomic(path: &Path, data: &HashMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Serialize(format!("serializing {}: {e}", path.display())))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("store path has no parent directory".into()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".into());

    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp store file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting store file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp store file: {e}")))?;

    debug!(path = %path.display(), "persisted store");
    Ok(())
}
