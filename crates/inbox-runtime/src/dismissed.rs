//! Persistent set of dismissed notification IDs.
//!
//! Dismissal is a local concept: the server keeps the notification, this
//! process hides it. The set survives restarts as a JSON array on disk.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const DISMISSED_FILE: &str = "dismissed_notifications.json";

#[derive(Debug, thiserror::Error)]
pub enum DismissedError {
    #[error("dismissed store IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dismissed store at {path} is not a JSON string array: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("dismissed store write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Default)]
pub struct DismissedStore {
    ids: BTreeSet<String>,
    /// `None` keeps the set in memory only.
    path: Option<PathBuf>,
}

impl DismissedStore {
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load `<state_dir>/dismissed_notifications.json`; a missing file is an empty set.
    pub fn load(state_dir: &Path) -> Result<Self, DismissedError> {
        let path = state_dir.join(DISMISSED_FILE);
        let ids = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeSet::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|source| DismissedError::Json {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(source) => return Err(DismissedError::Io { path, source }),
        };
        tracing::debug!(path = %path.display(), count = ids.len(), "loaded dismissed notifications");
        Ok(Self {
            ids,
            path: Some(path),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Add `id` and persist. Returns `false` if it was already dismissed.
    pub fn insert(&mut self, id: &str) -> Result<bool, DismissedError> {
        if !self.ids.insert(id.to_string()) {
            return Ok(false);
        }
        if let Err(e) = self.save() {
            self.ids.remove(id);
            return Err(e);
        }
        Ok(true)
    }

    fn save(&self) -> Result<(), DismissedError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| DismissedError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let output = serde_json::to_string_pretty(&self.ids).map_err(|source| DismissedError::Json {
            path: path.clone(),
            source,
        })?;
        // Write beside the target then rename, so a crash never leaves a torn file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, format!("{output}\n")).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DismissedStore::load(dir.path()).expect("load");
        assert!(store.is_empty());
    }

    #[test]
    fn insert_persists_across_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = DismissedStore::load(dir.path()).expect("load");
        assert!(store.insert("n1").expect("insert"));
        assert!(!store.insert("n1").expect("insert again"), "idempotent");
        assert!(store.insert("n7").expect("insert"));

        let reloaded = DismissedStore::load(dir.path()).expect("reload");
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("n1"));
        assert!(reloaded.contains("n7"));
        assert!(!dir.path().join("dismissed_notifications.json.tmp").exists());
    }

    #[test]
    fn creates_missing_state_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("state").join("inboxd");
        let mut store = DismissedStore::load(&nested).expect("load");
        store.insert("abc").expect("insert");
        assert!(nested.join(DISMISSED_FILE).exists());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(DISMISSED_FILE), "{not json").expect("write");
        let err = DismissedStore::load(dir.path()).expect_err("corrupt");
        assert!(matches!(err, DismissedError::Json { .. }));
    }

    #[test]
    fn in_memory_never_touches_disk() {
        let mut store = DismissedStore::in_memory();
        assert!(store.insert("n1").expect("insert"));
        assert!(store.contains("n1"));
    }
}
