use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use tracing::debug;

use crate::db::{Database, Snapshot};
use crate::error::OntoError;

pub const SNAPSHOT_FILE: &str = "ontology.json";

/// On-disk home of the database snapshot.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn default_root() -> Result<Utf8PathBuf, OntoError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.data_dir().join("onto-ledger")).ok()
            })
            .ok_or_else(|| OntoError::Filesystem("unable to resolve data directory".to_string()))
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn snapshot_path(&self) -> Utf8PathBuf {
        self.root.join(SNAPSHOT_FILE)
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path().as_std_path().exists()
    }

    pub fn ensure_root(&self) -> Result<(), OntoError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| OntoError::Filesystem(err.to_string()))
    }

    /// Loads the snapshot, or an empty database when none has been saved yet.
    pub fn load(&self) -> Result<Database, OntoError> {
        let path = self.snapshot_path();
        if !path.as_std_path().exists() {
            debug!(%path, "no snapshot yet; starting empty");
            return Ok(Database::new());
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| OntoError::Filesystem(format!("{path}: {err}")))?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .map_err(|err| OntoError::Snapshot(format!("{path}: {err}")))?;
        let db = Database::from_snapshot(snapshot)?;
        debug!(%path, terms = db.term_count(), "loaded snapshot");
        Ok(db)
    }

    /// Writes the snapshot to a temp file next to it and renames it into
    /// place, so a crash leaves either the old or the new snapshot.
    pub fn save(&self, db: &Database) -> Result<(), OntoError> {
        self.ensure_root()?;
        let path = self.snapshot_path();
        let content = serde_json::to_vec_pretty(&db.to_snapshot())
            .map_err(|err| OntoError::Snapshot(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix("onto-ledger-snapshot")
            .tempfile_in(self.root.as_std_path())
            .map_err(|err| OntoError::Filesystem(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| OntoError::Filesystem(err.to_string()))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| OntoError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| OntoError::Filesystem(err.to_string()))?;
        debug!(%path, bytes = content.len(), "saved snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new(Utf8PathBuf::from("/tmp/onto"));
        assert!(store.snapshot_path().ends_with("ontology.json"));
        assert_eq!(store.root(), Utf8Path::new("/tmp/onto"));
    }
}
