use async_trait::async_trait;
use log::{info, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{new_record_id, sort_newest_first, PersistenceError, PersistenceStore};
use crate::models::{SavedGameRecord, SavedGameSummary};

const RECORD_EXTENSION: &str = "json";

/// One pretty-printed JSON file per record inside `dir`
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, PersistenceError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(PersistenceError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{}.{}", id, RECORD_EXTENSION)))
    }

    async fn read_record(path: &Path) -> Result<SavedGameRecord, PersistenceError> {
        let contents = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[async_trait]
impl PersistenceStore for JsonFileStore {
    async fn put(&self, mut record: SavedGameRecord) -> Result<String, PersistenceError> {
        let id = record.id.clone().unwrap_or_else(new_record_id);
        let path = self.path_for(&id)?;
        record.id = Some(id.clone());

        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_string_pretty(&record)?;

        // Write then rename so a crash never leaves half a record
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, json).await?;
        tokio::fs::rename(&staging, &path).await?;

        info!("Saved game {:?} to {:?}", record.name, path);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<SavedGameRecord, PersistenceError> {
        let path = self.path_for(id)?;
        match Self::read_record(&path).await {
            Err(PersistenceError::Io(err)) if err.kind() == ErrorKind::NotFound => {
                Err(PersistenceError::NotFound(id.to_string()))
            }
            other => other,
        }
    }

    async fn list(&self) -> Result<Vec<SavedGameSummary>, PersistenceError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(record) => summaries.push(record.summary()),
                Err(err) => warn!("Skipping unreadable save {:?}: {}", path, err),
            }
        }
        sort_newest_first(&mut summaries);
        Ok(summaries)
    }

    async fn delete(&self, id: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted saved game {}", id);
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(PersistenceError::NotFound(id.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::test_support::record;

    #[actix_rt::test]
    async fn records_survive_a_new_store_instance() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("saves"));
        let id = store.put(record("club night", 0)).await.unwrap();

        let reopened = JsonFileStore::new(dir.path().join("saves"));
        let loaded = reopened.get(&id).await.unwrap();
        assert_eq!(loaded.name, "club night");
        assert_eq!(loaded.id.as_deref(), Some(id.as_str()));
    }

    #[actix_rt::test]
    async fn list_skips_foreign_and_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.put(record("older", 10)).await.unwrap();
        store.put(record("newer", 1)).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let names: Vec<String> = store.list().await.unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["newer", "older"]);
    }

    #[actix_rt::test]
    async fn missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent"));
        assert!(store.list().await.unwrap().is_empty());
        assert!(matches!(store.get("abc").await, Err(PersistenceError::NotFound(_))));
    }

    #[actix_rt::test]
    async fn ids_cannot_escape_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(matches!(
            store.get("../etc/passwd").await,
            Err(PersistenceError::InvalidId(_))
        ));
        let mut sneaky = record("x", 0);
        sneaky.id = Some("a/b".to_string());
        assert!(matches!(store.put(sneaky).await, Err(PersistenceError::InvalidId(_))));
    }

    #[actix_rt::test]
    async fn delete_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let id = store.put(record("gone", 0)).await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(matches!(store.delete(&id).await, Err(PersistenceError::NotFound(_))));
    }
}
