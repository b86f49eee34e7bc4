use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{new_record_id, sort_newest_first, PersistenceError, PersistenceStore};
use crate::models::{SavedGameRecord, SavedGameSummary};

/// In-process store, lost on restart
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, SavedGameRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<String, SavedGameRecord>> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn put(&self, mut record: SavedGameRecord) -> Result<String, PersistenceError> {
        let id = record.id.clone().unwrap_or_else(new_record_id);
        record.id = Some(id.clone());
        self.records().insert(id.clone(), record);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<SavedGameRecord, PersistenceError> {
        self.records()
            .get(id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<SavedGameSummary>, PersistenceError> {
        let mut summaries: Vec<SavedGameSummary> =
            self.records().values().map(SavedGameRecord::summary).collect();
        sort_newest_first(&mut summaries);
        Ok(summaries)
    }

    async fn delete(&self, id: &str) -> Result<(), PersistenceError> {
        self.records()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::test_support::record;

    #[actix_rt::test]
    async fn put_assigns_ids_and_overwrites_known_ones() {
        let store = MemoryStore::new();
        let id = store.put(record("first", 0)).await.unwrap();
        assert!(!id.is_empty());

        let mut again = store.get(&id).await.unwrap();
        again.name = "renamed".to_string();
        assert_eq!(store.put(again).await.unwrap(), id);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&id).await.unwrap().name, "renamed");
    }

    #[actix_rt::test]
    async fn list_is_newest_first() {
        let store = MemoryStore::new();
        store.put(record("older", 30)).await.unwrap();
        store.put(record("newer", 5)).await.unwrap();
        let names: Vec<String> = store.list().await.unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["newer", "older"]);
    }

    #[actix_rt::test]
    async fn missing_records_are_reported() {
        let store = MemoryStore::new();
        assert!(matches!(store.get("nope").await, Err(PersistenceError::NotFound(_))));
        assert!(matches!(store.delete("nope").await, Err(PersistenceError::NotFound(_))));
    }
}
