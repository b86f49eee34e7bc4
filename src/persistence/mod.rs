//! Storage for saved sessions.
//!
//! Records are keyed by an opaque id assigned by the store on first `put`.
//! Writing a record that already has an id overwrites it; the autosave
//! slot relies on this.

pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::models::{SavedGameRecord, SavedGameSummary};

pub use file::JsonFileStore;
pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("record could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no saved game with id {0:?}")]
    NotFound(String),

    #[error("invalid record id {0:?}")]
    InvalidId(String),
}

#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Store `record`, returning its id
    async fn put(&self, record: SavedGameRecord) -> Result<String, PersistenceError>;

    async fn get(&self, id: &str) -> Result<SavedGameRecord, PersistenceError>;

    /// Summaries, most recently saved first
    async fn list(&self) -> Result<Vec<SavedGameSummary>, PersistenceError>;

    async fn delete(&self, id: &str) -> Result<(), PersistenceError>;
}

pub(crate) fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn sort_newest_first(summaries: &mut [SavedGameSummary]) {
    summaries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, TimeZone, Utc};

    use crate::game::clock::TimeControl;
    use crate::game::rules::STANDARD_START_FEN;
    use crate::models::{GameStatus, SavedGameRecord};

    pub fn record(name: &str, minutes_ago: i64) -> SavedGameRecord {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let saved_at = base - Duration::minutes(minutes_ago);
        SavedGameRecord {
            id: None,
            name: name.to_string(),
            created_at: saved_at,
            saved_at,
            autosave: false,
            start_position: STANDARD_START_FEN.to_string(),
            position_encoding: STANDARD_START_FEN.to_string(),
            moves: Vec::new(),
            annotated_moves: Vec::new(),
            clock_config: TimeControl::default(),
            status: GameStatus::Playing,
            result: None,
        }
    }
}
