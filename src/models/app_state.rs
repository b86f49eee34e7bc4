use actix::Addr;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::AppConfig;
use crate::engine::{EngineClient, OfflineEngine, StockfishApiClient};
use crate::game::OrchestratorOptions;
use crate::persistence::{JsonFileStore, MemoryStore, PersistenceStore};
use crate::websocket::ChessWebSocket;

/// Application state shared between connections
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn PersistenceStore>,
    pub sessions: Mutex<HashMap<String, Addr<ChessWebSocket>>>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let store: Arc<dyn PersistenceStore> = match &config.save_dir {
            Some(dir) => {
                info!("Saving games under {:?}", dir);
                Arc::new(JsonFileStore::new(dir.clone()))
            }
            None => {
                info!("Saving games in memory only");
                Arc::new(MemoryStore::new())
            }
        };
        Self::with_store(config, store)
    }

    pub fn with_store(config: AppConfig, store: Arc<dyn PersistenceStore>) -> Self {
        Self {
            config,
            store,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Engine client for a new connection
    pub fn new_engine(&self) -> Arc<dyn EngineClient> {
        let Some(url) = &self.config.engine_url else {
            return Arc::new(OfflineEngine);
        };
        match StockfishApiClient::new(url.clone(), self.config.engine_timeout) {
            Ok(client) => Arc::new(client),
            Err(err) => {
                warn!("Engine client unavailable, playing offline: {}", err);
                Arc::new(OfflineEngine)
            }
        }
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            bot_move_delay: self.config.bot_move_delay,
            move_budget: self.config.engine_timeout,
            ..Default::default()
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}
