//! Server configuration from environment variables.
//!
//! A `.env` file in the working directory is read first when present;
//! real environment variables win over it.

use log::warn;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::http::DEFAULT_ENGINE_URL;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub static_dir: PathBuf,
    /// Directory for saved games; `None` keeps saves in memory
    pub save_dir: Option<PathBuf>,
    /// Stockfish API endpoint; `None` or empty runs offline
    pub engine_url: Option<String>,
    pub engine_timeout: Duration,
    pub bot_move_delay: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            static_dir: PathBuf::from("./static"),
            save_dir: Some(PathBuf::from("./saves")),
            engine_url: Some(DEFAULT_ENGINE_URL.to_string()),
            engine_timeout: Duration::from_secs(3),
            bot_move_delay: Duration::from_millis(800),
        }
    }
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment
    pub fn load() -> Self {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                warn!("Ignoring unreadable .env file: {}", err);
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or invalid values keep defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string());

        let save_dir = match text("CHESS_SAVE_DIR") {
            Some(dir) if dir.is_empty() || dir == "memory" => None,
            Some(dir) => Some(PathBuf::from(dir)),
            None => defaults.save_dir,
        };
        let engine_url = match text("CHESS_ENGINE_URL") {
            Some(url) if url.is_empty() || url == "off" => None,
            Some(url) => Some(url),
            None => defaults.engine_url,
        };

        Self {
            bind_addr: text("CHESS_BIND_ADDR")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.bind_addr),
            static_dir: text("CHESS_STATIC_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            save_dir,
            engine_url,
            engine_timeout: millis(&lookup, "CHESS_ENGINE_TIMEOUT_MS")
                .unwrap_or(defaults.engine_timeout),
            bot_move_delay: millis(&lookup, "CHESS_BOT_DELAY_MS")
                .unwrap_or(defaults.bot_move_delay),
        }
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match u64::from_str(raw.trim()) {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(err) => {
            warn!("Ignoring {}={:?}: {}", key, raw, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        assert_eq!(config(&[]), AppConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let cfg = config(&[
            ("CHESS_BIND_ADDR", "0.0.0.0:9000"),
            ("CHESS_STATIC_DIR", "/srv/chess"),
            ("CHESS_SAVE_DIR", "/var/lib/chess"),
            ("CHESS_ENGINE_URL", "http://localhost:9999/eval"),
            ("CHESS_ENGINE_TIMEOUT_MS", "1500"),
            ("CHESS_BOT_DELAY_MS", "0"),
        ]);
        assert_eq!(cfg.bind_addr, "0.0.0.0:9000");
        assert_eq!(cfg.static_dir, PathBuf::from("/srv/chess"));
        assert_eq!(cfg.save_dir, Some(PathBuf::from("/var/lib/chess")));
        assert_eq!(cfg.engine_url.as_deref(), Some("http://localhost:9999/eval"));
        assert_eq!(cfg.engine_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.bot_move_delay, Duration::ZERO);
    }

    #[test]
    fn engine_and_disk_can_be_switched_off() {
        let cfg = config(&[("CHESS_ENGINE_URL", "off"), ("CHESS_SAVE_DIR", "memory")]);
        assert_eq!(cfg.engine_url, None);
        assert_eq!(cfg.save_dir, None);
    }

    #[test]
    fn bad_numbers_fall_back() {
        let cfg = config(&[("CHESS_ENGINE_TIMEOUT_MS", "soon")]);
        assert_eq!(cfg.engine_timeout, AppConfig::default().engine_timeout);
    }
}
