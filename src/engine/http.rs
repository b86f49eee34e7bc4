//! Client for a Stockfish HTTP API.
//!
//! The service answers `GET <base>?fen=<fen>&depth=<n>` with
//! `{"success": true, "evaluation": 0.35, "mate": null,
//!   "bestmove": "bestmove e2e4 ponder e7e5"}`.

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use super::{EngineClient, EngineError, MAX_RATING, MIN_RATING};
use crate::models::EvaluationSnapshot;

pub const DEFAULT_ENGINE_URL: &str = "https://stockfish.online/api/s/v2.php";

const MIN_DEPTH: u8 = 1;
const MAX_DEPTH: u8 = 15;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct StockfishResponse {
    pub success: bool,
    #[serde(default)]
    pub evaluation: Option<f64>,
    /// Moves to mate, positive when White mates
    #[serde(default)]
    pub mate: Option<i32>,
    #[serde(default)]
    pub bestmove: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

impl StockfishResponse {
    fn into_success(self) -> Result<Self, EngineError> {
        if self.success {
            Ok(self)
        } else {
            Err(EngineError::Malformed(
                self.data.unwrap_or_else(|| "request was not successful".to_string()),
            ))
        }
    }

    pub fn best_move(&self) -> Option<String> {
        let text = self.bestmove.as_deref()?;
        let mut words = text.split_whitespace();
        let first = words.next()?;
        let mv = if first == "bestmove" { words.next()? } else { first };
        if mv == "(none)" {
            None
        } else {
            Some(mv.to_string())
        }
    }

    pub fn evaluation(&self) -> Result<EvaluationSnapshot, EngineError> {
        if let Some(mate) = self.mate.filter(|m| *m != 0) {
            // Full moves to plies for the mating side
            let plies = mate.signum() * (mate.abs() * 2 - 1);
            return Ok(EvaluationSnapshot::mate(plies));
        }
        match self.evaluation {
            Some(pawns) if pawns.is_finite() => {
                Ok(EvaluationSnapshot::centipawns((pawns * 100.0).round() as i32))
            }
            _ => Err(EngineError::Malformed("no evaluation in response".to_string())),
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EngineError::Timeout
        } else if err.is_decode() {
            EngineError::Malformed(err.to_string())
        } else {
            EngineError::Http(err.to_string())
        }
    }
}

pub struct StockfishApiClient {
    http: reqwest::Client,
    base_url: String,
    depth: AtomicU8,
}

impl StockfishApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(EngineError::from)?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            depth: AtomicU8::new(rating_to_depth(1350)),
        })
    }

    pub fn depth(&self) -> u8 {
        self.depth.load(Ordering::Relaxed)
    }

    async fn query(&self, fen: &str, timeout: Option<Duration>) -> Result<StockfishResponse, EngineError> {
        let depth = self.depth().to_string();
        debug!("Querying engine at depth {} for {}", depth, fen);

        let mut request = self
            .http
            .get(&self.base_url)
            .query(&[("fen", fen), ("depth", depth.as_str())]);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?.error_for_status()?;
        response.json::<StockfishResponse>().await?.into_success()
    }
}

#[async_trait]
impl EngineClient for StockfishApiClient {
    fn set_strength(&self, rating: u32) {
        self.depth.store(rating_to_depth(rating), Ordering::Relaxed);
    }

    async fn best_move(&self, fen: &str, budget: Duration) -> Result<Option<String>, EngineError> {
        let response = self.query(fen, Some(budget)).await?;
        Ok(response.best_move())
    }

    async fn evaluate(&self, fen: &str) -> Result<EvaluationSnapshot, EngineError> {
        self.query(fen, None).await?.evaluation()
    }
}

/// Linear map of the rating range onto search depth
pub fn rating_to_depth(rating: u32) -> u8 {
    let rating = rating.clamp(MIN_RATING, MAX_RATING);
    let span = u32::from(MAX_DEPTH - MIN_DEPTH);
    let depth = u32::from(MIN_DEPTH) + (rating - MIN_RATING) * span / (MAX_RATING - MIN_RATING);
    depth as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> StockfishResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn depth_follows_rating() {
        assert_eq!(rating_to_depth(0), MIN_DEPTH);
        assert_eq!(rating_to_depth(200), MIN_DEPTH);
        assert_eq!(rating_to_depth(2500), MAX_DEPTH);
        assert_eq!(rating_to_depth(9000), MAX_DEPTH);
        assert_eq!(rating_to_depth(1350), 8);
    }

    #[test]
    fn strength_updates_depth() {
        let client = StockfishApiClient::new(DEFAULT_ENGINE_URL, Duration::from_secs(1)).unwrap();
        client.set_strength(2500);
        assert_eq!(client.depth(), MAX_DEPTH);
    }

    #[test]
    fn parses_centipawn_response() {
        let parsed = response(
            r#"{"success":true,"evaluation":0.35,"mate":null,"bestmove":"bestmove e2e4 ponder e7e5","continuation":"e2e4 e7e5"}"#,
        );
        assert_eq!(parsed.best_move().as_deref(), Some("e2e4"));
        assert_eq!(parsed.evaluation(), Ok(EvaluationSnapshot::centipawns(35)));
    }

    #[test]
    fn parses_mate_response() {
        let parsed = response(r#"{"success":true,"evaluation":null,"mate":-2,"bestmove":"bestmove h7h6"}"#);
        assert_eq!(parsed.evaluation(), Ok(EvaluationSnapshot::mate(-3)));
    }

    #[test]
    fn rejects_unsuccessful_and_empty_responses() {
        let failed = response(r#"{"success":false,"data":"Invalid fen"}"#);
        assert_eq!(
            failed.into_success(),
            Err(EngineError::Malformed("Invalid fen".to_string()))
        );

        let empty = response(r#"{"success":true,"bestmove":"bestmove (none)"}"#);
        assert_eq!(empty.best_move(), None);
        assert!(empty.evaluation().is_err());
    }
}
