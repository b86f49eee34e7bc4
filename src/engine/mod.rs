//! Move and evaluation oracle.
//!
//! The engine is best-effort: every call may fail or time out, and the
//! orchestrator always has a local answer ready (`fallback`).

pub mod fallback;
pub mod http;

use async_trait::async_trait;
use std::time::Duration;

use crate::models::EvaluationSnapshot;

pub use fallback::static_evaluation;
pub use http::StockfishApiClient;

pub const MIN_RATING: u32 = 200;
pub const MAX_RATING: u32 = 2500;
pub const MAX_SKILL_LEVEL: u8 = 20;

/// Errors from the engine service; never fatal to a game
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("engine request timed out")]
    Timeout,

    #[error("engine request failed: {0}")]
    Http(String),

    #[error("malformed engine response: {0}")]
    Malformed(String),

    #[error("engine is not available")]
    Unavailable,
}

#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Playing strength as an approximate rating, 200..=2500
    fn set_strength(&self, rating: u32);

    /// Best move in UCI notation, `None` if the engine has nothing to offer
    async fn best_move(&self, fen: &str, budget: Duration) -> Result<Option<String>, EngineError>;

    /// Evaluation from White's point of view
    async fn evaluate(&self, fen: &str) -> Result<EvaluationSnapshot, EngineError>;
}

/// Client used when no engine service is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineEngine;

#[async_trait]
impl EngineClient for OfflineEngine {
    fn set_strength(&self, _rating: u32) {}

    async fn best_move(&self, _fen: &str, _budget: Duration) -> Result<Option<String>, EngineError> {
        Err(EngineError::Unavailable)
    }

    async fn evaluate(&self, _fen: &str) -> Result<EvaluationSnapshot, EngineError> {
        Err(EngineError::Unavailable)
    }
}

/// Skill level 0..=20 to engine rating
pub fn skill_to_rating(skill: u8) -> u32 {
    MIN_RATING + 115 * u32::from(skill.min(MAX_SKILL_LEVEL))
}

pub fn difficulty_label(skill: u8) -> &'static str {
    match skill {
        0..=3 => "Beginner",
        4..=7 => "Intermediate",
        8..=12 => "Advanced",
        13..=17 => "Expert",
        _ => "Master",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skill_spans_the_rating_range() {
        assert_eq!(skill_to_rating(0), MIN_RATING);
        assert_eq!(skill_to_rating(20), MAX_RATING);
        assert_eq!(skill_to_rating(99), MAX_RATING);
        assert_eq!(skill_to_rating(10), 1350);
    }

    #[test]
    fn labels() {
        assert_eq!(difficulty_label(3), "Beginner");
        assert_eq!(difficulty_label(4), "Intermediate");
        assert_eq!(difficulty_label(12), "Advanced");
        assert_eq!(difficulty_label(17), "Expert");
        assert_eq!(difficulty_label(20), "Master");
    }

    #[actix_rt::test]
    async fn offline_engine_is_always_unavailable() {
        let engine = OfflineEngine;
        engine.set_strength(1500);
        assert_eq!(
            engine.best_move("8/8/8/8/8/8/8/8 w - - 0 1", Duration::from_secs(1)).await,
            Err(EngineError::Unavailable)
        );
        assert_eq!(engine.evaluate("").await, Err(EngineError::Unavailable));
    }
}
