//! Error types for game logic
//!
//! Everything here except `CorruptPosition` is recoverable: the session
//! stays playable and the message is surfaced to the player.

use chess::Square;

use crate::engine::EngineError;
use crate::game::rules::IllegalReason;
use crate::persistence::PersistenceError;

/// Errors that can occur while driving a game session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("there is no piece on {0}")]
    EmptySquare(Square),

    #[error("the piece on {0} does not belong to the side to move")]
    NotYoursToMove(Square),

    #[error("it is not your turn")]
    NotYourTurn,

    #[error("{from}{to} is illegal: {reason}")]
    IllegalMove {
        from: Square,
        to: Square,
        reason: IllegalReason,
    },

    #[error("finish the promotion on {0} first")]
    PromotionPending(Square),

    #[error("no promotion is pending")]
    NoPromotionPending,

    #[error("cannot promote to {0:?}")]
    InvalidPromotionPiece(String),

    #[error("the game is over")]
    GameOver,

    #[error("invalid square {0:?}")]
    InvalidSquare(String),

    /// Non-fatal; the local fallback takes over
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("import failed at token {index} ({token:?}): {reason}")]
    ImportParseFailure {
        index: usize,
        token: String,
        reason: String,
    },

    /// Non-fatal; gameplay continues without the save
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("corrupt position: {0}")]
    CorruptPosition(String),
}

impl From<EngineError> for GameError {
    fn from(err: EngineError) -> Self {
        GameError::EngineUnavailable(err.to_string())
    }
}

impl From<PersistenceError> for GameError {
    fn from(err: PersistenceError) -> Self {
        GameError::PersistenceFailure(err.to_string())
    }
}

/// Result type alias for game operations
pub type GameResult<T> = Result<T, GameError>;
