use chess::Color;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::game::clock::ClockView;
use crate::models::messages::LastMove;
use crate::models::records::{AnnotatedMove, EvaluationSnapshot};

/// One of the two players
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::White => "white",
            Side::Black => "black",
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

impl From<Side> for Color {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Color::White,
            Side::Black => Color::Black,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status derived from the current position after every transition
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Playing,
    Check,
    Checkmate,
    Stalemate,
    Draw,
}

impl GameStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GameStatus::Checkmate | GameStatus::Stalemate | GameStatus::Draw
        )
    }
}

/// Why a game ended
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Checkmate,
    Stalemate,
    ThreefoldRepetition,
    FiftyMoveRule,
    InsufficientMaterial,
    Timeout,
    /// The flagging side's opponent had no mating material left
    TimeoutVsInsufficientMaterial,
}

/// Final result of a finished game; `winner` is `None` for draws
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameOutcome {
    pub winner: Option<Side>,
    pub reason: EndReason,
}

impl GameOutcome {
    pub fn win(winner: Side, reason: EndReason) -> Self {
        Self {
            winner: Some(winner),
            reason,
        }
    }

    pub fn draw(reason: EndReason) -> Self {
        Self {
            winner: None,
            reason,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self.reason,
            EndReason::Timeout | EndReason::TimeoutVsInsufficientMaterial
        )
    }

    /// Move-list result marker
    pub fn result_marker(&self) -> &'static str {
        match self.winner {
            Some(Side::White) => "1-0",
            Some(Side::Black) => "0-1",
            None => "1/2-1/2",
        }
    }
}

/// Who controls each side
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameMode {
    /// Two humans sharing the board
    Friend,
    /// Human against the engine; `bot_side` is played by the engine
    Bot { bot_side: Side },
}

impl GameMode {
    pub fn bot_side(self) -> Option<Side> {
        match self {
            GameMode::Friend => None,
            GameMode::Bot { bot_side } => Some(bot_side),
        }
    }
}

/// Player-facing settings that survive a reset
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameSettings {
    pub mode: GameMode,
    /// Engine skill level, 0..=20
    pub skill_level: u8,
    pub clock_enabled: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            mode: GameMode::Friend,
            skill_level: 10,
            clock_enabled: true,
        }
    }
}

/// Reason shown to the player after a rejected input
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Hint {
    pub message: String,
    pub seq: u64,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SelectionView {
    pub square: String,
    pub destinations: Vec<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PromotionView {
    pub from: String,
    pub to: String,
    pub side: Side,
}

/// Immutable view of the session published after each transition
#[derive(Serialize, Debug, Clone)]
pub struct GameSnapshot {
    pub fen: String,
    pub turn: Side,
    pub status: GameStatus,
    pub outcome: Option<GameOutcome>,
    pub moves: Vec<String>,
    pub annotated_moves: Vec<AnnotatedMove>,
    pub selection: Option<SelectionView>,
    pub pending_promotion: Option<PromotionView>,
    pub last_move: Option<LastMove>,
    pub clock: ClockView,
    pub evaluation: EvaluationSnapshot,
    pub hint: Option<Hint>,
    pub engine_notice: Option<String>,
    pub bot_thinking: bool,
    pub settings: GameSettings,
    /// Label for `settings.skill_level`
    pub difficulty: &'static str,
    pub review_cursor: Option<usize>,
}
