//! The mutable game session owned by the orchestrator.
//!
//! Every derived field (turn, status, last move) is recomputed from the
//! current position inside the transition that changed it.

use chess::{ChessMove, Square};

use crate::game::error::{GameError, GameResult};
use crate::game::material::can_force_mate;
use crate::game::rules::{DrawReason, IllegalReason, Position};
use crate::models::{
    AnnotatedMove, EndReason, EvaluationSnapshot, GameOutcome, GameStatus, LastMove,
    PromotionView, SelectionView, Side,
};

/// One applied ply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedMove {
    pub chess_move: ChessMove,
    pub san: String,
    pub mover: Side,
}

/// The human's tentative move origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub square: Square,
    pub destinations: Vec<Square>,
}

impl Selection {
    pub fn view(&self) -> SelectionView {
        SelectionView {
            square: self.square.to_string(),
            destinations: self.destinations.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A pawn reached its last rank and waits for a piece choice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPromotion {
    pub from: Square,
    pub to: Square,
    pub moving: Side,
    /// Selection to put back if the player cancels
    prior_selection: Option<Selection>,
}

impl PendingPromotion {
    pub fn view(&self) -> PromotionView {
        PromotionView {
            from: self.from.to_string(),
            to: self.to.to_string(),
            side: self.moving,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameSession {
    start: Position,
    current: Position,
    /// Position before each ply; `history[i]` is where `moves[i]` was played
    history: Vec<Position>,
    moves: Vec<PlayedMove>,
    annotations: Vec<AnnotatedMove>,
    status: GameStatus,
    outcome: Option<GameOutcome>,
    selection: Option<Selection>,
    pending_promotion: Option<PendingPromotion>,
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new(Position::initial())
    }
}

impl GameSession {
    pub fn new(start: Position) -> Self {
        let mut session = Self {
            current: start.clone(),
            start,
            history: Vec::new(),
            moves: Vec::new(),
            annotations: Vec::new(),
            status: GameStatus::Playing,
            outcome: None,
            selection: None,
            pending_promotion: None,
        };
        session.recompute_status();
        session
    }

    /// Rebuild a session by replaying moves from `start`.
    ///
    /// Each annotation is sealed with unknown evaluations and no quality.
    pub fn replay(start: Position, moves: &[ChessMove]) -> GameResult<Self> {
        let mut session = Self::new(start);
        for (index, mv) in moves.iter().enumerate() {
            let ply = session
                .apply_move(*mv, EvaluationSnapshot::unknown(), 0)
                .map_err(|reason| {
                    GameError::CorruptPosition(format!("ply {} ({}) is illegal: {}", index, mv, reason))
                })?;
            session.seal_annotation(ply, EvaluationSnapshot::unknown(), EvaluationSnapshot::unknown());
        }
        Ok(session)
    }

    pub fn start(&self) -> &Position {
        &self.start
    }

    pub fn position(&self) -> &Position {
        &self.current
    }

    pub fn turn(&self) -> Side {
        self.current.turn().into()
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn outcome(&self) -> Option<GameOutcome> {
        self.outcome
    }

    pub fn is_over(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn ply_count(&self) -> usize {
        self.moves.len()
    }

    pub fn moves(&self) -> &[PlayedMove] {
        &self.moves
    }

    pub fn sans(&self) -> Vec<String> {
        self.moves.iter().map(|m| m.san.clone()).collect()
    }

    pub fn annotations(&self) -> &[AnnotatedMove] {
        &self.annotations
    }

    /// Position after `ply` moves, 0 being the start position
    pub fn position_after(&self, ply: usize) -> Option<&Position> {
        if ply == self.moves.len() {
            Some(&self.current)
        } else {
            self.history.get(ply)
        }
    }

    pub fn last_move(&self) -> Option<LastMove> {
        self.moves.last().map(|m| LastMove {
            from: m.chess_move.get_source().to_string(),
            to: m.chess_move.get_dest().to_string(),
        })
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn select(&mut self, square: Square) {
        let destinations = self.current.legal_destinations(square);
        self.selection = Some(Selection {
            square,
            destinations,
        });
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn pending_promotion(&self) -> Option<&PendingPromotion> {
        self.pending_promotion.as_ref()
    }

    /// Suspend a pawn move until the player picks a piece
    pub fn open_promotion(&mut self, from: Square, to: Square) {
        let prior_selection = self.selection.take();
        self.pending_promotion = Some(PendingPromotion {
            from,
            to,
            moving: self.turn(),
            prior_selection,
        });
    }

    /// Drop the pending promotion and restore the earlier selection.
    /// Returns false when nothing was pending.
    pub fn cancel_promotion(&mut self) -> bool {
        match self.pending_promotion.take() {
            Some(pending) => {
                self.selection = pending.prior_selection;
                true
            }
            None => false,
        }
    }

    /// Apply a move and reserve its annotation slot.
    ///
    /// Returns the ply index of the new move.
    pub fn apply_move(
        &mut self,
        mv: ChessMove,
        eval_before: EvaluationSnapshot,
        time_spent_ms: u64,
    ) -> Result<usize, IllegalReason> {
        let next = self.current.apply(mv)?;
        let san = self.current.san(mv);
        let mover = self.turn();
        let ply = self.moves.len();

        let previous = std::mem::replace(&mut self.current, next);
        self.history.push(previous);
        self.annotations.push(AnnotatedMove::pending(
            ply,
            san.clone(),
            mover,
            eval_before,
            time_spent_ms,
        ));
        self.moves.push(PlayedMove {
            chess_move: mv,
            san,
            mover,
        });

        self.selection = None;
        self.pending_promotion = None;
        self.recompute_status();
        Ok(ply)
    }

    /// Credit time spent to the reserved slot of `ply`
    pub fn set_time_spent(&mut self, ply: usize, time_spent_ms: u64) {
        if let Some(annotation) = self.annotations.get_mut(ply) {
            if !annotation.is_sealed() {
                annotation.time_spent_ms = time_spent_ms;
            }
        }
    }

    /// Fill in the evaluations of `ply`; returns false if already sealed or gone
    pub fn seal_annotation(
        &mut self,
        ply: usize,
        before: EvaluationSnapshot,
        after: EvaluationSnapshot,
    ) -> bool {
        self.annotations
            .get_mut(ply)
            .map(|annotation| annotation.seal(before, after))
            .unwrap_or(false)
    }

    /// Replace the annotations wholesale; only accepted if the lengths agree
    pub fn adopt_annotations(&mut self, annotations: Vec<AnnotatedMove>) -> bool {
        if annotations.len() != self.moves.len() {
            return false;
        }
        let consistent = annotations
            .iter()
            .zip(&self.moves)
            .all(|(annotation, played)| annotation.san == played.san);
        if consistent {
            self.annotations = annotations;
        }
        consistent
    }

    /// Take back up to `plies` moves; returns how many were removed
    pub fn undo(&mut self, plies: usize) -> usize {
        let plies = plies.min(self.moves.len());
        for _ in 0..plies {
            self.moves.pop();
            if let Some(previous) = self.history.pop() {
                self.current = previous;
            }
        }
        self.annotations.truncate(self.moves.len());
        self.selection = None;
        self.pending_promotion = None;
        if plies > 0 {
            self.recompute_status();
        }
        plies
    }

    /// Derive status and outcome from the current position alone
    pub fn recompute_status(&mut self) {
        let position = &self.current;
        let to_move: Side = position.turn().into();

        let (status, outcome) = if position.is_checkmate() {
            (
                GameStatus::Checkmate,
                Some(GameOutcome::win(to_move.opponent(), EndReason::Checkmate)),
            )
        } else if position.is_stalemate() {
            (
                GameStatus::Stalemate,
                Some(GameOutcome::draw(EndReason::Stalemate)),
            )
        } else if let Some(reason) = position.draw_reason() {
            let reason = match reason {
                DrawReason::ThreefoldRepetition => EndReason::ThreefoldRepetition,
                DrawReason::FiftyMoveRule => EndReason::FiftyMoveRule,
                DrawReason::InsufficientMaterial => EndReason::InsufficientMaterial,
            };
            (GameStatus::Draw, Some(GameOutcome::draw(reason)))
        } else if position.is_check() {
            (GameStatus::Check, None)
        } else {
            (GameStatus::Playing, None)
        };

        self.status = status;
        self.outcome = outcome;
    }

    /// Translate a flag fall into a result.
    ///
    /// The opponent wins unless they lack mating material, in which case
    /// the game is drawn. Ignored once the game is already decided.
    pub fn apply_timeout(&mut self, flagged: Side) -> Option<GameOutcome> {
        if self.is_over() {
            return None;
        }
        let opponent = flagged.opponent();
        let outcome = if can_force_mate(self.current.board(), opponent.into()) {
            self.status = GameStatus::Checkmate;
            GameOutcome::win(opponent, EndReason::Timeout)
        } else {
            self.status = GameStatus::Draw;
            GameOutcome::draw(EndReason::TimeoutVsInsufficientMaterial)
        };
        self.outcome = Some(outcome);
        self.selection = None;
        self.pending_promotion = None;
        Some(outcome)
    }

    /// Re-apply a stored result that the position alone cannot show
    pub fn restore_outcome(&mut self, status: GameStatus, outcome: GameOutcome) {
        if outcome.is_timeout() && !self.is_over() {
            self.status = status;
            self.outcome = Some(outcome);
        }
    }
}
