//! The authoritative game state machine.
//!
//! `GameOrchestrator` owns the session, the clock and the settings behind a
//! single lock. Player input is applied synchronously; engine calls and
//! persistence run in spawned tasks and re-check an epoch counter before
//! touching the session, so a result computed for a position that has since
//! been undone, reset or replaced is dropped.
//!
//! Every transition publishes a fresh `GameSnapshot` on a watch channel.

use chess::{ChessMove, Piece, Square};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::seq::IndexedRandom;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::engine::{
    difficulty_label, skill_to_rating, static_evaluation, EngineClient, EngineError,
    MAX_SKILL_LEVEL,
};
use crate::game::clock::{ChessClock, TimeControl};
use crate::game::error::{GameError, GameResult};
use crate::game::notation::{export_move_list, parse_game};
use crate::game::quality::MATE_SCORE_CP;
use crate::game::review::{self, ReviewFrame};
use crate::game::rules::{parse_promotion_piece, parse_square, Position};
use crate::game::session::{GameSession, Selection};
use crate::models::{
    EvaluationSnapshot, GameMode, GameOutcome, GameSettings, GameSnapshot, GameStatus, Hint,
    SavedGameRecord, SavedGameSummary, Side,
};
use crate::persistence::PersistenceStore;

const AUTOSAVE_NAME: &str = "Autosave";

/// Tuning knobs for one orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Pause before the bot starts thinking
    pub bot_move_delay: Duration,
    /// Upper bound on a best-move request
    pub move_budget: Duration,
    /// Upper bound on an evaluation request
    pub eval_budget: Duration,
    pub autosave: bool,
    pub settings: GameSettings,
    pub time_control: TimeControl,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            bot_move_delay: Duration::from_millis(800),
            move_budget: Duration::from_secs(3),
            eval_budget: Duration::from_secs(2),
            autosave: true,
            settings: GameSettings::default(),
            time_control: TimeControl::default(),
        }
    }
}

/// An accepted move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveReport {
    pub ply: usize,
    pub san: String,
    pub from: Square,
    pub to: Square,
    pub mover: Side,
    pub status: GameStatus,
    pub outcome: Option<GameOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved(MoveReport),
    /// A pawn reached its last rank; waiting for `confirm_promotion`
    AwaitingPromotion { from: Square, to: Square },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    Selected { square: Square, destinations: Vec<Square> },
    Deselected,
    Moved(MoveReport),
    AwaitingPromotion { from: Square, to: Square },
}

/// Work left over after a move was accepted
struct FollowUp {
    epoch: u64,
    ply: usize,
    before: Position,
    eval_before: Option<EvaluationSnapshot>,
    after: Position,
}

struct Inner {
    session: GameSession,
    clock: ChessClock,
    settings: GameSettings,
    evaluation: EvaluationSnapshot,
    /// Ply count the current evaluation belongs to
    evaluation_ply: Option<usize>,
    hint: Option<Hint>,
    hint_seq: u64,
    engine_notice: Option<String>,
    bot_thinking: bool,
    /// Bumped whenever the move list is rewritten rather than extended
    epoch: u64,
    /// Only the newest engine-move request may commit
    bot_ticket: u64,
    review_cursor: Option<usize>,
    created_at: DateTime<Utc>,
    autosave_id: Option<String>,
}

impl Inner {
    fn new(options: &OrchestratorOptions) -> Self {
        Self {
            session: GameSession::default(),
            clock: ChessClock::new(options.time_control),
            settings: options.settings,
            evaluation: EvaluationSnapshot::unknown(),
            evaluation_ply: None,
            hint: None,
            hint_seq: 0,
            engine_notice: None,
            bot_thinking: false,
            epoch: 0,
            bot_ticket: 0,
            review_cursor: None,
            created_at: Utc::now(),
            autosave_id: None,
        }
    }

    fn is_bot_turn(&self) -> bool {
        self.settings.mode.bot_side() == Some(self.session.turn())
    }

    fn set_hint(&mut self, err: &GameError) {
        self.hint_seq += 1;
        self.hint = Some(Hint {
            message: err.to_string(),
            seq: self.hint_seq,
        });
    }

    /// Forget everything derived from the previous move list
    fn invalidate(&mut self) {
        self.epoch += 1;
        self.bot_ticket += 1;
        self.bot_thinking = false;
        self.evaluation_ply = None;
        self.review_cursor = None;
        self.hint = None;
    }

    fn install_session(&mut self, session: GameSession) {
        let turn = session.turn();
        self.session = session;
        let control = self.clock.control();
        self.clock.restore_idle(control, turn);
        self.evaluation = EvaluationSnapshot::unknown();
        self.invalidate();
    }

    fn snapshot(&self) -> GameSnapshot {
        let session = &self.session;
        GameSnapshot {
            fen: session.position().fen(),
            turn: session.turn(),
            status: session.status(),
            outcome: session.outcome(),
            moves: session.sans(),
            annotated_moves: session.annotations().to_vec(),
            selection: session.selection().map(Selection::view),
            pending_promotion: session.pending_promotion().map(|p| p.view()),
            last_move: session.last_move(),
            clock: self.clock.view(),
            evaluation: self.evaluation,
            hint: self.hint.clone(),
            engine_notice: self.engine_notice.clone(),
            bot_thinking: self.bot_thinking,
            settings: self.settings,
            difficulty: difficulty_label(self.settings.skill_level),
            review_cursor: self.review_cursor,
        }
    }

    fn record(&self, name: &str, autosave: bool, id: Option<String>) -> SavedGameRecord {
        let session = &self.session;
        SavedGameRecord {
            id,
            name: name.to_string(),
            created_at: self.created_at,
            saved_at: Utc::now(),
            autosave,
            start_position: session.start().fen(),
            position_encoding: session.position().fen(),
            moves: session.sans(),
            annotated_moves: session.annotations().to_vec(),
            clock_config: self.clock.control(),
            status: session.status(),
            result: session.outcome(),
        }
    }
}

#[derive(Clone)]
pub struct GameOrchestrator {
    inner: Arc<Mutex<Inner>>,
    engine: Arc<dyn EngineClient>,
    store: Arc<dyn PersistenceStore>,
    options: OrchestratorOptions,
    published: Arc<watch::Sender<GameSnapshot>>,
    autosave_lock: Arc<tokio::sync::Mutex<()>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl GameOrchestrator {
    pub fn new(
        engine: Arc<dyn EngineClient>,
        store: Arc<dyn PersistenceStore>,
        options: OrchestratorOptions,
    ) -> Self {
        let inner = Inner::new(&options);
        let (published, _) = watch::channel(inner.snapshot());
        let orchestrator = Self {
            inner: Arc::new(Mutex::new(inner)),
            engine,
            store,
            options,
            published: Arc::new(published),
            autosave_lock: Arc::new(tokio::sync::Mutex::new(())),
            tasks: Arc::new(Mutex::new(Vec::new())),
        };
        {
            let mut inner = orchestrator.lock();
            orchestrator.schedule_bot_if_due(&mut inner);
            orchestrator.publish(&inner);
        }
        orchestrator
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner) {
        self.published.send_replace(inner.snapshot());
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let join = handle.spawn(task);
                let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
                tasks.retain(|t| !t.is_finished());
                tasks.push(join);
            }
            Err(_) => warn!("No async runtime available, background game work skipped"),
        }
    }

    /// Wait until every spawned evaluation, autosave and bot move is done
    pub async fn settle(&self) {
        loop {
            let pending: Vec<JoinHandle<()>> = {
                let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *tasks)
            };
            if pending.is_empty() {
                break;
            }
            for result in futures::future::join_all(pending).await {
                if let Err(err) = result {
                    warn!("Background game task failed: {}", err);
                }
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<GameSnapshot> {
        self.published.subscribe()
    }

    pub fn snapshot(&self) -> GameSnapshot {
        self.lock().snapshot()
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    // ---- player input ------------------------------------------------------

    /// Click on a square: select a piece, deselect it, or move the selection
    pub fn select_square(&self, square: &str) -> GameResult<SelectOutcome> {
        let mut inner = self.lock();
        let result = parse_square(square).and_then(|square| self.select_in(&mut inner, square));
        if let Err(err) = &result {
            inner.set_hint(err);
        }
        self.publish(&inner);
        result
    }

    fn select_in(&self, inner: &mut Inner, square: Square) -> GameResult<SelectOutcome> {
        if let Some(pending) = inner.session.pending_promotion() {
            return Err(GameError::PromotionPending(pending.from));
        }
        if inner.session.is_over() {
            return Err(GameError::GameOver);
        }
        if inner.is_bot_turn() {
            return Err(GameError::NotYourTurn);
        }

        let turn = inner.session.turn();
        let owned = |inner: &Inner| {
            matches!(inner.session.position().piece_at(square), Some((_, color)) if Side::from(color) == turn)
        };

        let Some(selected) = inner.session.selection().cloned() else {
            match inner.session.position().piece_at(square) {
                None => return Err(GameError::EmptySquare(square)),
                Some((_, color)) if Side::from(color) != turn => {
                    return Err(GameError::NotYoursToMove(square))
                }
                Some(_) => {}
            }
            inner.session.select(square);
            return Ok(selected_outcome(inner));
        };

        if selected.square == square {
            inner.session.clear_selection();
            return Ok(SelectOutcome::Deselected);
        }

        match self.accept_move(inner, selected.square, square, None) {
            Ok(MoveOutcome::Moved(report)) => Ok(SelectOutcome::Moved(report)),
            Ok(MoveOutcome::AwaitingPromotion { from, to }) => {
                Ok(SelectOutcome::AwaitingPromotion { from, to })
            }
            Err(_) if owned(inner) => {
                // Clicking another own piece switches the selection
                inner.session.select(square);
                Ok(selected_outcome(inner))
            }
            Err(err) => {
                inner.session.clear_selection();
                Err(err)
            }
        }
    }

    /// Move `from` -> `to`; promotions without a piece wait for a choice
    pub fn make_move(
        &self,
        from: &str,
        to: &str,
        promotion: Option<&str>,
    ) -> GameResult<MoveOutcome> {
        let mut inner = self.lock();
        let result = (|| {
            let from = parse_square(from)?;
            let to = parse_square(to)?;
            let promotion = promotion.map(parse_promotion_piece).transpose()?;
            if inner.is_bot_turn() && !inner.session.is_over() {
                return Err(GameError::NotYourTurn);
            }
            self.accept_move(&mut inner, from, to, promotion)
        })();
        if let Err(err) = &result {
            inner.set_hint(err);
        }
        self.publish(&inner);
        result
    }

    /// Finish a suspended promotion with the chosen piece
    pub fn confirm_promotion(&self, piece: &str) -> GameResult<MoveReport> {
        let mut inner = self.lock();
        let result = (|| {
            let (from, to) = inner
                .session
                .pending_promotion()
                .map(|p| (p.from, p.to))
                .ok_or(GameError::NoPromotionPending)?;
            let piece = parse_promotion_piece(piece)?;
            self.commit(&mut inner, ChessMove::new(from, to, Some(piece)))
                .map_err(|reason| GameError::IllegalMove { from, to, reason })
        })();
        if let Err(err) = &result {
            inner.set_hint(err);
        }
        self.publish(&inner);
        result
    }

    /// Drop a pending promotion; a no-op when none is pending
    pub fn cancel_promotion(&self) -> bool {
        let mut inner = self.lock();
        let cancelled = inner.session.cancel_promotion();
        if cancelled {
            self.schedule_bot_if_due(&mut inner);
            self.publish(&inner);
        }
        cancelled
    }

    fn accept_move(
        &self,
        inner: &mut Inner,
        from: Square,
        to: Square,
        promotion: Option<Piece>,
    ) -> GameResult<MoveOutcome> {
        if inner.session.is_over() {
            return Err(GameError::GameOver);
        }
        if let Some(pending) = inner.session.pending_promotion() {
            let resolves = pending.from == from && pending.to == to && promotion.is_some();
            if !resolves {
                return Err(GameError::PromotionPending(pending.from));
            }
        }

        let position = inner.session.position();
        match position.piece_at(from) {
            None => return Err(GameError::EmptySquare(from)),
            Some((_, color)) if color != position.turn() => {
                return Err(GameError::NotYoursToMove(from))
            }
            Some(_) => {}
        }

        let promotes = position.is_promotion(from, to);
        if promotes && promotion.is_none() {
            // Only suspend for a promotion that could actually be played
            position
                .apply(ChessMove::new(from, to, Some(Piece::Queen)))
                .map_err(|reason| GameError::IllegalMove { from, to, reason })?;
            inner.session.open_promotion(from, to);
            debug!("Promotion pending on {}{}", from, to);
            return Ok(MoveOutcome::AwaitingPromotion { from, to });
        }

        let promotion = if promotes { promotion } else { None };
        self.commit(inner, ChessMove::new(from, to, promotion))
            .map(MoveOutcome::Moved)
            .map_err(|reason| GameError::IllegalMove { from, to, reason })
    }

    /// Apply a legal move and kick off everything that follows it
    fn commit(
        &self,
        inner: &mut Inner,
        mv: ChessMove,
    ) -> Result<MoveReport, crate::game::rules::IllegalReason> {
        let ply = inner.session.ply_count();
        let before = inner.session.position().clone();
        let eval_before = (inner.evaluation_ply == Some(ply)).then_some(inner.evaluation);

        inner
            .session
            .apply_move(mv, eval_before.unwrap_or_default(), 0)?;

        if inner.settings.clock_enabled {
            inner.clock.start_on_first_move();
        }
        match inner.clock.swap_at(Instant::now()) {
            Ok(spent) => inner.session.set_time_spent(ply, spent),
            Err(event) => {
                if let Some(outcome) = inner.session.apply_timeout(event.flagged) {
                    info!("{} flagged before the move landed: {:?}", event.flagged, outcome);
                }
            }
        }

        inner.hint = None;
        inner.review_cursor = None;
        inner.evaluation_ply = None;

        let played = &inner.session.moves()[ply];
        let report = MoveReport {
            ply,
            san: played.san.clone(),
            from: mv.get_source(),
            to: mv.get_dest(),
            mover: played.mover,
            status: inner.session.status(),
            outcome: inner.session.outcome(),
        };
        info!("Ply {}: {} played {}", ply + 1, report.mover, report.san);
        if let Some(outcome) = report.outcome {
            info!("Game over: {:?}", outcome);
        }

        let follow_up = FollowUp {
            epoch: inner.epoch,
            ply,
            before,
            eval_before,
            after: inner.session.position().clone(),
        };
        self.spawn(self.clone().finish_move(follow_up));
        self.schedule_bot_if_due(inner);
        Ok(report)
    }

    /// Evaluate around an accepted move, seal its annotation, autosave
    async fn finish_move(self, follow_up: FollowUp) {
        let eval_before = match follow_up.eval_before {
            Some(eval) => eval,
            None => self.evaluate_position(&follow_up.before).await.0,
        };
        let (eval_after, notice) = self.evaluate_position(&follow_up.after).await;

        {
            let mut inner = self.lock();
            if inner.epoch != follow_up.epoch {
                debug!("Dropping evaluation for ply {}, move list changed", follow_up.ply);
                return;
            }
            inner
                .session
                .seal_annotation(follow_up.ply, eval_before, eval_after);
            if inner.session.ply_count() == follow_up.ply + 1 {
                inner.evaluation = eval_after;
                inner.evaluation_ply = Some(follow_up.ply + 1);
            }
            inner.engine_notice = notice;
            self.publish(&inner);
        }

        self.autosave().await;
    }

    // ---- undo / reset ------------------------------------------------------

    /// Take back the last turn; returns the number of plies removed
    pub fn undo_move(&self) -> usize {
        let mut inner = self.lock();
        let plies = inner.session.ply_count();
        let wanted = match inner.settings.mode {
            GameMode::Friend => 1,
            // Bot still to move: only the human's move is on the board
            GameMode::Bot { .. } if inner.is_bot_turn() => 1,
            GameMode::Bot { .. } => plies.min(2),
        };
        if plies == 0 {
            return 0;
        }

        let undone = inner.session.undo(wanted);
        let turn = inner.session.turn();
        if inner.session.ply_count() == 0 || inner.clock.expired().is_some() {
            let control = inner.clock.control();
            inner.clock.restore_idle(control, turn);
        } else {
            inner.clock.sync_turn(turn);
        }
        inner.invalidate();
        info!("Undid {} ply", undone);

        self.spawn_evaluation_refresh();
        self.schedule_bot_if_due(&mut inner);
        self.publish(&inner);
        undone
    }

    /// Fresh game with the configured time control and mode
    pub fn reset_game(&self) {
        let mut inner = self.lock();
        inner.install_session(GameSession::default());
        inner.created_at = Utc::now();
        info!("Game reset");

        self.spawn_evaluation_refresh();
        self.schedule_bot_if_due(&mut inner);
        self.publish(&inner);
    }

    /// Start from an arbitrary position given as FEN
    pub fn load_position(&self, fen: &str) -> GameResult<()> {
        let start = Position::from_fen(fen)?;
        let mut inner = self.lock();
        inner.install_session(GameSession::new(start));
        inner.created_at = Utc::now();

        self.spawn_evaluation_refresh();
        self.schedule_bot_if_due(&mut inner);
        self.publish(&inner);
        Ok(())
    }

    // ---- engine ------------------------------------------------------------

    fn schedule_bot_if_due(&self, inner: &mut Inner) {
        if !inner.is_bot_turn()
            || inner.session.is_over()
            || inner.session.pending_promotion().is_some()
        {
            return;
        }
        inner.bot_ticket += 1;
        inner.bot_thinking = true;
        let (ticket, epoch) = (inner.bot_ticket, inner.epoch);
        let orchestrator = self.clone();
        self.spawn(async move {
            let delay = orchestrator.options.bot_move_delay;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(err) = orchestrator.play_engine_move(ticket, epoch).await {
                debug!("Scheduled engine move dropped: {}", err);
            }
        });
    }

    /// Let the engine play the side to move right now.
    ///
    /// Supersedes any bot move already scheduled. Never stalls on the
    /// engine: after the move budget a random legal move is played.
    pub async fn make_engine_move(&self) -> GameResult<MoveReport> {
        let (ticket, epoch) = {
            let mut inner = self.lock();
            if inner.session.is_over() {
                return Err(GameError::GameOver);
            }
            if let Some(pending) = inner.session.pending_promotion() {
                return Err(GameError::PromotionPending(pending.from));
            }
            inner.bot_ticket += 1;
            inner.bot_thinking = true;
            self.publish(&inner);
            (inner.bot_ticket, inner.epoch)
        };
        self.play_engine_move(ticket, epoch).await
    }

    async fn play_engine_move(&self, ticket: u64, epoch: u64) -> GameResult<MoveReport> {
        let (fen, side, skill) = {
            let inner = self.lock();
            if inner.bot_ticket != ticket || inner.epoch != epoch {
                return Err(GameError::NotYourTurn);
            }
            (
                inner.session.position().fen(),
                inner.session.turn(),
                inner.settings.skill_level,
            )
        };

        self.engine.set_strength(skill_to_rating(skill));
        let budget = self.options.move_budget;
        let suggestion = match tokio::time::timeout(budget, self.engine.best_move(&fen, budget)).await {
            Ok(Ok(Some(text))) => Ok(text),
            Ok(Ok(None)) => Err(EngineError::Malformed("no move suggested".to_string())),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(EngineError::Timeout),
        };

        let mut inner = self.lock();
        if inner.bot_ticket != ticket || inner.epoch != epoch || inner.session.turn() != side {
            debug!("Discarding stale engine move for {}", side);
            return Err(GameError::NotYourTurn);
        }
        if inner.session.is_over() {
            inner.bot_thinking = false;
            self.publish(&inner);
            return Err(GameError::GameOver);
        }

        let position = inner.session.position();
        let suggested = match &suggestion {
            Ok(text) => {
                let parsed = position.parse_move(text);
                if parsed.is_none() {
                    warn!("Engine suggested unusable move {:?}", text);
                }
                parsed
            }
            Err(err) => {
                warn!("Engine move unavailable, playing a random move: {}", err);
                None
            }
        };
        let legal = position.legal_moves();
        let Some(mv) = suggested.or_else(|| legal.choose(&mut rand::rng()).copied()) else {
            inner.bot_thinking = false;
            self.publish(&inner);
            return Err(GameError::GameOver);
        };

        inner.bot_thinking = false;
        inner.engine_notice = suggestion
            .err()
            .map(|err| GameError::from(err).to_string());
        let result = self.commit(&mut inner, mv).map_err(|reason| GameError::IllegalMove {
            from: mv.get_source(),
            to: mv.get_dest(),
            reason,
        });
        self.publish(&inner);
        result
    }

    fn spawn_evaluation_refresh(&self) {
        let orchestrator = self.clone();
        self.spawn(async move {
            orchestrator.update_evaluation().await;
        });
    }

    /// Re-evaluate the current position, falling back to the local evaluator
    pub async fn update_evaluation(&self) -> EvaluationSnapshot {
        let (position, epoch, ply) = {
            let inner = self.lock();
            (
                inner.session.position().clone(),
                inner.epoch,
                inner.session.ply_count(),
            )
        };

        let (evaluation, notice) = self.evaluate_position(&position).await;

        let mut inner = self.lock();
        if inner.epoch == epoch && inner.session.ply_count() == ply {
            inner.evaluation = evaluation;
            inner.evaluation_ply = Some(ply);
            inner.engine_notice = notice;
            self.publish(&inner);
        }
        evaluation
    }

    async fn evaluate_position(&self, position: &Position) -> (EvaluationSnapshot, Option<String>) {
        if let Some(evaluation) = terminal_evaluation(position) {
            return (evaluation, None);
        }

        let fen = position.fen();
        let budget = self.options.eval_budget;
        let failure = match tokio::time::timeout(budget, self.engine.evaluate(&fen)).await {
            Ok(Ok(evaluation)) if evaluation.is_known() => return (evaluation, None),
            Ok(Ok(_)) => EngineError::Malformed("empty evaluation".to_string()),
            Ok(Err(err)) => err,
            Err(_) => EngineError::Timeout,
        };
        warn!("Using local evaluation: {}", failure);
        (
            static_evaluation(position),
            Some(GameError::from(failure).to_string()),
        )
    }

    // ---- clock -------------------------------------------------------------

    /// Charge elapsed time to the side to move; returns the result on a flag fall
    pub fn tick(&self, elapsed: Duration) -> Option<GameOutcome> {
        let mut inner = self.lock();
        if !inner.settings.clock_enabled || inner.session.is_over() {
            return None;
        }
        let event = inner.clock.tick(elapsed);
        self.after_tick(inner, event)
    }

    /// Tick using wall time since the previous call
    pub fn tick_now(&self) -> Option<GameOutcome> {
        let mut inner = self.lock();
        if !inner.settings.clock_enabled || inner.session.is_over() {
            return None;
        }
        let event = inner.clock.tick_at(Instant::now());
        self.after_tick(inner, event)
    }

    fn after_tick(
        &self,
        mut inner: MutexGuard<'_, Inner>,
        event: Option<crate::game::clock::TimeoutEvent>,
    ) -> Option<GameOutcome> {
        let Some(event) = event else {
            if inner.clock.is_running() {
                self.publish(&inner);
            }
            return None;
        };

        let outcome = inner.session.apply_timeout(event.flagged);
        inner.bot_ticket += 1;
        inner.bot_thinking = false;
        if let Some(outcome) = outcome {
            info!("{} flagged: {:?}", event.flagged, outcome);
        }
        self.publish(&inner);
        drop(inner);

        let orchestrator = self.clone();
        self.spawn(async move { orchestrator.autosave().await });
        outcome
    }

    pub fn pause_clock(&self) {
        let mut inner = self.lock();
        inner.clock.pause();
        self.publish(&inner);
    }

    pub fn resume_clock(&self) {
        let mut inner = self.lock();
        if !inner.session.is_over() {
            inner.clock.resume();
        }
        self.publish(&inner);
    }

    // ---- settings ----------------------------------------------------------

    pub fn set_game_mode(&self, mode: GameMode) {
        let mut inner = self.lock();
        inner.settings.mode = mode;
        // Cancel a bot move scheduled under the previous mode
        inner.bot_ticket += 1;
        inner.bot_thinking = false;
        // The bot now owns a half-finished promotion; it picks its own piece
        if inner.is_bot_turn() && inner.session.cancel_promotion() {
            debug!("Dropped pending promotion handed to the bot");
        }
        info!("Game mode set to {:?}", mode);
        self.schedule_bot_if_due(&mut inner);
        self.publish(&inner);
    }

    pub fn set_difficulty(&self, skill_level: u8) {
        let mut inner = self.lock();
        inner.settings.skill_level = skill_level.min(MAX_SKILL_LEVEL);
        self.publish(&inner);
    }

    pub fn set_time_control(&self, base_minutes: u32, increment_seconds: u32) {
        let mut inner = self.lock();
        inner.clock.select_time_control(base_minutes, increment_seconds);
        let turn = inner.session.turn();
        inner.clock.sync_turn(turn);
        self.publish(&inner);
    }

    pub fn set_clock_enabled(&self, enabled: bool) {
        let mut inner = self.lock();
        inner.settings.clock_enabled = enabled;
        if enabled {
            inner.clock.resume();
        } else {
            inner.clock.pause();
        }
        self.publish(&inner);
    }

    // ---- persistence -------------------------------------------------------

    async fn autosave(&self) {
        if !self.options.autosave {
            return;
        }
        // One autosave at a time so the slot is created once
        let _guard = self.autosave_lock.lock().await;
        let (record, epoch) = {
            let inner = self.lock();
            if inner.session.ply_count() == 0 {
                return;
            }
            (
                inner.record(AUTOSAVE_NAME, true, inner.autosave_id.clone()),
                inner.epoch,
            )
        };

        match self.store.put(record).await {
            Ok(id) => {
                let mut inner = self.lock();
                inner.autosave_id = Some(id);
                debug!("Autosaved at epoch {}", epoch);
            }
            Err(err) => {
                warn!("Autosave failed: {}", err);
                let mut inner = self.lock();
                inner.set_hint(&GameError::from(err));
                self.publish(&inner);
            }
        }
    }

    /// Store a named copy of the session; returns its id
    pub async fn save_as(&self, name: &str) -> GameResult<String> {
        let record = {
            let inner = self.lock();
            inner.record(name.trim(), false, None)
        };
        let id = self.store.put(record).await?;
        info!("Saved game {:?} as {}", name, id);
        Ok(id)
    }

    pub async fn list_saved(&self) -> GameResult<Vec<SavedGameSummary>> {
        Ok(self.store.list().await?)
    }

    pub async fn delete_saved(&self, id: &str) -> GameResult<()> {
        self.store.delete(id).await?;
        let mut inner = self.lock();
        if inner.autosave_id.as_deref() == Some(id) {
            inner.autosave_id = None;
        }
        Ok(())
    }

    /// Replace the session with a saved one; the clock comes back idle
    pub async fn load_saved(&self, id: &str) -> GameResult<()> {
        let record = self.store.get(id).await?;
        let session = restore_session(&record)?;

        let mut inner = self.lock();
        inner.install_session(session);
        let turn = inner.session.turn();
        inner.clock.restore_idle(record.clock_config, turn);
        inner.created_at = record.created_at;
        if record.autosave {
            inner.autosave_id = record.id.clone();
        }
        info!("Loaded saved game {:?} ({} plies)", record.name, record.moves.len());

        self.spawn_evaluation_refresh();
        self.schedule_bot_if_due(&mut inner);
        self.publish(&inner);
        Ok(())
    }

    // ---- move lists --------------------------------------------------------

    pub fn export_moves(&self, annotate: bool) -> String {
        let inner = self.lock();
        let session = &inner.session;
        export_move_list(
            session.start(),
            session.annotations(),
            session.outcome().as_ref(),
            annotate,
        )
    }

    /// Replace the game with an imported move list; all or nothing
    pub fn import_moves(&self, text: &str) -> GameResult<usize> {
        let (start, replayed) = match parse_game(text) {
            Ok(parsed) => parsed,
            Err(err) => {
                let mut inner = self.lock();
                inner.set_hint(&err);
                self.publish(&inner);
                return Err(err);
            }
        };
        let moves: Vec<ChessMove> = replayed.iter().map(|m| m.chess_move).collect();
        let session = GameSession::replay(start, &moves)?;

        let mut inner = self.lock();
        inner.install_session(session);
        inner.created_at = Utc::now();
        info!("Imported {} moves", moves.len());

        self.spawn_evaluation_refresh();
        self.schedule_bot_if_due(&mut inner);
        self.publish(&inner);
        Ok(moves.len())
    }

    // ---- review ------------------------------------------------------------

    pub fn review_next_mistake(&self) -> Option<ReviewFrame> {
        let mut inner = self.lock();
        let index = review::next_mistake(inner.session.annotations(), inner.review_cursor)?;
        self.move_review_cursor(&mut inner, index)
    }

    pub fn review_prev_mistake(&self) -> Option<ReviewFrame> {
        let mut inner = self.lock();
        let index = review::prev_mistake(inner.session.annotations(), inner.review_cursor)?;
        self.move_review_cursor(&mut inner, index)
    }

    fn move_review_cursor(&self, inner: &mut Inner, index: usize) -> Option<ReviewFrame> {
        inner.review_cursor = Some(index);
        self.publish(inner);
        review::frame(&inner.session, index)
    }

    /// Position after ply `index` without changing the session
    pub fn preview(&self, index: usize) -> Option<ReviewFrame> {
        review::frame(&self.lock().session, index)
    }

    pub fn eval_curve(&self) -> Vec<i32> {
        review::eval_curve(self.lock().session.annotations())
    }
}

fn selected_outcome(inner: &Inner) -> SelectOutcome {
    match inner.session.selection() {
        Some(selection) => SelectOutcome::Selected {
            square: selection.square,
            destinations: selection.destinations.clone(),
        },
        None => SelectOutcome::Deselected,
    }
}

/// Evaluation of positions the rules have already decided
fn terminal_evaluation(position: &Position) -> Option<EvaluationSnapshot> {
    if position.is_checkmate() {
        let score = match Side::from(position.turn()) {
            Side::White => -MATE_SCORE_CP,
            Side::Black => MATE_SCORE_CP,
        };
        Some(EvaluationSnapshot::centipawns(score))
    } else if position.is_stalemate() || position.draw_reason().is_some() {
        Some(EvaluationSnapshot::centipawns(0))
    } else {
        None
    }
}

/// Rebuild a session from a record, checking it against the stored position
pub fn restore_session(record: &SavedGameRecord) -> GameResult<GameSession> {
    let start = Position::from_fen(&record.start_position)?;
    let mut position = start.clone();
    let mut moves = Vec::with_capacity(record.moves.len());
    for (index, san) in record.moves.iter().enumerate() {
        let mv = position.parse_move(san).ok_or_else(|| {
            GameError::CorruptPosition(format!("saved move {} ({:?}) does not replay", index, san))
        })?;
        position = position.apply(mv).map_err(|reason| {
            GameError::CorruptPosition(format!("saved move {} ({:?}): {}", index, san, reason))
        })?;
        moves.push(mv);
    }

    let replayed = placement_and_turn(&position.fen());
    let stored = placement_and_turn(&record.position_encoding);
    if replayed != stored {
        return Err(GameError::CorruptPosition(format!(
            "moves lead to {:?} but the record says {:?}",
            replayed, stored
        )));
    }

    let mut session = GameSession::replay(start, &moves)?;
    if !session.adopt_annotations(record.annotated_moves.clone()) {
        warn!("Saved annotations do not match the moves, keeping bare moves");
    }
    if let Some(result) = record.result {
        session.restore_outcome(record.status, result);
    }
    Ok(session)
}

fn placement_and_turn(fen: &str) -> String {
    fen.split_whitespace().take(2).collect::<Vec<_>>().join(" ")
}
