//! Two-sided chess clock with Fischer increment.
//!
//! The clock stays idle until the first accepted move, then only the side
//! to move loses time. After each move the mover receives the increment and
//! the ticking side swaps.
//!
//! Ticks carry elapsed wall time rather than assuming a fixed interval;
//! `tick_at` derives the delta from the previous call and forgets it across
//! pauses so a paused period is never charged.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::models::Side;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClockPhase {
    Idle,
    Running,
    Paused,
    Expired,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeControlPreset {
    Blitz3,
    Rapid10,
    Custom,
}

/// Base allotment and per-move increment
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeControl {
    pub base_ms: u64,
    pub increment_ms: u64,
    pub preset: TimeControlPreset,
}

impl TimeControl {
    pub fn from_minutes(base_minutes: u32, increment_seconds: u32) -> Self {
        let preset = match (base_minutes, increment_seconds) {
            (3, 0) => TimeControlPreset::Blitz3,
            (10, 0) => TimeControlPreset::Rapid10,
            _ => TimeControlPreset::Custom,
        };
        Self {
            base_ms: u64::from(base_minutes) * 60_000,
            increment_ms: u64::from(increment_seconds) * 1_000,
            preset,
        }
    }
}

impl Default for TimeControl {
    fn default() -> Self {
        Self::from_minutes(10, 0)
    }
}

/// Emitted once when a side's time reaches zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutEvent {
    pub flagged: Side,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SideTimer {
    remaining_ms: u64,
    increment_ms: u64,
}

impl SideTimer {
    fn new(control: &TimeControl) -> Self {
        Self {
            remaining_ms: control.base_ms,
            increment_ms: control.increment_ms,
        }
    }
}

/// Serializable clock state for the UI
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockView {
    pub white_ms: u64,
    pub black_ms: u64,
    pub turn_side: Side,
    pub phase: ClockPhase,
    pub started: bool,
    pub control: TimeControl,
}

#[derive(Debug, Clone)]
pub struct ChessClock {
    control: TimeControl,
    white: SideTimer,
    black: SideTimer,
    turn_side: Side,
    phase: ClockPhase,
    started: bool,
    expired: Option<Side>,
    turn_elapsed_ms: u64,
    last_tick: Option<Instant>,
}

impl Default for ChessClock {
    fn default() -> Self {
        Self::new(TimeControl::default())
    }
}

impl ChessClock {
    pub fn new(control: TimeControl) -> Self {
        Self {
            control,
            white: SideTimer::new(&control),
            black: SideTimer::new(&control),
            turn_side: Side::White,
            phase: ClockPhase::Idle,
            started: false,
            expired: None,
            turn_elapsed_ms: 0,
            last_tick: None,
        }
    }

    /// Switch to a new time control and reset both sides
    pub fn select_time_control(&mut self, base_minutes: u32, increment_seconds: u32) {
        self.control = TimeControl::from_minutes(base_minutes, increment_seconds);
        self.reset();
    }

    /// Back to idle with the configured allotment
    pub fn reset(&mut self) {
        *self = Self::new(self.control);
    }

    /// Idle clock for a restored session; never resumes running by itself
    pub fn restore_idle(&mut self, control: TimeControl, turn_side: Side) {
        self.control = control;
        self.reset();
        self.turn_side = turn_side;
    }

    /// Align the ticking side with the position after an undo
    pub fn sync_turn(&mut self, side: Side) {
        self.turn_side = side;
        self.turn_elapsed_ms = 0;
        self.last_tick = None;
    }

    /// Idle -> running, only the first time
    pub fn start_on_first_move(&mut self) {
        if self.started || self.phase != ClockPhase::Idle {
            return;
        }
        self.started = true;
        self.phase = ClockPhase::Running;
        self.last_tick = None;
    }

    pub fn pause(&mut self) {
        if self.phase == ClockPhase::Running {
            self.phase = ClockPhase::Paused;
            self.last_tick = None;
        }
    }

    pub fn resume(&mut self) {
        if self.phase == ClockPhase::Paused && self.expired.is_none() {
            self.phase = ClockPhase::Running;
            self.last_tick = None;
        }
    }

    /// Charge `elapsed` to the side to move
    pub fn tick(&mut self, elapsed: Duration) -> Option<TimeoutEvent> {
        if self.phase != ClockPhase::Running || !self.started {
            return None;
        }

        let elapsed_ms = elapsed.as_millis().min(u128::from(u64::MAX)) as u64;
        let side = self.turn_side;
        let timer = self.timer_mut(side);
        timer.remaining_ms = timer.remaining_ms.saturating_sub(elapsed_ms);
        let flagged = timer.remaining_ms == 0;
        self.turn_elapsed_ms = self.turn_elapsed_ms.saturating_add(elapsed_ms);

        if flagged {
            self.phase = ClockPhase::Expired;
            self.expired = Some(side);
            self.last_tick = None;
            return Some(TimeoutEvent { flagged: side });
        }
        None
    }

    /// Tick using wall time since the previous call
    pub fn tick_at(&mut self, now: Instant) -> Option<TimeoutEvent> {
        if self.phase != ClockPhase::Running {
            self.last_tick = None;
            return None;
        }
        let elapsed = self
            .last_tick
            .map(|previous| now.saturating_duration_since(previous))
            .unwrap_or_default();
        self.last_tick = Some(now);
        self.tick(elapsed)
    }

    /// Credit the mover's increment and hand the clock to the opponent.
    ///
    /// Returns the time the mover spent on this move.
    pub fn apply_increment_and_swap(&mut self) -> u64 {
        if self.expired.is_some() {
            return 0;
        }
        let mover = self.turn_side;
        if self.started {
            let timer = self.timer_mut(mover);
            timer.remaining_ms = timer.remaining_ms.saturating_add(timer.increment_ms);
        }
        let spent = self.turn_elapsed_ms;
        self.turn_elapsed_ms = 0;
        self.turn_side = mover.opponent();
        spent
    }

    /// Charge the mover for the time since the last tick, then swap at `now`.
    ///
    /// A flag fall during that last stretch wins over the move: no increment,
    /// no swap, and the timeout is returned instead.
    pub fn swap_at(&mut self, now: Instant) -> Result<u64, TimeoutEvent> {
        if let Some(event) = self.tick_at(now) {
            return Err(event);
        }
        let spent = self.apply_increment_and_swap();
        if self.phase == ClockPhase::Running {
            self.last_tick = Some(now);
        }
        Ok(spent)
    }

    fn timer_mut(&mut self, side: Side) -> &mut SideTimer {
        match side {
            Side::White => &mut self.white,
            Side::Black => &mut self.black,
        }
    }

    pub fn remaining_ms(&self, side: Side) -> u64 {
        match side {
            Side::White => self.white.remaining_ms,
            Side::Black => self.black.remaining_ms,
        }
    }

    pub fn turn_side(&self) -> Side {
        self.turn_side
    }

    pub fn phase(&self) -> ClockPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == ClockPhase::Running
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn expired(&self) -> Option<Side> {
        self.expired
    }

    pub fn control(&self) -> TimeControl {
        self.control
    }

    pub fn view(&self) -> ClockView {
        ClockView {
            white_ms: self.white.remaining_ms,
            black_ms: self.black.remaining_ms,
            turn_side: self.turn_side,
            phase: self.phase,
            started: self.started,
            control: self.control,
        }
    }
}
