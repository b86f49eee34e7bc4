use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::clock::TimeControl;
use crate::game::quality::{classify, MoveQuality, MATE_SCORE_CP};
use crate::models::game_state::{GameOutcome, GameStatus, Side};

/// Engine evaluation from White's point of view.
///
/// At most one of the two fields is meaningful; both empty means unknown.
/// Positive `mate_in_plies` means White delivers mate.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationSnapshot {
    pub centipawns: Option<i32>,
    pub mate_in_plies: Option<i32>,
}

impl EvaluationSnapshot {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn centipawns(cp: i32) -> Self {
        Self {
            centipawns: Some(cp),
            mate_in_plies: None,
        }
    }

    pub fn mate(plies: i32) -> Self {
        Self {
            centipawns: None,
            mate_in_plies: Some(plies),
        }
    }

    pub fn is_known(&self) -> bool {
        self.score_cp().is_some()
    }

    /// Single comparable score, mate clamped to a large finite magnitude
    pub fn score_cp(&self) -> Option<i32> {
        match (self.mate_in_plies, self.centipawns) {
            (Some(m), _) if m > 0 => Some(MATE_SCORE_CP),
            (Some(m), _) if m < 0 => Some(-MATE_SCORE_CP),
            (_, Some(cp)) => Some(cp),
            _ => None,
        }
    }

    /// Short text such as `+0.35` or `#-3`
    pub fn display(&self) -> Option<String> {
        if let Some(m) = self.mate_in_plies.filter(|m| *m != 0) {
            return Some(format!("#{}", m));
        }
        self.centipawns
            .map(|cp| format!("{:+.2}", f64::from(cp) / 100.0))
    }
}

/// One annotated ply.
///
/// The slot is reserved when the move is accepted and sealed once the
/// post-move evaluation resolves; a sealed entry never changes again.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedMove {
    pub ply: usize,
    pub san: String,
    pub mover: Side,
    pub eval_before: EvaluationSnapshot,
    pub eval_after: Option<EvaluationSnapshot>,
    pub quality: Option<MoveQuality>,
    pub time_spent_ms: u64,
}

impl AnnotatedMove {
    pub fn pending(
        ply: usize,
        san: String,
        mover: Side,
        eval_before: EvaluationSnapshot,
        time_spent_ms: u64,
    ) -> Self {
        Self {
            ply,
            san,
            mover,
            eval_before,
            eval_after: None,
            quality: None,
            time_spent_ms,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.eval_after.is_some()
    }

    /// Record the evaluations and classify; ignored once sealed
    pub fn seal(&mut self, before: EvaluationSnapshot, after: EvaluationSnapshot) -> bool {
        if self.is_sealed() {
            return false;
        }
        self.eval_before = before;
        self.eval_after = Some(after);
        self.quality = classify(&before, &after, self.mover);
        true
    }
}

/// Persisted point-in-time copy of a session
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedGameRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub autosave: bool,
    #[serde(default = "standard_start")]
    pub start_position: String,
    pub position_encoding: String,
    pub moves: Vec<String>,
    pub annotated_moves: Vec<AnnotatedMove>,
    pub clock_config: TimeControl,
    pub status: GameStatus,
    pub result: Option<GameOutcome>,
}

fn standard_start() -> String {
    crate::game::rules::STANDARD_START_FEN.to_string()
}

impl SavedGameRecord {
    pub fn summary(&self) -> SavedGameSummary {
        SavedGameSummary {
            id: self.id.clone().unwrap_or_default(),
            name: self.name.clone(),
            created_at: self.created_at,
            saved_at: self.saved_at,
            autosave: self.autosave,
            plies: self.moves.len(),
            status: self.status,
            result: self.result,
        }
    }
}

/// Listing entry for saved sessions
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedGameSummary {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
    pub autosave: bool,
    pub plies: usize,
    pub status: GameStatus,
    pub result: Option<GameOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mate_scores_clamp_to_finite_values() {
        assert_eq!(EvaluationSnapshot::mate(3).score_cp(), Some(MATE_SCORE_CP));
        assert_eq!(EvaluationSnapshot::mate(-2).score_cp(), Some(-MATE_SCORE_CP));
        assert_eq!(EvaluationSnapshot::unknown().score_cp(), None);
        assert_eq!(EvaluationSnapshot::centipawns(-45).score_cp(), Some(-45));
    }

    #[test]
    fn display_formats_pawns_and_mates() {
        assert_eq!(EvaluationSnapshot::centipawns(35).display().as_deref(), Some("+0.35"));
        assert_eq!(EvaluationSnapshot::centipawns(-120).display().as_deref(), Some("-1.20"));
        assert_eq!(EvaluationSnapshot::mate(-3).display().as_deref(), Some("#-3"));
        assert_eq!(EvaluationSnapshot::unknown().display(), None);
    }

    #[test]
    fn sealing_happens_once() {
        let mut annotated =
            AnnotatedMove::pending(0, "e4".into(), Side::White, EvaluationSnapshot::unknown(), 1200);
        assert!(!annotated.is_sealed());

        assert!(annotated.seal(
            EvaluationSnapshot::centipawns(20),
            EvaluationSnapshot::centipawns(30)
        ));
        assert_eq!(annotated.quality, Some(MoveQuality::Best));

        assert!(!annotated.seal(
            EvaluationSnapshot::centipawns(20),
            EvaluationSnapshot::centipawns(-900)
        ));
        assert_eq!(annotated.eval_after, Some(EvaluationSnapshot::centipawns(30)));
    }
}
