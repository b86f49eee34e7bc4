//! Post-game review helpers: evaluation curve, win probability and
//! stepping through mistakes.

use serde::Serialize;

use crate::game::quality::{MoveQuality, MATE_SCORE_CP};
use crate::game::session::GameSession;
use crate::models::{AnnotatedMove, EvaluationSnapshot};

/// One step of the review, as shown to the player
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ReviewFrame {
    /// Ply index of the reviewed move
    pub index: usize,
    /// Position after the move
    pub fen: String,
    pub san: String,
    pub quality: Option<MoveQuality>,
    pub evaluation: Option<EvaluationSnapshot>,
    pub win_probability: f64,
}

/// After-move evaluation per ply in centipawns; unknown counts as level
pub fn eval_curve(moves: &[AnnotatedMove]) -> Vec<i32> {
    moves
        .iter()
        .map(|m| {
            m.eval_after
                .and_then(|e| e.score_cp())
                .unwrap_or(0)
                .clamp(-MATE_SCORE_CP, MATE_SCORE_CP)
        })
        .collect()
}

/// White's expected score for an evaluation
pub fn win_probability(centipawns: i32) -> f64 {
    let cp = f64::from(centipawns.clamp(-600, 600));
    1.0 / (1.0 + 10f64.powf(-cp / 1600.0))
}

fn is_mistake(annotated: &AnnotatedMove) -> bool {
    annotated.quality.map(MoveQuality::is_error).unwrap_or(false)
}

/// First Mistake or Blunder strictly after `cursor` (or from the start)
pub fn next_mistake(moves: &[AnnotatedMove], cursor: Option<usize>) -> Option<usize> {
    let from = cursor.map(|c| c + 1).unwrap_or(0);
    moves
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, m)| is_mistake(m))
        .map(|(index, _)| index)
}

/// Last Mistake or Blunder strictly before `cursor` (or from the end)
pub fn prev_mistake(moves: &[AnnotatedMove], cursor: Option<usize>) -> Option<usize> {
    let until = cursor.unwrap_or(moves.len()).min(moves.len());
    moves[..until]
        .iter()
        .enumerate()
        .rev()
        .find(|(_, m)| is_mistake(m))
        .map(|(index, _)| index)
}

/// Frame for ply `index` without touching the session
pub fn frame(session: &GameSession, index: usize) -> Option<ReviewFrame> {
    let annotated = session.annotations().get(index)?;
    let position = session.position_after(index + 1)?;
    let cp = annotated.eval_after.and_then(|e| e.score_cp()).unwrap_or(0);
    Some(ReviewFrame {
        index,
        fen: position.fen(),
        san: annotated.san.clone(),
        quality: annotated.quality,
        evaluation: annotated.eval_after,
        win_probability: win_probability(cp),
    })
}
