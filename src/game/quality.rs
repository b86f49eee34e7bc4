//! Move-quality buckets from evaluation deltas.
//!
//! The classification is approximate: it compares two independent engine
//! snapshots with fixed centipawn thresholds and says nothing about whether
//! a better move existed.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{EvaluationSnapshot, Side};

/// Magnitude used for forced mates when comparing scores
pub const MATE_SCORE_CP: i32 = 10_000;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveQuality {
    Excellent,
    Best,
    Inaccuracy,
    Mistake,
    Blunder,
}

impl MoveQuality {
    pub fn is_error(self) -> bool {
        matches!(self, MoveQuality::Mistake | MoveQuality::Blunder)
    }
}

impl fmt::Display for MoveQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MoveQuality::Excellent => "Excellent",
            MoveQuality::Best => "Best",
            MoveQuality::Inaccuracy => "Inaccuracy",
            MoveQuality::Mistake => "Mistake",
            MoveQuality::Blunder => "Blunder",
        };
        f.write_str(label)
    }
}

/// Bucket the change in evaluation caused by `mover`'s move.
///
/// Both snapshots are White's point of view; the delta is flipped for Black.
/// Returns `None` when either side of the comparison is unknown.
pub fn classify(
    before: &EvaluationSnapshot,
    after: &EvaluationSnapshot,
    mover: Side,
) -> Option<MoveQuality> {
    let delta = after.score_cp()? - before.score_cp()?;
    let delta = match mover {
        Side::White => delta,
        Side::Black => -delta,
    };

    let quality = if delta >= 30 {
        MoveQuality::Excellent
    } else if delta >= -50 {
        MoveQuality::Best
    } else if delta >= -150 {
        MoveQuality::Inaccuracy
    } else if delta >= -300 {
        MoveQuality::Mistake
    } else {
        MoveQuality::Blunder
    };
    Some(quality)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cp(value: i32) -> EvaluationSnapshot {
        EvaluationSnapshot::centipawns(value)
    }

    #[test]
    fn thresholds_for_white() {
        assert_eq!(classify(&cp(0), &cp(30), Side::White), Some(MoveQuality::Excellent));
        assert_eq!(classify(&cp(0), &cp(29), Side::White), Some(MoveQuality::Best));
        assert_eq!(classify(&cp(0), &cp(-50), Side::White), Some(MoveQuality::Best));
        assert_eq!(classify(&cp(0), &cp(-51), Side::White), Some(MoveQuality::Inaccuracy));
        assert_eq!(classify(&cp(0), &cp(-150), Side::White), Some(MoveQuality::Inaccuracy));
        assert_eq!(classify(&cp(0), &cp(-300), Side::White), Some(MoveQuality::Mistake));
        assert_eq!(classify(&cp(0), &cp(-301), Side::White), Some(MoveQuality::Blunder));
    }

    #[test]
    fn black_deltas_are_flipped() {
        // The score rising for White is bad for Black
        assert_eq!(classify(&cp(0), &cp(200), Side::Black), Some(MoveQuality::Mistake));
        assert_eq!(classify(&cp(100), &cp(0), Side::Black), Some(MoveQuality::Excellent));
    }

    #[test]
    fn missing_mate_is_a_blunder() {
        let before = EvaluationSnapshot::mate(3);
        assert_eq!(classify(&before, &cp(150), Side::White), Some(MoveQuality::Blunder));
    }

    #[test]
    fn unknown_evaluations_are_not_classified() {
        assert_eq!(classify(&EvaluationSnapshot::unknown(), &cp(10), Side::White), None);
    }
}
