use chess::Color;

use crate::game::material::material_balance;
use crate::game::rules::Position;
use crate::models::EvaluationSnapshot;

const MOBILITY_CAP: i32 = 30;

/// Material plus a small mobility bonus for the side to move.
///
/// Always produces a centipawn figure; mates are not detected.
pub fn static_evaluation(position: &Position) -> EvaluationSnapshot {
    let material = material_balance(position.board());
    let mobility = (position.legal_move_count() as i32).min(MOBILITY_CAP);
    let mobility = match position.turn() {
        Color::White => mobility,
        Color::Black => -mobility,
    };
    EvaluationSnapshot::centipawns(material + mobility)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_position_favours_the_side_to_move_slightly() {
        let eval = static_evaluation(&Position::initial());
        assert_eq!(eval, EvaluationSnapshot::centipawns(20));
    }

    #[test]
    fn mobility_is_capped() {
        let position = Position::from_fen("4k3/8/8/3Q4/8/8/8/R3K2R w KQ - 0 1").unwrap();
        assert!(position.legal_move_count() > 30);
        assert_eq!(static_evaluation(&position), EvaluationSnapshot::centipawns(1930));
    }

    #[test]
    fn mobility_counts_against_white_when_black_moves() {
        let position = Position::from_fen("3qk3/8/8/8/8/8/8/4K3 b - - 0 1").unwrap();
        let cp = static_evaluation(&position).centipawns.unwrap();
        assert!(cp < -900 && cp >= -930);
    }
}
