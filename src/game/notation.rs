//! Plain numbered move lists: `1. e4 e5 2. Nf3 Nc6`.
//!
//! Export can add `{eval quality time}` comments after each move. A game
//! that did not begin from the standard position is prefixed with a
//! `[FEN "..."]` tag. Import accepts bare or annotated lists, and PGN-style
//! text in general: the FEN tag sets the start, other tag pairs, comments,
//! variations, NAGs and result markers are skipped.

use chess::ChessMove;

use crate::game::error::{GameError, GameResult};
use crate::game::rules::Position;
use crate::models::{AnnotatedMove, GameOutcome, Side};

/// A move recovered from imported text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayedMove {
    pub chess_move: ChessMove,
    pub san: String,
    pub mover: Side,
}

/// Render the move list starting from `start`
pub fn export_move_list(
    start: &Position,
    moves: &[AnnotatedMove],
    outcome: Option<&GameOutcome>,
    annotate: bool,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    let fen = start.fen();
    if fen != Position::initial().fen() {
        parts.push(format!("[FEN \"{}\"]", fen));
    }
    let mut number = start.fullmove_number();

    for (index, annotated) in moves.iter().enumerate() {
        match annotated.mover {
            Side::White => parts.push(format!("{}.", number)),
            // Black to move first, or a comment separated the pair
            Side::Black if index == 0 || annotate => parts.push(format!("{}...", number)),
            Side::Black => {}
        }
        parts.push(annotated.san.clone());

        if annotate {
            if let Some(comment) = move_comment(annotated) {
                parts.push(format!("{{{}}}", comment));
            }
        }
        if annotated.mover == Side::Black {
            number += 1;
        }
    }

    if let Some(outcome) = outcome {
        parts.push(outcome.result_marker().to_string());
    }
    parts.join(" ")
}

fn move_comment(annotated: &AnnotatedMove) -> Option<String> {
    let mut fields = Vec::new();
    if let Some(eval) = annotated.eval_after.and_then(|e| e.display()) {
        fields.push(eval);
    }
    if let Some(quality) = annotated.quality {
        fields.push(quality.to_string());
    }
    if annotated.time_spent_ms > 0 {
        fields.push(format!("{:.1}s", annotated.time_spent_ms as f64 / 1000.0));
    }
    if fields.is_empty() {
        None
    } else {
        Some(fields.join(" "))
    }
}

/// Parse and replay a move list from `start`.
///
/// Fails on the first token the position does not accept; nothing is
/// returned for the moves before it.
pub fn parse_move_list(start: &Position, text: &str) -> GameResult<Vec<ReplayedMove>> {
    let mut position = start.clone();
    let mut replayed = Vec::new();

    for (index, token) in move_tokens(text).into_iter().enumerate() {
        let Some(mv) = position.parse_move(&token) else {
            return Err(GameError::ImportParseFailure {
                index,
                token,
                reason: format!("not a legal move with {} to move", Side::from(position.turn())),
            });
        };
        let san = position.san(mv);
        let mover = position.turn().into();
        position = position.apply(mv).map_err(|reason| GameError::ImportParseFailure {
            index,
            token: token.clone(),
            reason: reason.to_string(),
        })?;
        replayed.push(ReplayedMove {
            chess_move: mv,
            san,
            mover,
        });
    }
    Ok(replayed)
}

/// Parse a whole game: the start from its `[FEN]` tag (standard position
/// when there is none) and the moves replayed from it
pub fn parse_game(text: &str) -> GameResult<(Position, Vec<ReplayedMove>)> {
    let start = match fen_tag(text) {
        Some(fen) => Position::from_fen(fen).map_err(|err| GameError::ImportParseFailure {
            index: 0,
            token: fen.to_string(),
            reason: err.to_string(),
        })?,
        None => Position::initial(),
    };
    let moves = parse_move_list(&start, text)?;
    Ok((start, moves))
}

/// Value of the first `[FEN "..."]` tag pair
fn fen_tag(text: &str) -> Option<&str> {
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let close = after.find(']')?;
        if let Some((name, value)) = after[..close].trim().split_once(char::is_whitespace) {
            if name.eq_ignore_ascii_case("FEN") {
                return Some(value.trim().trim_matches('"').trim());
            }
        }
        rest = &after[close + 1..];
    }
    None
}

/// Split text into move tokens, dropping everything that is not a move
fn move_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    let mut variation_depth = 0usize;

    let flush = |current: &mut String, tokens: &mut Vec<String>| {
        if let Some(token) = clean_token(current) {
            tokens.push(token);
        }
        current.clear();
    };

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                flush(&mut current, &mut tokens);
                for inner in chars.by_ref() {
                    if inner == '}' {
                        break;
                    }
                }
            }
            ';' => {
                flush(&mut current, &mut tokens);
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        break;
                    }
                }
            }
            '[' if variation_depth == 0 => {
                flush(&mut current, &mut tokens);
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                }
            }
            '(' => {
                flush(&mut current, &mut tokens);
                variation_depth += 1;
            }
            ')' => {
                flush(&mut current, &mut tokens);
                variation_depth = variation_depth.saturating_sub(1);
            }
            _ if variation_depth > 0 => {}
            c if c.is_whitespace() => flush(&mut current, &mut tokens),
            c => current.push(c),
        }
    }
    flush(&mut current, &mut tokens);
    tokens
}

fn clean_token(raw: &str) -> Option<String> {
    let token = raw.trim();
    if token.is_empty() || is_result_marker(token) || token.starts_with('$') {
        return None;
    }

    // Move numbers, possibly glued to the move: "12." "12..." "12.Nf3"
    let token = if token.starts_with(|c: char| c.is_ascii_digit()) && token.contains('.') {
        token.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.')
    } else {
        token
    };

    if token.is_empty() || token.chars().all(|c| matches!(c, '!' | '?')) {
        return None;
    }
    Some(token.to_string())
}

fn is_result_marker(token: &str) -> bool {
    matches!(token, "1-0" | "0-1" | "1/2-1/2" | "½-½" | "*")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::quality::MoveQuality;
    use crate::models::{EndReason, EvaluationSnapshot};

    fn annotated(ply: usize, san: &str, mover: Side) -> AnnotatedMove {
        AnnotatedMove::pending(ply, san.to_string(), mover, EvaluationSnapshot::unknown(), 0)
    }

    fn sans(moves: &[ReplayedMove]) -> Vec<&str> {
        moves.iter().map(|m| m.san.as_str()).collect()
    }

    #[test]
    fn bare_export_numbers_moves() {
        let moves = vec![
            annotated(0, "e4", Side::White),
            annotated(1, "e5", Side::Black),
            annotated(2, "Nf3", Side::White),
            annotated(3, "Nc6", Side::Black),
        ];
        let text = export_move_list(&Position::initial(), &moves, None, false);
        assert_eq!(text, "1. e4 e5 2. Nf3 Nc6");
    }

    #[test]
    fn export_from_black_to_move_and_with_result() {
        let start = Position::from_fen("4k3/8/8/8/8/8/4P3/4K3 b - - 0 7").unwrap();
        let moves = vec![annotated(0, "Kd7", Side::Black), annotated(1, "e4", Side::White)];
        let outcome = GameOutcome::draw(EndReason::InsufficientMaterial);
        let text = export_move_list(&start, &moves, Some(&outcome), false);
        assert_eq!(
            text,
            "[FEN \"4k3/8/8/8/8/8/4P3/4K3 b - - 0 7\"] 7... Kd7 8. e4 1/2-1/2"
        );
    }

    #[test]
    fn custom_start_survives_export_and_import() {
        let start = Position::from_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1").unwrap();
        let played = parse_move_list(&start, "e2e4 e8d7").unwrap();
        let annotations: Vec<AnnotatedMove> = played
            .iter()
            .enumerate()
            .map(|(ply, m)| annotated(ply, &m.san, m.mover))
            .collect();
        let text = export_move_list(&start, &annotations, None, false);
        assert_eq!(text, "[FEN \"4k3/8/8/8/8/8/4P3/4K3 w - - 0 1\"] 1. e4 Kd7");

        let (again_start, again) = parse_game(&text).unwrap();
        assert_eq!(again_start.fen(), start.fen());
        assert_eq!(again, played);
    }

    #[test]
    fn games_without_a_fen_tag_start_from_the_standard_position() {
        let (start, moves) = parse_game("[Event \"Casual\"] 1. e4").unwrap();
        assert_eq!(start.fen(), Position::initial().fen());
        assert_eq!(sans(&moves), vec!["e4"]);
    }

    #[test]
    fn unreadable_fen_tag_fails_the_import() {
        let err = parse_game("[FEN \"not a position\"] 1. e4").unwrap_err();
        assert!(matches!(err, GameError::ImportParseFailure { index: 0, .. }));
    }

    #[test]
    fn annotated_export_adds_comments() {
        let mut first = annotated(0, "e4", Side::White);
        first.time_spent_ms = 4200;
        first.seal(EvaluationSnapshot::centipawns(20), EvaluationSnapshot::centipawns(35));
        let mut second = annotated(1, "f6", Side::Black);
        second.seal(EvaluationSnapshot::centipawns(35), EvaluationSnapshot::centipawns(120));
        assert_eq!(second.quality, Some(MoveQuality::Inaccuracy));

        let text = export_move_list(&Position::initial(), &[first, second], None, true);
        assert_eq!(text, "1. e4 {+0.35 Best 4.2s} 1... f6 {+1.20 Inaccuracy}");
    }

    #[test]
    fn import_strips_everything_but_moves() {
        let text = r#"[Event "Casual"]
[White "A"]
1. e4 {+0.35 Best 4.2s} 1... e5 $1 2.Nf3 (2. Bc4 Nf6 (2... Bc5)) Nc6!? ; main line
3. Bb5 a6 1-0"#;
        let moves = parse_move_list(&Position::initial(), text).unwrap();
        assert_eq!(sans(&moves), vec!["e4", "e5", "Nf3", "Nc6", "Bb5", "a6"]);
        assert_eq!(moves[1].mover, Side::Black);
    }

    #[test]
    fn import_accepts_uci_and_zero_castling() {
        let moves =
            parse_move_list(&Position::initial(), "e2e4 e7e5 g1f3 b8c6 f1c4 g8f6 0-0").unwrap();
        assert_eq!(moves.last().map(|m| m.san.as_str()), Some("O-O"));
    }

    #[test]
    fn import_reports_the_failing_token() {
        let err = parse_move_list(&Position::initial(), "1. e4 e5 2. Ke3").unwrap_err();
        match err {
            GameError::ImportParseFailure { index, token, .. } => {
                assert_eq!(index, 2);
                assert_eq!(token, "Ke3");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn export_then_import_round_trips() {
        let played = parse_move_list(&Position::initial(), "1. f3 e5 2. g4 Qh4#").unwrap();
        let annotations: Vec<AnnotatedMove> = played
            .iter()
            .enumerate()
            .map(|(ply, m)| annotated(ply, &m.san, m.mover))
            .collect();
        let text = export_move_list(&Position::initial(), &annotations, None, true);
        let again = parse_move_list(&Position::initial(), &text).unwrap();
        assert_eq!(again, played);
    }

    #[test]
    fn empty_text_is_an_empty_game() {
        assert!(parse_move_list(&Position::initial(), "  ").unwrap().is_empty());
        assert!(parse_move_list(&Position::initial(), "*").unwrap().is_empty());
    }
}
