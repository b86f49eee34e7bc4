//! Position handling on top of the `chess` crate.
//!
//! `chess::Board` knows piece placement, castling rights and legal moves but
//! nothing about history, so `Position` carries the move counters and the
//! hashes needed for repetition and fifty-move draws.

use chess::{BitBoard, Board, BoardStatus, ChessMove, Color, MoveGen, Piece, Rank, Square, EMPTY};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::game::error::GameError;
use crate::game::material::has_insufficient_material;

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Why the rules rejected a move
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IllegalReason {
    LeavesKingInCheck,
    InvalidPattern,
}

impl fmt::Display for IllegalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IllegalReason::LeavesKingInCheck => f.write_str("it would leave the king in check"),
            IllegalReason::InvalidPattern => f.write_str("that piece cannot move there"),
        }
    }
}

/// Draw conditions reported for a position
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DrawReason {
    ThreefoldRepetition,
    FiftyMoveRule,
    InsufficientMaterial,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    board: Board,
    halfmove_clock: u32,
    fullmove_number: u32,
    /// Hashes since the last irreversible move, current position last
    hashes: Vec<u64>,
}

impl Default for Position {
    fn default() -> Self {
        Self::initial()
    }
}

impl Position {
    pub fn initial() -> Self {
        Self::from_board(Board::default(), 0, 1)
    }

    fn from_board(board: Board, halfmove_clock: u32, fullmove_number: u32) -> Self {
        Self {
            board,
            halfmove_clock,
            fullmove_number,
            hashes: vec![board.get_hash()],
        }
    }

    pub fn from_fen(fen: &str) -> Result<Self, GameError> {
        let board = Board::from_str(fen.trim())
            .map_err(|_| GameError::CorruptPosition(format!("cannot parse FEN {:?}", fen)))?;
        let fields: Vec<&str> = fen.split_whitespace().collect();
        let halfmove_clock = fields.get(4).and_then(|f| f.parse().ok()).unwrap_or(0);
        let fullmove_number = fields
            .get(5)
            .and_then(|f| f.parse().ok())
            .unwrap_or(1)
            .max(1);
        Ok(Self::from_board(board, halfmove_clock, fullmove_number))
    }

    /// Full FEN including move counters
    pub fn fen(&self) -> String {
        // chess::Board always prints zeroed counters
        let board_fen = self.board.to_string();
        let placement: Vec<&str> = board_fen.split_whitespace().take(4).collect();
        format!(
            "{} {} {}",
            placement.join(" "),
            self.halfmove_clock,
            self.fullmove_number
        )
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn turn(&self) -> Color {
        self.board.side_to_move()
    }

    pub fn fullmove_number(&self) -> u32 {
        self.fullmove_number
    }

    pub fn halfmove_clock(&self) -> u32 {
        self.halfmove_clock
    }

    pub fn piece_at(&self, square: Square) -> Option<(Piece, Color)> {
        Some((self.board.piece_on(square)?, self.board.color_on(square)?))
    }

    pub fn legal_moves(&self) -> Vec<ChessMove> {
        MoveGen::new_legal(&self.board).collect()
    }

    pub fn legal_move_count(&self) -> usize {
        MoveGen::new_legal(&self.board).len()
    }

    /// Destinations reachable from `from`, one entry per square
    pub fn legal_destinations(&self, from: Square) -> Vec<Square> {
        let mut destinations: Vec<Square> = MoveGen::new_legal(&self.board)
            .filter(|m| m.get_source() == from)
            .map(|m| m.get_dest())
            .collect();
        destinations.dedup();
        destinations
    }

    /// Whether moving `from` -> `to` is a pawn reaching its last rank
    pub fn is_promotion(&self, from: Square, to: Square) -> bool {
        match self.piece_at(from) {
            Some((Piece::Pawn, Color::White)) => to.get_rank() == Rank::Eighth,
            Some((Piece::Pawn, Color::Black)) => to.get_rank() == Rank::First,
            _ => false,
        }
    }

    pub fn apply(&self, mv: ChessMove) -> Result<Position, IllegalReason> {
        if !self.board.legal(mv) {
            return Err(self.rejection_reason(mv));
        }

        let moving = self.board.piece_on(mv.get_source());
        let capture = self.board.piece_on(mv.get_dest()).is_some();
        let board = self.board.make_move_new(mv);

        let irreversible = capture || moving == Some(Piece::Pawn);
        let halfmove_clock = if irreversible {
            0
        } else {
            self.halfmove_clock + 1
        };
        let fullmove_number = if self.turn() == Color::Black {
            self.fullmove_number + 1
        } else {
            self.fullmove_number
        };

        let mut hashes = if irreversible {
            Vec::new()
        } else {
            self.hashes.clone()
        };
        hashes.push(board.get_hash());

        Ok(Position {
            board,
            halfmove_clock,
            fullmove_number,
            hashes,
        })
    }

    // A move the piece could make geometrically but the rules refuse can
    // only be refused because of the own king.
    fn rejection_reason(&self, mv: ChessMove) -> IllegalReason {
        let (src, dest) = (mv.get_source(), mv.get_dest());
        let Some((piece, color)) = self.piece_at(src) else {
            return IllegalReason::InvalidPattern;
        };
        if color != self.turn() {
            return IllegalReason::InvalidPattern;
        }
        if mv.get_promotion().is_some() != self.is_promotion(src, dest) {
            return IllegalReason::InvalidPattern;
        }

        let target = BitBoard::from_square(dest);
        if *self.board.color_combined(color) & target != EMPTY {
            return IllegalReason::InvalidPattern;
        }

        let blockers = *self.board.combined();
        let reach = match piece {
            Piece::Pawn => {
                chess::get_pawn_quiets(src, color, blockers)
                    | chess::get_pawn_attacks(src, color, *self.board.color_combined(!color))
            }
            Piece::Knight => chess::get_knight_moves(src),
            Piece::Bishop => chess::get_bishop_moves(src, blockers),
            Piece::Rook => chess::get_rook_moves(src, blockers),
            Piece::Queen => {
                chess::get_bishop_moves(src, blockers) | chess::get_rook_moves(src, blockers)
            }
            Piece::King => chess::get_king_moves(src),
        };

        if reach & target != EMPTY {
            IllegalReason::LeavesKingInCheck
        } else {
            IllegalReason::InvalidPattern
        }
    }

    pub fn is_check(&self) -> bool {
        self.board.checkers().popcnt() > 0
    }

    pub fn is_checkmate(&self) -> bool {
        self.board.status() == BoardStatus::Checkmate
    }

    pub fn is_stalemate(&self) -> bool {
        self.board.status() == BoardStatus::Stalemate
    }

    pub fn draw_reason(&self) -> Option<DrawReason> {
        let current = self.board.get_hash();
        let repeats = self.hashes.iter().filter(|h| **h == current).count();
        if repeats >= 3 {
            Some(DrawReason::ThreefoldRepetition)
        } else if self.halfmove_clock >= 100 {
            Some(DrawReason::FiftyMoveRule)
        } else if has_insufficient_material(&self.board) {
            Some(DrawReason::InsufficientMaterial)
        } else {
            None
        }
    }

    /// Standard algebraic notation for a legal move in this position
    pub fn san(&self, mv: ChessMove) -> String {
        let mut san = self.san_without_suffix(mv);
        let after = self.board.make_move_new(mv);
        if after.status() == BoardStatus::Checkmate {
            san.push('#');
        } else if after.checkers().popcnt() > 0 {
            san.push('+');
        }
        san
    }

    fn san_without_suffix(&self, mv: ChessMove) -> String {
        let (src, dest) = (mv.get_source(), mv.get_dest());
        let Some(piece) = self.board.piece_on(src) else {
            return mv.to_string();
        };

        if piece == Piece::King {
            let span = dest.get_file().to_index() as i32 - src.get_file().to_index() as i32;
            if span == 2 {
                return "O-O".to_string();
            }
            if span == -2 {
                return "O-O-O".to_string();
            }
        }

        let capture = self.board.piece_on(dest).is_some()
            || (piece == Piece::Pawn && src.get_file() != dest.get_file());
        let mut san = String::new();

        if piece == Piece::Pawn {
            if capture {
                san.push(file_char(src));
            }
        } else {
            san.push(piece_letter(piece));
            san.push_str(&self.disambiguation(mv, piece));
        }

        if capture {
            san.push('x');
        }
        san.push_str(&dest.to_string());

        if let Some(promotion) = mv.get_promotion() {
            san.push('=');
            san.push(piece_letter(promotion));
        }
        san
    }

    fn disambiguation(&self, mv: ChessMove, piece: Piece) -> String {
        let src = mv.get_source();
        let rivals: Vec<Square> = MoveGen::new_legal(&self.board)
            .filter(|m| {
                m.get_dest() == mv.get_dest()
                    && m.get_source() != src
                    && self.board.piece_on(m.get_source()) == Some(piece)
            })
            .map(|m| m.get_source())
            .collect();

        if rivals.is_empty() {
            String::new()
        } else if rivals.iter().all(|r| r.get_file() != src.get_file()) {
            file_char(src).to_string()
        } else if rivals.iter().all(|r| r.get_rank() != src.get_rank()) {
            rank_char(src).to_string()
        } else {
            src.to_string()
        }
    }

    /// Parse SAN (suffixes and `0-0` tolerated) or UCI text into a legal move
    pub fn parse_move(&self, text: &str) -> Option<ChessMove> {
        let wanted = normalize_san(text);
        if wanted.is_empty() {
            return None;
        }

        let by_san = MoveGen::new_legal(&self.board).find(|m| {
            let san = self.san_without_suffix(*m);
            san == wanted || san.replace('=', "") == wanted
        });
        if by_san.is_some() {
            return by_san;
        }

        ChessMove::from_str(text.trim())
            .ok()
            .filter(|m| self.board.legal(*m))
    }
}

fn normalize_san(text: &str) -> String {
    let trimmed = text
        .trim()
        .trim_end_matches(|c| matches!(c, '+' | '#' | '!' | '?'));
    match trimmed {
        "0-0" => "O-O".to_string(),
        "0-0-0" => "O-O-O".to_string(),
        other => other.replace("e.p.", "").trim().to_string(),
    }
}

fn file_char(square: Square) -> char {
    (b'a' + square.get_file().to_index() as u8) as char
}

fn rank_char(square: Square) -> char {
    (b'1' + square.get_rank().to_index() as u8) as char
}

pub fn piece_letter(piece: Piece) -> char {
    match piece {
        Piece::Pawn => 'P',
        Piece::Knight => 'N',
        Piece::Bishop => 'B',
        Piece::Rook => 'R',
        Piece::Queen => 'Q',
        Piece::King => 'K',
    }
}

/// Parse a board coordinate such as `e4`
pub fn parse_square(text: &str) -> Result<Square, GameError> {
    Square::from_str(&text.trim().to_ascii_lowercase())
        .map_err(|_| GameError::InvalidSquare(text.to_string()))
}

/// Parse a promotion choice: `q`, `r`, `b`, `n` or the full piece name
pub fn parse_promotion_piece(text: &str) -> Result<Piece, GameError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "q" | "queen" => Ok(Piece::Queen),
        "r" | "rook" => Ok(Piece::Rook),
        "b" | "bishop" => Ok(Piece::Bishop),
        "n" | "knight" => Ok(Piece::Knight),
        other => Err(GameError::InvalidPromotionPiece(other.to_string())),
    }
}
