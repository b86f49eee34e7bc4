use chess::{Board, Color, Piece, Square};

/// Conventional piece values in centipawns
pub fn piece_value(piece: Piece) -> i32 {
    match piece {
        Piece::Pawn => 100,
        Piece::Knight => 320,
        Piece::Bishop => 330,
        Piece::Rook => 500,
        Piece::Queen => 900,
        Piece::King => 0,
    }
}

/// Material held by one side, king excluded
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct MaterialCount {
    pawns: u32,
    knights: u32,
    bishops: u32,
    rooks: u32,
    queens: u32,
    light_bishops: u32,
    dark_bishops: u32,
}

impl MaterialCount {
    fn of(board: &Board, color: Color) -> Self {
        let mut count = MaterialCount::default();
        for square in *board.color_combined(color) {
            match board.piece_on(square) {
                Some(Piece::Pawn) => count.pawns += 1,
                Some(Piece::Knight) => count.knights += 1,
                Some(Piece::Bishop) => {
                    count.bishops += 1;
                    if is_dark_square(square) {
                        count.dark_bishops += 1;
                    } else {
                        count.light_bishops += 1;
                    }
                }
                Some(Piece::Rook) => count.rooks += 1,
                Some(Piece::Queen) => count.queens += 1,
                _ => {}
            }
        }
        count
    }

    fn has_pawn_or_major(&self) -> bool {
        self.pawns + self.rooks + self.queens > 0
    }

    fn minors(&self) -> u32 {
        self.knights + self.bishops
    }
}

// a1 is dark
fn is_dark_square(square: Square) -> bool {
    (square.get_rank().to_index() + square.get_file().to_index()) % 2 == 0
}

/// Neither side can possibly deliver mate
pub fn has_insufficient_material(board: &Board) -> bool {
    let white = MaterialCount::of(board, Color::White);
    let black = MaterialCount::of(board, Color::Black);

    if white.has_pawn_or_major() || black.has_pawn_or_major() {
        return false;
    }

    match (white.minors(), black.minors()) {
        // King vs king, or king and one minor vs king
        (0, 0) | (1, 0) | (0, 1) => true,
        // Bishops on the same colour can never cover each other's squares
        (1, 1) => {
            white.bishops == 1
                && black.bishops == 1
                && (white.dark_bishops == black.dark_bishops)
        }
        _ => false,
    }
}

/// Whether `color` has material that could mate a lone king.
///
/// Approximation used for timeouts: any knights-only army, a single bishop
/// or bishops all on one colour count as unable to mate, helpmates ignored.
pub fn can_force_mate(board: &Board, color: Color) -> bool {
    let own = MaterialCount::of(board, color);
    if own.has_pawn_or_major() {
        return true;
    }
    if own.bishops == 0 {
        return false;
    }
    if own.knights > 0 {
        return true;
    }
    own.light_bishops > 0 && own.dark_bishops > 0
}

/// Material balance from White's point of view
pub fn material_balance(board: &Board) -> i32 {
    let side_total = |color: Color| -> i32 {
        let squares = *board.color_combined(color);
        squares
            .filter_map(|square| board.piece_on(square))
            .map(piece_value)
            .sum()
    };
    side_total(Color::White) - side_total(Color::Black)
}
