//! Game Engine Facade (spec.md §4.7).
//!
//! The only module that calls into the external chess rule engine (the
//! `chess` crate). `Position` is an immutable value; every accepted move
//! yields a new one. `chess::Board` itself is stateless with respect to the
//! fifty-move and threefold-repetition rules, so the facade carries the
//! halfmove clock and a position-hash history alongside it.

use std::str::FromStr;

use chess::{BoardStatus, ChessMove, Color as ChessColor, Piece, Square};

use crate::network::protocol::Color;

#[derive(Debug, Clone)]
pub struct Position {
    board: chess::Board,
    halfmove_clock: u32,
    fullmove_number: u32,
    history: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IllegalMove {
    NotUci,
    NotLegal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("not a valid FEN position")]
pub struct FenParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ongoing,
    Checkmate(Color),
    Stalemate,
    InsufficientMaterial,
    FiftyMove,
    ThreefoldRepetition,
}

pub fn new_initial_position() -> Position {
    let board = chess::Board::default();
    Position {
        board,
        halfmove_clock: 0,
        fullmove_number: 1,
        history: vec![board.get_hash()],
    }
}

/// Apply a UCI move string (e.g. "e2e4", "e7e8q") to `pos`.
pub fn apply_uci(pos: &Position, mv: &str) -> Result<Position, IllegalMove> {
    let chess_move = parse_uci(pos, mv)?;
    if !pos.board.legal(chess_move) {
        return Err(IllegalMove::NotLegal);
    }

    let is_pawn_move = pos.board.piece_on(chess_move.get_source()) == Some(Piece::Pawn);
    let is_capture = pos.board.piece_on(chess_move.get_dest()).is_some();
    let next_board = pos.board.make_move_new(chess_move);

    let halfmove_clock = if is_pawn_move || is_capture {
        0
    } else {
        pos.halfmove_clock + 1
    };
    let fullmove_number = if pos.board.side_to_move() == ChessColor::Black {
        pos.fullmove_number + 1
    } else {
        pos.fullmove_number
    };

    let mut history = pos.history.clone();
    history.push(next_board.get_hash());

    Ok(Position {
        board: next_board,
        halfmove_clock,
        fullmove_number,
        history,
    })
}

/// Parse a standalone FEN into a `Position`, for callers that only ever see
/// a position as a string (e.g. the AI provider). Clocks not carried by FEN
/// itself (the facade's own halfmove/repetition bookkeeping) restart fresh,
/// which is fine for a caller that only needs legal moves from this position.
pub fn position_from_fen(fen: &str) -> Result<Position, FenParseError> {
    let board = chess::Board::from_str(fen).map_err(|_| FenParseError)?;
    Ok(Position {
        board,
        halfmove_clock: 0,
        fullmove_number: 1,
        history: vec![board.get_hash()],
    })
}

/// Every legal move from `pos`, as UCI strings. The AI provider (§4.10)
/// calls through this instead of touching `chess` directly, keeping this
/// facade the sole caller into the rule engine (§4.7).
pub fn legal_moves_uci(pos: &Position) -> Vec<String> {
    chess::MoveGen::new_legal(&pos.board)
        .map(|mv| mv.to_string())
        .collect()
}

fn parse_uci(pos: &Position, mv: &str) -> Result<ChessMove, IllegalMove> {
    if mv.len() != 4 && mv.len() != 5 {
        return Err(IllegalMove::NotUci);
    }
    let source = Square::from_str(&mv[0..2]).map_err(|_| IllegalMove::NotUci)?;
    let dest = Square::from_str(&mv[2..4]).map_err(|_| IllegalMove::NotUci)?;
    let promotion = if mv.len() == 5 {
        Some(match mv.as_bytes()[4] {
            b'q' => Piece::Queen,
            b'r' => Piece::Rook,
            b'b' => Piece::Bishop,
            b'n' => Piece::Knight,
            _ => return Err(IllegalMove::NotUci),
        })
    } else {
        None
    };
    let _ = pos;
    Ok(ChessMove::new(source, dest, promotion))
}

pub fn status(pos: &Position) -> Status {
    match pos.board.status() {
        BoardStatus::Checkmate => {
            // The side to move is the one who has been mated.
            let loser = match pos.board.side_to_move() {
                ChessColor::White => Color::White,
                ChessColor::Black => Color::Black,
            };
            Status::Checkmate(loser)
        }
        BoardStatus::Stalemate => Status::Stalemate,
        BoardStatus::Ongoing => {
            if is_insufficient_material(&pos.board) {
                Status::InsufficientMaterial
            } else if pos.halfmove_clock >= 100 {
                Status::FiftyMove
            } else if pos.history.iter().filter(|&&h| h == pos.board.get_hash()).count() >= 3 {
                Status::ThreefoldRepetition
            } else {
                Status::Ongoing
            }
        }
    }
}

fn is_insufficient_material(board: &chess::Board) -> bool {
    use chess::EMPTY;
    let combined = *board.combined();
    let piece_count = combined.popcnt();
    if piece_count <= 2 {
        return true; // king vs king
    }
    if piece_count == 3 {
        let minors = board.pieces(Piece::Knight) | board.pieces(Piece::Bishop);
        return (minors & combined) != EMPTY;
    }
    false
}

pub fn turn(pos: &Position) -> Color {
    match pos.board.side_to_move() {
        ChessColor::White => Color::White,
        ChessColor::Black => Color::Black,
    }
}

/// FEN for the current position. `chess::Board`'s own `Display` hardcodes
/// the halfmove/fullmove fields, so they're substituted with the clocks the
/// facade tracks.
pub fn fen(pos: &Position) -> String {
    let base = pos.board.to_string();
    let mut parts: Vec<&str> = base.split_whitespace().collect();
    if parts.len() == 6 {
        let halfmove = pos.halfmove_clock.to_string();
        let fullmove = pos.fullmove_number.to_string();
        parts[4] = &halfmove;
        parts[5] = &fullmove;
        return parts.join(" ");
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_fen_matches_spec() {
        let pos = new_initial_position();
        assert_eq!(fen(&pos), "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1");
    }

    #[test]
    fn e2e4_updates_fen_and_turn() {
        let pos = new_initial_position();
        let next = apply_uci(&pos, "e2e4").unwrap();
        assert!(fen(&next).starts_with("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b"));
        assert_eq!(turn(&next), Color::Black);
    }

    #[test]
    fn illegal_move_is_rejected() {
        let pos = new_initial_position();
        assert_eq!(apply_uci(&pos, "e2e5").unwrap_err(), IllegalMove::NotLegal);
    }

    #[test]
    fn out_of_turn_move_is_illegal() {
        let pos = new_initial_position();
        // e7e5 is black's move, attempted while white is to move.
        assert!(apply_uci(&pos, "e7e5").is_err());
    }

    #[test]
    fn fools_mate_is_checkmate() {
        let mut pos = new_initial_position();
        for mv in ["f2f3", "e7e5", "g2g4", "d8h4"] {
            pos = apply_uci(&pos, mv).unwrap();
        }
        assert_eq!(status(&pos), Status::Checkmate(Color::White));
    }

    #[test]
    fn position_from_fen_round_trips_initial_position() {
        let pos = position_from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1").unwrap();
        assert_eq!(legal_moves_uci(&pos).len(), 20);
    }

    #[test]
    fn position_from_fen_rejects_garbage() {
        assert!(position_from_fen("not a fen").is_err());
    }
}
