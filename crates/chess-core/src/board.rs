//! Board state: a shakmaty position plus the history needed for repetition draws.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::{
    CastlingMode, Chess, Color, EnPassantMode, File, Move, MoveList, Position, Rank, Square,
};

use crate::error::{CoreError, NotationError};

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Half-move clock value at which the fifty-move rule applies.
const FIFTY_MOVE_PLIES: u32 = 100;

/// Occurrences of one position that make a repetition draw.
const REPETITION_COUNT: u32 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    White,
    Black,
}

impl Side {
    /// Label used in prompts and logs ("White" / "Black").
    pub fn label(self) -> &'static str {
        match self {
            Side::White => "White",
            Side::Black => "Black",
        }
    }

    pub fn opponent(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A move that was legal in the position it was produced for.
///
/// Only this crate can construct one: either the validator after a legality
/// check, or a lookup in the legal move list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegalMove(Move);

impl LegalMove {
    pub fn as_move(&self) -> &Move {
        &self.0
    }

    /// UCI text, castling written as the king's two-square move.
    pub fn uci(&self) -> String {
        self.0.to_uci(CastlingMode::Standard).to_string()
    }
}

/// What a move source gets to see of the game.
#[derive(Debug, Clone)]
pub struct PositionView {
    pub fen: String,
    pub ascii: String,
    pub side_to_move: Side,
    /// FEN the game started from
    pub start_fen: String,
    /// Moves applied so far, UCI
    pub uci_moves: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Board {
    pos: Chess,
    start_fen: Option<String>,
    seen: HashMap<String, u32>,
}

impl Default for Board {
    fn default() -> Self {
        Self::with_position(Chess::default(), None)
    }
}

impl Board {
    /// Set up a board from FEN. The standard start FEN yields the same board as `default()`.
    pub fn from_fen(fen: &str) -> Result<Self, CoreError> {
        let fen = fen.trim();
        let invalid = |reason: String| CoreError::InvalidFen {
            fen: fen.to_string(),
            reason,
        };

        let parsed: Fen = fen.parse().map_err(|e| invalid(format!("{e}")))?;
        let pos: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| invalid(format!("{e}")))?;

        let start_fen = (fen != STANDARD_START_FEN).then(|| fen.to_string());
        Ok(Self::with_position(pos, start_fen))
    }

    fn with_position(pos: Chess, start_fen: Option<String>) -> Self {
        let mut board = Self {
            pos,
            start_fen,
            seen: HashMap::new(),
        };
        let key = board.repetition_key();
        board.seen.insert(key, 1);
        board
    }

    /// FEN the game started from, `None` for the standard position.
    pub fn start_fen(&self) -> Option<&str> {
        self.start_fen.as_deref()
    }

    pub fn position(&self) -> &Chess {
        &self.pos
    }

    pub fn side_to_move(&self) -> Side {
        self.pos.turn().into()
    }

    pub fn fullmoves(&self) -> u32 {
        self.pos.fullmoves().get()
    }

    pub fn legal_moves(&self) -> MoveList {
        self.pos.legal_moves()
    }

    /// Resolve SAN (check/mate decoration allowed) to a legal move.
    pub fn parse_san(&self, text: &str) -> Result<LegalMove, NotationError> {
        let san_plus: SanPlus = text
            .parse()
            .map_err(|_| NotationError::Malformed(text.to_string()))?;
        let mv = san_plus
            .san
            .to_move(&self.pos)
            .map_err(|_| NotationError::Unresolved(text.to_string()))?;

        if self.pos.legal_moves().contains(&mv) {
            Ok(LegalMove(mv))
        } else {
            Err(NotationError::Unresolved(text.to_string()))
        }
    }

    /// Find the legal move with the given UCI text.
    pub fn find_uci(&self, uci: &str) -> Option<LegalMove> {
        let uci = uci.trim();
        self.pos
            .legal_moves()
            .into_iter()
            .find(|m| m.to_uci(CastlingMode::Standard).to_string() == uci)
            .map(LegalMove)
    }

    /// SAN for a legal move, with `+` / `#` suffix.
    pub fn san(&self, mv: &LegalMove) -> String {
        let san = San::from_move(&self.pos, mv.as_move().clone()).to_string();
        let mut after = self.pos.clone();
        after.play_unchecked(mv.as_move().clone());
        if after.is_checkmate() {
            format!("{san}#")
        } else if after.is_check() {
            format!("{san}+")
        } else {
            san
        }
    }

    pub fn apply(&mut self, mv: &LegalMove) {
        debug_assert!(self.pos.legal_moves().contains(mv.as_move()));
        self.pos.play_unchecked(mv.as_move().clone());
        let key = self.repetition_key();
        *self.seen.entry(key).or_insert(0) += 1;
    }

    pub fn is_checkmate(&self) -> bool {
        self.pos.is_checkmate()
    }

    pub fn is_stalemate(&self) -> bool {
        self.pos.is_stalemate()
    }

    pub fn is_insufficient_material(&self) -> bool {
        self.pos.is_insufficient_material()
    }

    pub fn is_fifty_move_draw(&self) -> bool {
        self.pos.halfmoves() >= FIFTY_MOVE_PLIES
    }

    pub fn is_repetition_draw(&self) -> bool {
        self.seen
            .get(&self.repetition_key())
            .is_some_and(|&count| count >= REPETITION_COUNT)
    }

    pub fn fen(&self) -> String {
        Fen::from_position(&self.pos, EnPassantMode::Legal).to_string()
    }

    /// Board from White's perspective, rank 8 first, `.` for empty squares.
    pub fn ascii(&self) -> String {
        let board = self.pos.board();
        (0..8u32)
            .rev()
            .map(|rank| {
                (0..8u32)
                    .map(|file| {
                        let sq = Square::from_coords(File::new(file), Rank::new(rank));
                        board.piece_at(sq).map_or('.', |p| p.char()).to_string()
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn view(&self, uci_moves: &[String]) -> PositionView {
        PositionView {
            fen: self.fen(),
            ascii: self.ascii(),
            side_to_move: self.side_to_move(),
            start_fen: self
                .start_fen
                .clone()
                .unwrap_or_else(|| STANDARD_START_FEN.to_string()),
            uci_moves: uci_moves.to_vec(),
        }
    }

    /// Placement, side to move, castling rights and legal en passant square.
    /// Move counters are left out so transpositions compare equal.
    fn repetition_key(&self) -> String {
        self.fen()
            .split_whitespace()
            .take(4)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_position() {
        let board = Board::default();
        assert_eq!(board.side_to_move(), Side::White);
        assert_eq!(board.legal_moves().len(), 20);
        assert_eq!(board.fen(), STANDARD_START_FEN);
        assert!(board.start_fen().is_none());
    }

    #[test]
    fn test_standard_fen_is_not_custom() {
        let board = Board::from_fen(STANDARD_START_FEN).unwrap();
        assert!(board.start_fen().is_none());

        let custom = Board::from_fen("8/8/8/4k3/8/8/8/R3K3 w - - 0 1").unwrap();
        assert_eq!(custom.start_fen(), Some("8/8/8/4k3/8/8/8/R3K3 w - - 0 1"));
    }

    #[test]
    fn test_invalid_fen() {
        assert!(matches!(
            Board::from_fen("not a fen"),
            Err(CoreError::InvalidFen { .. })
        ));
    }

    #[test]
    fn test_parse_san_with_decoration() {
        let board = Board::default();
        let mv = board.parse_san("Nf3+").unwrap();
        assert_eq!(mv.uci(), "g1f3");
        assert!(matches!(
            board.parse_san("Qh5"),
            Err(NotationError::Unresolved(_))
        ));
        assert!(matches!(
            board.parse_san("hello"),
            Err(NotationError::Malformed(_))
        ));
    }

    #[test]
    fn test_ascii_layout() {
        let board = Board::default();
        let ascii = board.ascii();
        let lines: Vec<&str> = ascii.lines().collect();
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0], "r n b q k b n r");
        assert_eq!(lines[4], ". . . . . . . .");
        assert_eq!(lines[7], "R N B Q K B N R");
    }

    #[test]
    fn test_san_suffixes() {
        let mut board = Board::default();
        for san in ["f3", "e5", "g4"] {
            let mv = board.parse_san(san).unwrap();
            board.apply(&mv);
        }
        let mate = board.parse_san("Qh4").unwrap();
        assert_eq!(board.san(&mate), "Qh4#");
    }

    #[test]
    fn test_repetition_by_knight_shuffle() {
        let mut board = Board::default();
        for _ in 0..2 {
            for san in ["Nf3", "Nf6", "Ng1", "Ng8"] {
                assert!(!board.is_repetition_draw());
                let mv = board.parse_san(san).unwrap();
                board.apply(&mv);
            }
        }
        assert!(board.is_repetition_draw());
    }

    #[test]
    fn test_fifty_move_clock() {
        let board = Board::from_fen("8/8/8/4k3/8/8/8/R3K3 w - - 100 80").unwrap();
        assert!(board.is_fifty_move_draw());
        let board = Board::from_fen("8/8/8/4k3/8/8/8/R3K3 w - - 99 80").unwrap();
        assert!(!board.is_fifty_move_draw());
    }

    #[test]
    fn test_apply_tracks_fen_and_view() {
        let mut board = Board::default();
        let mv = board.parse_san("e4").unwrap();
        assert_eq!(board.san(&mv), "e4");
        board.apply(&mv);
        assert_eq!(
            board.fen(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
        );

        let view = board.view(&["e2e4".to_string()]);
        assert_eq!(view.start_fen, STANDARD_START_FEN);
        assert_eq!(view.side_to_move, Side::Black);
        assert_eq!(view.uci_moves, ["e2e4"]);
    }

    #[test]
    fn test_find_uci_castling() {
        let board =
            Board::from_fen("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1").unwrap();
        let castle = board.find_uci("e1g1").unwrap();
        assert_eq!(board.san(&castle), "O-O");
        assert!(board.find_uci("e1e3").is_none());
    }
}
