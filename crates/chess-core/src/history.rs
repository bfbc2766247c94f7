//! Movetext rendering of applied moves ("1. e4 e5 2. Nf3 ...").

use tracing::warn;

use crate::board::{Board, Side};
use crate::error::HistoryRenderError;

/// Replay `moves` (UCI) from `start` and render SAN movetext.
///
/// Moves that cannot be replayed are reported and left out of the text.
pub fn render_movetext(start: &Board, moves: &[String]) -> (String, Vec<HistoryRenderError>) {
    let mut board = start.clone();
    let mut formatted = String::new();
    let mut errors = Vec::new();

    for (ply, uci) in moves.iter().enumerate() {
        let Some(mv) = board.find_uci(uci) else {
            errors.push(HistoryRenderError {
                ply,
                uci: uci.clone(),
            });
            continue;
        };
        let san = board.san(&mv);

        if !formatted.is_empty() {
            formatted.push(' ');
        }
        match board.side_to_move() {
            Side::White => formatted.push_str(&format!("{}. {san}", board.fullmoves())),
            Side::Black if formatted.is_empty() => {
                formatted.push_str(&format!("{}... {san}", board.fullmoves()))
            }
            Side::Black => formatted.push_str(&san),
        }

        board.apply(&mv);
    }

    (formatted, errors)
}

/// Movetext for prompts; render failures are logged and skipped.
pub fn format_history(start: &Board, moves: &[String]) -> String {
    let (formatted, errors) = render_movetext(start, moves);
    for e in &errors {
        warn!(ply = e.ply, uci = %e.uci, "Skipping move in history: {e}");
    }
    formatted
}
