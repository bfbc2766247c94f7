//! Prompt text sent to language-model players

use chess_core::{PositionView, Side};

/// System prompt; `max_illegal_moves` is the forfeit threshold the model is told about.
pub fn system_prompt(max_illegal_moves: u32) -> String {
    format!(
        "You are a chess player. You will receive the current state of the chess board \
and need to make the next move.

Rules:
1. Respond ONLY with your next move in standard algebraic notation (e.g., \"e4\", \"Nf3\", etc.)
2. Do not explain your move or add any other text
3. If you make an illegal move {max_illegal_moves} times, you lose the game
4. Consider the position carefully before making your move

Current position and move history will be provided in the user messages."
    )
}

pub fn user_prompt(position: &PositionView, history: &str, side: Side) -> String {
    let history = if history.is_empty() {
        "(none)"
    } else {
        history
    };
    format!(
        "Current board position (from white's perspective):
{board}

Move history:
{history}

{side} to move.

Make your move:",
        board = position.ascii,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::Board;

    #[test]
    fn test_system_prompt_mentions_threshold() {
        let prompt = system_prompt(5);
        assert!(prompt.contains("illegal move 5 times"));
        assert!(prompt.starts_with("You are a chess player."));
    }

    #[test]
    fn test_user_prompt_layout() {
        let board = Board::default();
        let view = board.view(&[]);
        let prompt = user_prompt(&view, "", Side::White);

        assert!(prompt.contains("r n b q k b n r"));
        assert!(prompt.contains("Move history:\n(none)"));
        assert!(prompt.contains("\nWhite to move.\n"));
        assert!(prompt.ends_with("Make your move:"));
    }

    #[test]
    fn test_user_prompt_keeps_history() {
        let board = Board::default();
        let prompt = user_prompt(&board.view(&[]), "1. e4 e5 2. Nf3", Side::Black);
        assert!(prompt.contains("1. e4 e5 2. Nf3"));
        assert!(prompt.contains("Black to move."));
    }
}
