//! The capability a player exposes to the turn controller.

use async_trait::async_trait;

use crate::board::{PositionView, Side};
use crate::error::SourceError;
use crate::record::Participant;

/// Returned by sources that could not come up with anything.
pub const ERROR_SENTINEL: &str = "ERROR";

/// Anything that can propose a move for the side on turn: a language model,
/// a UCI engine, a script in a test.
#[async_trait]
pub trait MoveSource: Send {
    fn participant(&self) -> Participant;

    fn id(&self) -> String {
        self.participant().id()
    }

    /// Wait until the source may be asked for a move (e.g. rate limits).
    /// Time spent here does not count against the per-request budget.
    async fn ready(&mut self) {}

    /// Propose a move in SAN for `side`.
    async fn propose_move(
        &mut self,
        position: &PositionView,
        history: &str,
        side: Side,
    ) -> Result<String, SourceError>;

    /// Release whatever the source holds (processes, connections).
    async fn shutdown(&mut self) {}
}
