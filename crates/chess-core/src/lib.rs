//! Game adjudication for agent-vs-agent chess: legality gate, strike
//! counting, turn-taking and terminal detection.

pub mod board;
pub mod controller;
pub mod error;
pub mod history;
pub mod record;
pub mod source;
pub mod validator;

pub use board::{Board, LegalMove, PositionView, Side, STANDARD_START_FEN};
pub use controller::{
    ControllerConfig, GameOutcome, GameSetup, GameState, Turn, TurnController,
    DEFAULT_MAX_ILLEGAL_MOVES, DEFAULT_MOVE_TIMEOUT,
};
pub use error::{CoreError, HistoryRenderError, IllegalMoveRejected, NotationError, SourceError};
pub use record::{GameRecord, GameResult, Participant, PendingRecord};
pub use source::{MoveSource, ERROR_SENTINEL};
pub use validator::{IllegalMoveCounter, MoveValidator};
