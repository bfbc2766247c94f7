//! Turn controller: drives one game from the first request to the sealed record.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::board::{Board, Side};
use crate::error::{CoreError, IllegalMoveRejected, SourceError};
use crate::history::format_history;
use crate::record::{GameRecord, GameResult, PendingRecord};
use crate::source::{MoveSource, ERROR_SENTINEL};
use crate::validator::MoveValidator;

/// Strikes that forfeit a game.
pub const DEFAULT_MAX_ILLEGAL_MOVES: u32 = 3;

/// Budget for one proposal request unless configured otherwise.
pub const DEFAULT_MOVE_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub max_illegal_moves: u32,
    /// Budget for a single proposal request
    pub move_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_illegal_moves: DEFAULT_MAX_ILLEGAL_MOVES,
            move_timeout: DEFAULT_MOVE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GameSetup {
    /// Side that `agent_won` / `opponent_won` refer to
    pub agent_side: Side,
    /// Start from this position instead of the standard one
    pub start_fen: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameState {
    Active,
    AwaitingMove(Side),
    Terminated(GameResult),
}

/// What a single `step` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    Applied { side: Side, uci: String },
    Rejected(IllegalMoveRejected),
    Finished(GameResult),
}

#[derive(Debug)]
pub enum GameOutcome {
    Sealed(GameRecord),
    /// Stopped at a turn boundary before a result; nothing to report.
    Abandoned { moves_played: usize },
}

pub struct TurnController {
    start: Board,
    board: Board,
    validator: MoveValidator,
    white: Box<dyn MoveSource>,
    black: Box<dyn MoveSource>,
    record: PendingRecord,
    state: GameState,
    config: ControllerConfig,
}

impl TurnController {
    pub fn new(
        setup: GameSetup,
        white: Box<dyn MoveSource>,
        black: Box<dyn MoveSource>,
        config: ControllerConfig,
    ) -> Result<Self, CoreError> {
        let board = match &setup.start_fen {
            Some(fen) => Board::from_fen(fen)?,
            None => Board::default(),
        };

        let (white_id, black_id) = (white.id(), black.id());
        if white_id == black_id {
            return Err(CoreError::DuplicateAgent(white_id));
        }

        let mut validator = MoveValidator::new();
        validator.reset(&white_id);
        validator.reset(&black_id);

        let record = PendingRecord::new(
            white.participant(),
            black.participant(),
            setup.agent_side,
            board.start_fen().map(str::to_string),
        );

        Ok(Self {
            start: board.clone(),
            board,
            validator,
            white,
            black,
            record,
            state: GameState::Active,
            config,
        })
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn moves(&self) -> &[String] {
        self.record.moves()
    }

    /// Strikes so far for whoever plays `side`.
    pub fn illegal_count(&self, side: Side) -> u32 {
        self.validator.get_count(&self.source(side).id())
    }

    fn source(&self, side: Side) -> &dyn MoveSource {
        match side {
            Side::White => self.white.as_ref(),
            Side::Black => self.black.as_ref(),
        }
    }

    /// Run one request/validate/apply cycle.
    pub async fn step(&mut self) -> Turn {
        if let GameState::Terminated(result) = self.state {
            return Turn::Finished(result);
        }

        let side = self.board.side_to_move();
        self.state = GameState::AwaitingMove(side);

        let view = self.board.view(self.record.moves());
        let history = format_history(&self.start, self.record.moves());
        let timeout = self.config.move_timeout;

        let source = match side {
            Side::White => &mut self.white,
            Side::Black => &mut self.black,
        };
        let agent = source.id();

        source.ready().await;
        let proposal = match tokio::time::timeout(
            timeout,
            source.propose_move(&view, &history, side),
        )
        .await
        {
            Ok(Ok(raw)) if raw.trim() == ERROR_SENTINEL => Err(SourceError::Sentinel),
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(timeout)),
        };

        let raw = match proposal {
            Ok(raw) => raw,
            Err(e) => {
                error!(agent = %agent, side = %side, error = %e, "Move source failed");
                return self.terminate(GameResult::SourceFailure);
            }
        };
        debug!(agent = %agent, proposal = %raw, "Proposal received");

        match self.validator.validate(&self.board, &raw, &agent) {
            Err(rejected) => {
                warn!(
                    agent = %agent,
                    proposal = %rejected.proposal,
                    strikes = rejected.strikes,
                    "Illegal move"
                );
                if rejected.strikes >= self.config.max_illegal_moves {
                    info!(agent = %agent, "Game over - too many illegal moves");
                    return self.terminate(GameResult::ForfeitByIllegalMoves(side));
                }
                self.state = GameState::Active;
                Turn::Rejected(rejected)
            }
            Ok(mv) => {
                // Mover is fixed before the side pointer flips
                let mover = side;
                let uci = mv.uci();
                self.board.apply(&mv);
                self.record.push_move(uci.clone());

                match self.terminal_result(mover) {
                    Some(result) => self.terminate(result),
                    None => {
                        self.state = GameState::Active;
                        Turn::Applied { side: mover, uci }
                    }
                }
            }
        }
    }

    fn terminal_result(&self, mover: Side) -> Option<GameResult> {
        if self.board.is_checkmate() {
            Some(if mover == self.record.agent_side() {
                GameResult::AgentWon
            } else {
                GameResult::OpponentWon
            })
        } else if self.board.is_stalemate() {
            Some(GameResult::DrawStalemate)
        } else if self.board.is_insufficient_material() {
            Some(GameResult::DrawInsufficientMaterial)
        } else if self.board.is_fifty_move_draw() {
            Some(GameResult::DrawFiftyMoves)
        } else if self.board.is_repetition_draw() {
            Some(GameResult::DrawRepetition)
        } else {
            None
        }
    }

    fn terminate(&mut self, result: GameResult) -> Turn {
        if let GameState::Terminated(existing) = self.state {
            return Turn::Finished(existing);
        }
        self.state = GameState::Terminated(result);
        Turn::Finished(result)
    }

    /// Play to the end and seal the record.
    pub async fn play(self) -> GameOutcome {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        self.play_until(shutdown_rx).await
    }

    /// Play until the game ends or `shutdown` turns true. Shutdown is only
    /// honoured between turns or while waiting on a source.
    pub async fn play_until(mut self, mut shutdown: watch::Receiver<bool>) -> GameOutcome {
        info!(
            white = %self.white.id(),
            black = %self.black.id(),
            agent_side = %self.record.agent_side(),
            "Starting game"
        );

        let result = loop {
            if *shutdown.borrow() {
                break None;
            }
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break None,
                turn = self.step() => {
                    if let Turn::Finished(result) = turn {
                        break Some(result);
                    }
                }
            }
        };

        self.white.shutdown().await;
        self.black.shutdown().await;

        match result {
            Some(result) => {
                let strikes = self.validator.counter().snapshot();
                let record = self.record.seal(result, strikes);
                info!(
                    result = %record.result(),
                    moves = record.moves().len(),
                    "Game finished"
                );
                GameOutcome::Sealed(record)
            }
            None => {
                let moves_played = self.record.moves().len();
                warn!(moves_played, "Game abandoned");
                GameOutcome::Abandoned { moves_played }
            }
        }
    }
}

/// Resolves once shutdown is requested; never if the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::PositionView;
    use crate::record::Participant;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct Scripted {
        name: &'static str,
        moves: VecDeque<&'static str>,
        released: Arc<AtomicBool>,
    }

    impl Scripted {
        fn new(name: &'static str, moves: &[&'static str]) -> Self {
            Self {
                name,
                moves: moves.iter().copied().collect(),
                released: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl MoveSource for Scripted {
        fn participant(&self) -> Participant {
            Participant::Model {
                model: self.name.to_string(),
                provider: "script".to_string(),
            }
        }

        async fn propose_move(
            &mut self,
            _position: &PositionView,
            _history: &str,
            _side: Side,
        ) -> Result<String, SourceError> {
            self.moves
                .pop_front()
                .map(str::to_string)
                .ok_or_else(|| SourceError::NoMove("script exhausted".to_string()))
        }

        async fn shutdown(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn controller(white: Scripted, black: Scripted) -> TurnController {
        TurnController::new(
            GameSetup::default(),
            Box::new(white),
            Box::new(black),
            ControllerConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_step_applies_legal_move() {
        let mut game = controller(Scripted::new("w", &["e4"]), Scripted::new("b", &[]));
        assert_eq!(game.state(), &GameState::Active);

        let turn = game.step().await;
        assert_eq!(
            turn,
            Turn::Applied {
                side: Side::White,
                uci: "e2e4".to_string()
            }
        );
        assert_eq!(game.board().side_to_move(), Side::Black);
        assert_eq!(game.illegal_count(Side::White), 0);
        assert_eq!(game.state(), &GameState::Active);
    }

    #[tokio::test]
    async fn test_rejection_keeps_turn() {
        let mut game = controller(Scripted::new("w", &["Qh5", "e4"]), Scripted::new("b", &[]));

        let turn = game.step().await;
        assert!(matches!(turn, Turn::Rejected(ref r) if r.strikes == 1));
        assert_eq!(game.board().side_to_move(), Side::White);
        assert!(game.moves().is_empty());

        game.step().await;
        assert_eq!(game.moves(), ["e2e4".to_string()]);
        assert_eq!(game.illegal_count(Side::White), 1);
    }

    #[tokio::test]
    async fn test_sentinel_is_source_failure() {
        let mut game = controller(Scripted::new("w", &["ERROR"]), Scripted::new("b", &[]));
        assert_eq!(game.step().await, Turn::Finished(GameResult::SourceFailure));
        assert_eq!(game.illegal_count(Side::White), 0);
        // Terminal state is sticky
        assert_eq!(game.step().await, Turn::Finished(GameResult::SourceFailure));
    }

    #[tokio::test]
    async fn test_duplicate_agents_rejected() {
        let result = TurnController::new(
            GameSetup::default(),
            Box::new(Scripted::new("same", &[])),
            Box::new(Scripted::new("same", &[])),
            ControllerConfig::default(),
        );
        assert!(matches!(result, Err(CoreError::DuplicateAgent(_))));
    }

    #[tokio::test]
    async fn test_sources_released_on_forfeit() {
        let white = Scripted::new("w", &["Qh5", "Qh5", "Qh5"]);
        let black = Scripted::new("b", &[]);
        let (white_released, black_released) = (white.released.clone(), black.released.clone());

        let outcome = controller(white, black).play().await;
        let GameOutcome::Sealed(record) = outcome else {
            panic!("expected a sealed record");
        };
        assert_eq!(record.result(), GameResult::ForfeitByIllegalMoves(Side::White));
        assert!(white_released.load(Ordering::SeqCst));
        assert!(black_released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_checkmate_credits_mover() {
        let white = Scripted::new("w", &["f3", "g4"]);
        let black = Scripted::new("b", &["e5", "Qh4#"]);
        let GameOutcome::Sealed(record) = controller(white, black).play().await else {
            panic!("expected a sealed record");
        };
        // Agent framing is White, Black delivered mate
        assert_eq!(record.result(), GameResult::OpponentWon);
        assert_eq!(record.moves(), ["f2f3", "e7e5", "g2g4", "d8h4"]);
    }
}
