//! Stockfish as a move source, spoken to over UCI (async I/O)

use std::time::Duration;

use async_trait::async_trait;
use chess_core::{
    Board, MoveSource, Participant, PositionView, Side, SourceError, STANDARD_START_FEN,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

use crate::error::RunnerError;

/// Stockfish engine instance
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl StockfishEngine {
    /// Spawn a Stockfish process, initialize UCI and set the skill level
    pub async fn new(path: &str, skill_level: u8) -> Result<Self, RunnerError> {
        let mut process = Command::new(path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| RunnerError::Stockfish(format!("Failed to spawn {path}: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| RunnerError::Stockfish("Stockfish stdin not piped".to_string()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Stockfish("Stockfish stdout not piped".to_string()))?;

        let mut engine = Self {
            process,
            stdin,
            stdout: BufReader::new(stdout),
        };

        engine.send("uci").await?;
        engine.wait_for("uciok").await?;

        engine
            .send(&format!("setoption name Skill Level value {skill_level}"))
            .await?;
        engine.send("ucinewgame").await?;
        engine.send("isready").await?;
        engine.wait_for("readyok").await?;

        Ok(engine)
    }

    async fn send(&mut self, cmd: &str) -> Result<(), RunnerError> {
        debug!(cmd, "SF <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| RunnerError::Stockfish(format!("Failed to write to Stockfish: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| RunnerError::Stockfish(format!("Failed to flush stdin: {e}")))?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, RunnerError> {
        let mut line = String::new();
        let n = self
            .stdout
            .read_line(&mut line)
            .await
            .map_err(|e| RunnerError::Stockfish(format!("Failed to read from Stockfish: {e}")))?;
        if n == 0 {
            return Err(RunnerError::Stockfish("Stockfish closed stdout".to_string()));
        }
        let trimmed = line.trim().to_string();
        debug!(line = %trimmed, "SF >");
        Ok(trimmed)
    }

    async fn wait_for(&mut self, expected: &str) -> Result<(), RunnerError> {
        loop {
            if self.read_line().await? == expected {
                return Ok(());
            }
        }
    }

    /// Best move after `moves` from `start_fen`, `None` when the engine has
    /// none (`bestmove (none)` in mated or stalemated positions).
    pub async fn best_move(
        &mut self,
        start_fen: &str,
        moves: &[String],
        movetime: Duration,
    ) -> Result<Option<String>, RunnerError> {
        self.send(&position_command(start_fen, moves)).await?;
        self.send(&format!("go movetime {}", movetime.as_millis())).await?;

        loop {
            let line = self.read_line().await?;
            if line.starts_with("bestmove") {
                return parse_bestmove(&line);
            }
        }
    }

    /// Send quit command and wait for process to exit
    pub async fn quit(&mut self) {
        let _ = self.send("quit").await;
        let _ = self.process.wait().await;
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        let _ = self.process.start_kill();
    }
}

/// UCI `position` with the whole game, so the engine sees repetitions.
fn position_command(start_fen: &str, moves: &[String]) -> String {
    let mut cmd = if start_fen == STANDARD_START_FEN {
        "position startpos".to_string()
    } else {
        format!("position fen {start_fen}")
    };
    if !moves.is_empty() {
        cmd.push_str(" moves ");
        cmd.push_str(&moves.join(" "));
    }
    cmd
}

/// `bestmove e2e4 ponder e7e5` -> `Some("e2e4")`
fn parse_bestmove(line: &str) -> Result<Option<String>, RunnerError> {
    match line.split_whitespace().nth(1) {
        Some("(none)") => Ok(None),
        Some(mv) => Ok(Some(mv.to_string())),
        None => Err(RunnerError::Stockfish(format!("Malformed reply: {line}"))),
    }
}

/// Engine side of a game. Owns its process; `shutdown` quits it.
pub struct EngineSource {
    name: String,
    skill_level: u8,
    movetime: Duration,
    engine: Option<StockfishEngine>,
}

impl EngineSource {
    pub async fn spawn(
        path: &str,
        name: &str,
        skill_level: u8,
        movetime: Duration,
    ) -> Result<Self, RunnerError> {
        let engine = StockfishEngine::new(path, skill_level).await?;
        info!(engine = name, skill_level, "Engine ready");
        Ok(Self {
            name: name.to_string(),
            skill_level,
            movetime,
            engine: Some(engine),
        })
    }
}

#[async_trait]
impl MoveSource for EngineSource {
    fn participant(&self) -> Participant {
        Participant::Engine {
            name: self.name.clone(),
            skill_level: self.skill_level,
        }
    }

    async fn propose_move(
        &mut self,
        position: &PositionView,
        _history: &str,
        _side: Side,
    ) -> Result<String, SourceError> {
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| SourceError::Unavailable("engine already shut down".to_string()))?;

        let uci = engine
            .best_move(&position.start_fen, &position.uci_moves, self.movetime)
            .await
            .map_err(|e| SourceError::Protocol(e.to_string()))?
            .ok_or_else(|| SourceError::NoMove(format!("no move in {}", position.fen)))?;

        // The controller validates SAN, so translate the engine's choice
        let board = Board::from_fen(&position.fen)
            .map_err(|e| SourceError::Protocol(e.to_string()))?;
        let mv = board
            .find_uci(&uci)
            .ok_or_else(|| SourceError::Protocol(format!("engine played unknown move {uci}")))?;
        Ok(board.san(&mv))
    }

    async fn shutdown(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.quit().await;
            debug!(engine = %self.name, "Engine released");
        }
    }
}
