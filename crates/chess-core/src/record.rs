//! Game record: built up move by move, sealed once when the game ends.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::board::Side;

/// Who is playing one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Participant {
    Model { model: String, provider: String },
    Engine { name: String, skill_level: u8 },
}

impl Participant {
    /// Identity used for strike counting.
    pub fn id(&self) -> String {
        match self {
            Participant::Model { model, .. } => model.clone(),
            Participant::Engine { name, skill_level } => format!("{name}-skill-{skill_level}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameResult {
    AgentWon,
    OpponentWon,
    ForfeitByIllegalMoves(Side),
    DrawStalemate,
    DrawInsufficientMaterial,
    DrawFiftyMoves,
    DrawRepetition,
    SourceFailure,
}

impl GameResult {
    pub fn is_draw(self) -> bool {
        matches!(
            self,
            GameResult::DrawStalemate
                | GameResult::DrawInsufficientMaterial
                | GameResult::DrawFiftyMoves
                | GameResult::DrawRepetition
        )
    }

    /// Winning side, given which side the agent framing refers to.
    pub fn winner(self, agent_side: Side) -> Option<Side> {
        match self {
            GameResult::AgentWon => Some(agent_side),
            GameResult::OpponentWon => Some(agent_side.opponent()),
            GameResult::ForfeitByIllegalMoves(loser) => Some(loser.opponent()),
            _ => None,
        }
    }
}

/// Same text serde writes: unit results as their bare name, a forfeit as
/// `{"forfeit_by_illegal_moves":"white"}`.
impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameResult::AgentWon => f.write_str("agent_won"),
            GameResult::OpponentWon => f.write_str("opponent_won"),
            GameResult::ForfeitByIllegalMoves(side) => {
                write!(
                    f,
                    r#"{{"forfeit_by_illegal_moves":"{}"}}"#,
                    side.label().to_lowercase()
                )
            }
            GameResult::DrawStalemate => f.write_str("draw_stalemate"),
            GameResult::DrawInsufficientMaterial => f.write_str("draw_insufficient_material"),
            GameResult::DrawFiftyMoves => f.write_str("draw_fifty_moves"),
            GameResult::DrawRepetition => f.write_str("draw_repetition"),
            GameResult::SourceFailure => f.write_str("source_failure"),
        }
    }
}

/// A game in progress. Only `seal` turns it into a `GameRecord`.
#[derive(Debug, Clone)]
pub struct PendingRecord {
    timestamp: DateTime<Utc>,
    white: Participant,
    black: Participant,
    agent_side: Side,
    start_fen: Option<String>,
    moves: Vec<String>,
}

impl PendingRecord {
    pub fn new(
        white: Participant,
        black: Participant,
        agent_side: Side,
        start_fen: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            white,
            black,
            agent_side,
            start_fen,
            moves: Vec::new(),
        }
    }

    pub fn push_move(&mut self, uci: String) {
        self.moves.push(uci);
    }

    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    pub fn agent_side(&self) -> Side {
        self.agent_side
    }

    pub fn seal(self, result: GameResult, illegal_moves: BTreeMap<String, u32>) -> GameRecord {
        GameRecord {
            timestamp: self.timestamp,
            white: self.white,
            black: self.black,
            agent_side: self.agent_side,
            start_fen: self.start_fen,
            moves: self.moves,
            result,
            illegal_moves,
        }
    }
}

/// Finished game, as handed to the results sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    timestamp: DateTime<Utc>,
    white: Participant,
    black: Participant,
    agent_side: Side,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_fen: Option<String>,
    moves: Vec<String>,
    result: GameResult,
    illegal_moves: BTreeMap<String, u32>,
}

impl GameRecord {
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn white(&self) -> &Participant {
        &self.white
    }

    pub fn black(&self) -> &Participant {
        &self.black
    }

    pub fn participant(&self, side: Side) -> &Participant {
        match side {
            Side::White => &self.white,
            Side::Black => &self.black,
        }
    }

    pub fn agent_side(&self) -> Side {
        self.agent_side
    }

    pub fn start_fen(&self) -> Option<&str> {
        self.start_fen.as_deref()
    }

    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    pub fn result(&self) -> GameResult {
        self.result
    }

    pub fn illegal_moves(&self) -> &BTreeMap<String, u32> {
        &self.illegal_moves
    }

    /// Strikes for whoever played `side`.
    pub fn illegal_moves_for(&self, side: Side) -> u32 {
        self.illegal_moves
            .get(&self.participant(side).id())
            .copied()
            .unwrap_or(0)
    }
}
