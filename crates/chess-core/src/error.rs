//! Error types for game adjudication

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid FEN '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },

    #[error("Both sides are played by the same agent: {0}")]
    DuplicateAgent(String),
}

/// A proposal that did not resolve to a legal move.
///
/// Malformed notation and well-formed but illegal moves look the same here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Illegal move by {agent}: '{proposal}' (strike {strikes})")]
pub struct IllegalMoveRejected {
    pub agent: String,
    pub proposal: String,
    pub strikes: u32,
}

/// A move source could not produce any proposal at all.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("No move produced: {0}")]
    NoMove(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Source returned the failure sentinel")]
    Sentinel,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot render move {ply} ('{uci}') in history")]
pub struct HistoryRenderError {
    pub ply: usize,
    pub uci: String,
}

/// Why a notation string failed to resolve against a position.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotationError {
    #[error("malformed notation: {0}")]
    Malformed(String),

    #[error("no legal move matches: {0}")]
    Unresolved(String),
}
