//! Runner error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stockfish error: {0}")]
    Stockfish(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Game setup error: {0}")]
    Setup(#[from] chess_core::CoreError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
