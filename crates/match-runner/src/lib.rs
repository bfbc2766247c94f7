//! Match runner: configuration, concrete move sources (Stockfish, LLM chat
//! APIs), fixture scheduling and results persistence.

pub mod config;
pub mod error;
pub mod llm;
pub mod prompts;
pub mod results;
pub mod runner;
pub mod stockfish;

pub use config::{ArenaConfig, DEFAULT_CONFIG_PATH};
pub use error::RunnerError;
pub use results::{JsonResultsSink, ResultsSink};
pub use runner::{build_fixtures, ArenaRoster, Fixture, MatchRunner, Roster, RunSummary};
