//! Chess arena
//!
//! Plays language models against Stockfish and against each other, with a
//! strike budget for illegal moves, and writes every finished game to JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use match_runner::{
    ArenaConfig, ArenaRoster, JsonResultsSink, MatchRunner, ResultsSink, DEFAULT_CONFIG_PATH,
};
use tokio::sync::watch;
use tracing::{info, warn};

/// Parse --config <path> from CLI args
fn parse_config_path() -> PathBuf {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load .env file for API keys and local paths
    let _ = dotenvy::dotenv();

    let config_path = parse_config_path();
    let config = ArenaConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    info!(path = %config.engine.path, "Looking for Stockfish");
    if !std::path::Path::new(&config.engine.path).exists() {
        anyhow::bail!(
            "Stockfish not found at {} (set STOCKFISH_PATH or engine.path)",
            config.engine.path
        );
    }

    let roster = ArenaRoster::from_config(&config)?;
    let runner = MatchRunner::new(
        Arc::new(roster),
        config.game.clone(),
        config.engine.skill_levels.clone(),
    );
    if runner.fixtures().is_empty() {
        warn!("No games to play: enable at least one provider with an API key");
        return Ok(());
    }

    let mut sink = JsonResultsSink::create(&config.results.output_dir)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after the current turn");
            let _ = shutdown_tx.send(true);
        }
    });

    let summary = runner.run(&mut sink, shutdown_rx).await?;

    println!(
        "Completed {}, abandoned {}, failed {}. {} records in {}",
        summary.completed,
        summary.abandoned,
        summary.failed,
        sink.records().len(),
        sink.path().display()
    );
    Ok(())
}
