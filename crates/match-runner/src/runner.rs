//! Fixture scheduling: which games get played, and running them with bounded concurrency

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chess_core::{GameOutcome, GameSetup, MoveSource, Side, TurnController};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{ArenaConfig, EngineConfig, GameConfig};
use crate::error::RunnerError;
use crate::llm::{LlmClient, LlmPlayer};
use crate::results::ResultsSink;
use crate::stockfish::EngineSource;

/// One scheduled game. Model indices point into the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fixture {
    ModelVsEngine { model: usize, skill_level: u8, game: u32 },
    ModelVsModel { first: usize, second: usize, game: u32 },
}

/// Every model against every skill level, then every unordered model pair.
pub fn build_fixtures(model_count: usize, skill_levels: &[u8], game: &GameConfig) -> Vec<Fixture> {
    let mut fixtures = Vec::new();

    for model in 0..model_count {
        for &skill_level in skill_levels {
            for n in 0..game.num_games_per_skill_level {
                fixtures.push(Fixture::ModelVsEngine {
                    model,
                    skill_level,
                    game: n,
                });
            }
        }
    }

    for first in 0..model_count {
        for second in first + 1..model_count {
            for n in 0..game.num_llm_vs_llm_games {
                fixtures.push(Fixture::ModelVsModel {
                    first,
                    second,
                    game: n,
                });
            }
        }
    }

    fixtures
}

/// Hands out fresh move sources for each fixture.
#[async_trait]
pub trait Roster: Send + Sync {
    fn model_count(&self) -> usize;

    fn model(&self, index: usize) -> Option<Box<dyn MoveSource>>;

    /// A dedicated engine for one game.
    async fn engine(&self, skill_level: u8) -> Result<Box<dyn MoveSource>, RunnerError>;
}

/// The configured LLM players plus the Stockfish binary.
pub struct ArenaRoster {
    players: Vec<LlmPlayer>,
    engine: EngineConfig,
}

impl ArenaRoster {
    pub fn from_config(config: &ArenaConfig) -> Result<Self, RunnerError> {
        let mut players = Vec::new();
        for (label, provider) in config.active_providers() {
            let client = Arc::new(LlmClient::new(provider)?);
            for model in &provider.models {
                players.push(LlmPlayer::new(
                    client.clone(),
                    &model.name,
                    config.game.max_illegal_moves,
                    provider.request_attempts,
                ));
            }
            info!(provider = %label, models = provider.models.len(), "Provider enabled");
        }

        Ok(Self {
            players,
            engine: config.engine.clone(),
        })
    }
}

#[async_trait]
impl Roster for ArenaRoster {
    fn model_count(&self) -> usize {
        self.players.len()
    }

    fn model(&self, index: usize) -> Option<Box<dyn MoveSource>> {
        self.players
            .get(index)
            .map(|p| Box::new(p.clone()) as Box<dyn MoveSource>)
    }

    async fn engine(&self, skill_level: u8) -> Result<Box<dyn MoveSource>, RunnerError> {
        let source = EngineSource::spawn(
            &self.engine.path,
            &self.engine.name,
            skill_level,
            Duration::from_millis(self.engine.move_time_ms),
        )
        .await?;
        Ok(Box::new(source))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub abandoned: usize,
    pub failed: usize,
}

pub struct MatchRunner {
    roster: Arc<dyn Roster>,
    game: GameConfig,
    skill_levels: Vec<u8>,
}

impl MatchRunner {
    pub fn new(roster: Arc<dyn Roster>, game: GameConfig, skill_levels: Vec<u8>) -> Self {
        Self {
            roster,
            game,
            skill_levels,
        }
    }

    pub fn fixtures(&self) -> Vec<Fixture> {
        build_fixtures(self.roster.model_count(), &self.skill_levels, &self.game)
    }

    /// Play every fixture, at most `max_concurrent_games` at a time. Sealed
    /// records go to `sink` as each game finishes. Once `shutdown` is set no
    /// new game starts and running ones stop at their next turn boundary.
    pub async fn run(
        &self,
        sink: &mut dyn ResultsSink,
        shutdown: watch::Receiver<bool>,
    ) -> Result<RunSummary, RunnerError> {
        let fixtures = self.fixtures();
        info!(
            fixtures = fixtures.len(),
            concurrency = self.game.max_concurrent_games,
            "Starting run"
        );

        let mut pending = fixtures.into_iter();
        let mut running = JoinSet::new();
        let mut summary = RunSummary::default();

        loop {
            while running.len() < self.game.max_concurrent_games.max(1) && !*shutdown.borrow() {
                let Some(fixture) = pending.next() else {
                    break;
                };
                let roster = self.roster.clone();
                let game = self.game.clone();
                let shutdown = shutdown.clone();
                running.spawn(async move {
                    let outcome = play_fixture(roster.as_ref(), fixture, &game, shutdown).await;
                    (fixture, outcome)
                });
            }

            let Some(joined) = running.join_next().await else {
                break;
            };

            match joined {
                Ok((_, Ok(GameOutcome::Sealed(record)))) => {
                    sink.accept(record)?;
                    summary.completed += 1;
                }
                Ok((fixture, Ok(GameOutcome::Abandoned { moves_played }))) => {
                    warn!(?fixture, moves_played, "Game abandoned, not recorded");
                    summary.abandoned += 1;
                }
                Ok((fixture, Err(e))) => {
                    error!(?fixture, error = %e, "Game could not be set up");
                    summary.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "Game task panicked");
                    summary.failed += 1;
                }
            }
        }

        info!(
            completed = summary.completed,
            abandoned = summary.abandoned,
            failed = summary.failed,
            "Run finished"
        );
        Ok(summary)
    }
}

async fn play_fixture(
    roster: &dyn Roster,
    fixture: Fixture,
    game: &GameConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<GameOutcome, RunnerError> {
    let missing = |index: usize| RunnerError::Config(format!("No model at roster index {index}"));

    let (white, black, agent_side) = match fixture {
        Fixture::ModelVsEngine {
            model, skill_level, ..
        } => {
            let llm = roster.model(model).ok_or_else(|| missing(model))?;
            let engine = roster.engine(skill_level).await?;
            if game.llm_plays_white {
                (llm, engine, Side::White)
            } else {
                (engine, llm, Side::Black)
            }
        }
        Fixture::ModelVsModel {
            first,
            second,
            game: n,
        } => {
            let a = roster.model(first).ok_or_else(|| missing(first))?;
            let b = roster.model(second).ok_or_else(|| missing(second))?;
            // Colours alternate between repeat games of a pairing
            if n % 2 == 0 {
                (a, b, Side::White)
            } else {
                (b, a, Side::White)
            }
        }
    };

    let setup = GameSetup {
        agent_side,
        start_fen: game.start_fen.clone(),
    };
    let controller = TurnController::new(setup, white, black, game.controller_config())?;
    Ok(controller.play_until(shutdown).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_counts() {
        let game = GameConfig {
            num_games_per_skill_level: 2,
            num_llm_vs_llm_games: 3,
            ..GameConfig::default()
        };
        let fixtures = build_fixtures(3, &[1, 5, 10], &game);

        let vs_engine = fixtures
            .iter()
            .filter(|f| matches!(f, Fixture::ModelVsEngine { .. }))
            .count();
        let vs_model = fixtures.len() - vs_engine;
        // 3 models x 3 levels x 2 games; 3 unordered pairs x 3 games
        assert_eq!(vs_engine, 18);
        assert_eq!(vs_model, 9);
        assert!(fixtures.iter().all(|f| match f {
            Fixture::ModelVsModel { first, second, .. } => first < second,
            _ => true,
        }));
    }

    #[test]
    fn test_single_model_has_no_pairings() {
        let fixtures = build_fixtures(1, &[], &GameConfig::default());
        assert!(fixtures.is_empty());
    }
}
