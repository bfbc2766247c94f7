//! Arena configuration from a TOML match file plus environment overrides

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chess_core::{ControllerConfig, DEFAULT_MOVE_TIMEOUT};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::RunnerError;
use crate::llm::{ProviderKind, HTTP_TIMEOUT};

pub const DEFAULT_CONFIG_PATH: &str = "config/arena.toml";

/// Stockfish accepts "Skill Level" 0..=20.
const MAX_SKILL_LEVEL: u8 = 20;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub engine: EngineConfig,
    pub game: GameConfig,
    /// Keyed by a free-form label, e.g. `[providers.openai]`
    pub providers: BTreeMap<String, ProviderConfig>,
    pub results: ResultsConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name used in participant ids ("stockfish-skill-5")
    pub name: String,

    /// Path to the UCI engine binary
    pub path: String,

    pub skill_levels: Vec<u8>,

    /// Thinking time per engine move
    pub move_time_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "stockfish".to_string(),
            path: "/usr/local/bin/stockfish".to_string(),
            skill_levels: vec![1, 5, 10],
            move_time_ms: 100,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub num_games_per_skill_level: u32,
    pub num_llm_vs_llm_games: u32,

    /// Strikes before a forfeit
    pub max_illegal_moves: u32,

    /// Budget for one proposal request, rate-limit waits excluded
    pub move_timeout_secs: u64,

    pub max_concurrent_games: usize,

    /// Side the LLM takes against the engine
    pub llm_plays_white: bool,

    /// Optional custom start position for every game
    pub start_fen: Option<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            num_games_per_skill_level: 1,
            num_llm_vs_llm_games: 1,
            max_illegal_moves: chess_core::DEFAULT_MAX_ILLEGAL_MOVES,
            move_timeout_secs: DEFAULT_MOVE_TIMEOUT.as_secs(),
            max_concurrent_games: 1,
            llm_plays_white: true,
            start_fen: None,
        }
    }
}

impl GameConfig {
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            max_illegal_moves: self.max_illegal_moves,
            move_timeout: Duration::from_secs(self.move_timeout_secs),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProviderConfig {
    pub provider: ProviderKind,

    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub models: Vec<ModelConfig>,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Override for self-hosted or proxy endpoints
    #[serde(default)]
    pub base_url: Option<String>,

    /// Attempts per move request before the source gives up
    #[serde(default = "default_request_attempts")]
    pub request_attempts: u32,

    /// Filled from the environment, never from the file
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_request_attempts() -> u32 {
    2
}

#[derive(Clone, Debug, Deserialize)]
pub struct ModelConfig {
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub retry_after_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 50,
            retry_after_secs: 60,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ResultsConfig {
    pub output_dir: PathBuf,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("results"),
        }
    }
}

impl ArenaConfig {
    /// Load the match file, then apply environment overrides and API keys.
    pub fn load(path: &Path) -> Result<Self, RunnerError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RunnerError::Config(format!("Cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env();
        config.validate()?;
        info!(path = %path.display(), providers = config.providers.len(), "Arena config loaded");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, RunnerError> {
        Ok(toml::from_str(text)?)
    }

    fn apply_env(&mut self) {
        if let Ok(path) = env::var("STOCKFISH_PATH") {
            self.engine.path = path;
        }

        if let Ok(dir) = env::var("RESULTS_DIR") {
            self.results.output_dir = PathBuf::from(dir);
        }

        if let Some(n) = env::var("MAX_CONCURRENT_GAMES")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.game.max_concurrent_games = n;
        }

        for (label, provider) in self.providers.iter_mut() {
            let var = provider.provider.api_key_var();
            provider.api_key = env::var(var).ok().filter(|k| !k.trim().is_empty());
            if provider.enabled && provider.api_key.is_none() {
                warn!(provider = %label, var, "API key not set, provider will be skipped");
            }
        }
    }

    pub fn validate(&self) -> Result<(), RunnerError> {
        if let Some(level) = self
            .engine
            .skill_levels
            .iter()
            .find(|&&l| l > MAX_SKILL_LEVEL)
        {
            return Err(RunnerError::Config(format!(
                "Skill level {level} out of range 0..={MAX_SKILL_LEVEL}"
            )));
        }
        if self.game.max_concurrent_games == 0 {
            return Err(RunnerError::Config(
                "max_concurrent_games must be at least 1".to_string(),
            ));
        }
        if self.game.max_illegal_moves == 0 {
            return Err(RunnerError::Config(
                "max_illegal_moves must be at least 1".to_string(),
            ));
        }
        if self.game.move_timeout_secs == 0 {
            return Err(RunnerError::Config(
                "move_timeout_secs must be at least 1".to_string(),
            ));
        }
        for (label, provider) in self.providers.iter().filter(|(_, p)| p.enabled) {
            let worst_case = HTTP_TIMEOUT.as_secs() * u64::from(provider.request_attempts.max(1));
            if worst_case >= self.game.move_timeout_secs {
                return Err(RunnerError::Config(format!(
                    "move_timeout_secs ({}) must exceed {} request attempts of {}s for provider {label}",
                    self.game.move_timeout_secs,
                    provider.request_attempts,
                    HTTP_TIMEOUT.as_secs()
                )));
            }
        }
        if let Some(fen) = &self.game.start_fen {
            chess_core::Board::from_fen(fen)?;
        }
        Ok(())
    }

    /// Providers that are enabled and have a key.
    pub fn active_providers(&self) -> impl Iterator<Item = (&String, &ProviderConfig)> {
        self.providers
            .iter()
            .filter(|(_, p)| p.enabled && p.api_key.is_some())
    }
}
