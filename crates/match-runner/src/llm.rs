//! Language-model players over the providers' HTTP chat APIs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chess_core::{MoveSource, Participant, PositionView, Side, SourceError};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{ProviderConfig, RateLimitConfig};
use crate::error::RunnerError;
use crate::prompts::{system_prompt, user_prompt};

const TEMPERATURE: f64 = 0.3;

/// A move is a handful of tokens; anything longer is not a move.
const MAX_TOKENS: u32 = 10;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Length of a rate-limit window.
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Budget for one HTTP request to a provider.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "cohere")]
    Cohere,
}

impl ProviderKind {
    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Cohere => "cohere",
        }
    }

    pub fn api_key_var(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::Cohere => "COHERE_API_KEY",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com",
            ProviderKind::Anthropic => "https://api.anthropic.com",
            ProviderKind::Cohere => "https://api.cohere.com",
        }
    }

    fn endpoint(self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            ProviderKind::OpenAi => format!("{base}/v1/chat/completions"),
            ProviderKind::Anthropic => format!("{base}/v1/messages"),
            ProviderKind::Cohere => format!("{base}/v1/chat"),
        }
    }

    fn request_body(self, model: &str, system: &str, user: &str) -> Value {
        match self {
            ProviderKind::OpenAi => json!({
                "model": model,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": user },
                ],
                "temperature": TEMPERATURE,
                "max_tokens": MAX_TOKENS,
            }),
            ProviderKind::Anthropic => json!({
                "model": model,
                "system": system,
                "messages": [{ "role": "user", "content": user }],
                "temperature": TEMPERATURE,
                "max_tokens": MAX_TOKENS,
            }),
            ProviderKind::Cohere => json!({
                "model": model,
                "preamble": system,
                "message": user,
                "temperature": TEMPERATURE,
                "max_tokens": MAX_TOKENS,
            }),
        }
    }

    fn extract_text(self, body: &Value) -> Option<String> {
        let text = match self {
            ProviderKind::OpenAi => body
                .get("choices")?
                .get(0)?
                .get("message")?
                .get("content")?
                .as_str()?,
            ProviderKind::Anthropic => body.get("content")?.get(0)?.get("text")?.as_str()?,
            ProviderKind::Cohere => body.get("text")?.as_str()?,
        };
        Some(text.trim().to_string())
    }
}

/// Fixed-window request budget per provider. When the window's budget is
/// spent the caller sits out `retry_after` and starts a fresh window.
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_minute: u32,
    retry_after: Duration,
    window_start: Option<Instant>,
    used: u32,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            requests_per_minute: config.requests_per_minute.max(1),
            retry_after: Duration::from_secs(config.retry_after_secs),
            window_start: None,
            used: 0,
        }
    }

    /// Take one request slot at `now`; returns how long to wait before sending.
    pub fn reserve(&mut self, now: Instant) -> Option<Duration> {
        let expired = self
            .window_start
            .map_or(true, |start| now.saturating_duration_since(start) >= RATE_WINDOW);
        if expired {
            self.window_start = Some(now);
            self.used = 0;
        }

        let wait = if self.used >= self.requests_per_minute {
            self.window_start = Some(now + self.retry_after);
            self.used = 0;
            Some(self.retry_after)
        } else {
            None
        };
        self.used += 1;
        wait
    }

    /// Take `slots` request slots at `now`; returns the total wait before
    /// the last of them may be sent.
    pub fn reserve_many(&mut self, now: Instant, slots: u32) -> Option<Duration> {
        let mut total = Duration::ZERO;
        for _ in 0..slots {
            if let Some(wait) = self.reserve(now + total) {
                total += wait;
            }
        }
        (!total.is_zero()).then_some(total)
    }

    /// Hand back slots that were reserved but never used.
    pub fn release(&mut self, slots: u32) {
        self.used = self.used.saturating_sub(slots);
    }
}

/// HTTP client for one provider, shared by every player of that provider.
pub struct LlmClient {
    http: Client,
    kind: ProviderKind,
    endpoint: String,
    api_key: String,
    limiter: Mutex<RateLimiter>,
}

impl LlmClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, RunnerError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            RunnerError::Config(format!(
                "{} is not set for provider {}",
                config.provider.api_key_var(),
                config.provider.name()
            ))
        })?;
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(config.provider.default_base_url());

        let http = Client::builder()
            .user_agent("ChessArena/1.0")
            .timeout(HTTP_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            kind: config.provider,
            endpoint: config.provider.endpoint(base_url),
            api_key,
            limiter: Mutex::new(RateLimiter::new(&config.rate_limit)),
        })
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Block until the provider's rate budget allows `slots` more requests.
    pub async fn wait_for_slots(&self, slots: u32) {
        let wait = self
            .limiter
            .lock()
            .await
            .reserve_many(Instant::now(), slots);
        if let Some(wait) = wait {
            warn!(
                provider = self.kind.name(),
                secs = wait.as_secs(),
                "Rate limit reached, waiting"
            );
            tokio::time::sleep(wait).await;
        }
    }

    pub async fn release_slots(&self, slots: u32) {
        if slots > 0 {
            self.limiter.lock().await.release(slots);
        }
    }

    /// One chat completion; returns the trimmed reply text.
    pub async fn complete(&self, model: &str, system: &str, user: &str) -> Result<String, RunnerError> {
        let body = self.kind.request_body(model, system, user);
        let request = self.http.post(&self.endpoint).json(&body);
        let request = match self.kind {
            ProviderKind::Anthropic => request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            ProviderKind::OpenAi | ProviderKind::Cohere => request.bearer_auth(&self.api_key),
        };

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(RunnerError::Llm(format!("HTTP {status}: {detail}")));
        }

        let value: Value = resp.json().await?;
        self.kind
            .extract_text(&value)
            .ok_or_else(|| RunnerError::Llm(format!("No text in {} response", self.kind.name())))
    }
}

/// A model playing one side of a game.
#[derive(Clone)]
pub struct LlmPlayer {
    client: Arc<LlmClient>,
    model: String,
    system: Arc<str>,
    attempts: u32,
    /// Slots taken by `ready` for the next request
    reserved: u32,
}

impl LlmPlayer {
    pub fn new(client: Arc<LlmClient>, model: &str, max_illegal_moves: u32, attempts: u32) -> Self {
        info!(provider = client.kind().name(), model, "Initialized model");
        Self {
            client,
            model: model.to_string(),
            system: system_prompt(max_illegal_moves).into(),
            attempts: attempts.max(1),
            reserved: 0,
        }
    }
}

#[async_trait]
impl MoveSource for LlmPlayer {
    fn participant(&self) -> Participant {
        Participant::Model {
            model: self.model.clone(),
            provider: self.client.kind().name().to_string(),
        }
    }

    /// Every attempt the next request may make is paid for here, so no
    /// rate-limit wait runs inside the timed request.
    async fn ready(&mut self) {
        self.client.wait_for_slots(self.attempts).await;
        self.reserved = self.attempts;
    }

    async fn propose_move(
        &mut self,
        position: &PositionView,
        history: &str,
        side: Side,
    ) -> Result<String, SourceError> {
        let prompt = user_prompt(position, history, side);
        debug!(model = %self.model, %prompt, "Requesting move");

        let reserved = std::mem::take(&mut self.reserved);
        let mut last_error = String::new();
        for attempt in 1..=self.attempts {
            match self.client.complete(&self.model, &self.system, &prompt).await {
                Ok(text) => {
                    info!(model = %self.model, proposal = %text, "Model suggested move");
                    self.client
                        .release_slots(reserved.saturating_sub(attempt))
                        .await;
                    return Ok(text);
                }
                Err(e) => {
                    warn!(model = %self.model, attempt, error = %e, "Move request failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(SourceError::Unavailable(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rpm: u32, retry_after_secs: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            requests_per_minute: rpm,
            retry_after_secs,
        })
    }

    #[test]
    fn test_rate_limiter_window() {
        let mut rl = limiter(2, 5);
        let t0 = Instant::now();
        assert_eq!(rl.reserve(t0), None);
        assert_eq!(rl.reserve(t0), None);
        assert_eq!(rl.reserve(t0), Some(Duration::from_secs(5)));
        // The slot taken after the wait counts against the new window
        assert_eq!(rl.reserve(t0 + Duration::from_secs(5)), None);
        assert_eq!(rl.reserve(t0 + Duration::from_secs(6)), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_rate_limiter_resets_after_a_minute() {
        let mut rl = limiter(1, 30);
        let t0 = Instant::now();
        assert_eq!(rl.reserve(t0), None);
        assert_eq!(rl.reserve(t0 + Duration::from_secs(61)), None);
    }

    #[test]
    fn test_reserve_many_adds_up_waits() {
        let mut rl = limiter(1, 200);
        let t0 = Instant::now();
        assert_eq!(rl.reserve_many(t0, 2), Some(Duration::from_secs(200)));

        let mut rl = limiter(5, 30);
        assert_eq!(rl.reserve_many(t0, 3), None);
        assert_eq!(rl.reserve_many(t0, 3), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_release_returns_unused_slots() {
        let mut rl = limiter(2, 30);
        let t0 = Instant::now();
        assert_eq!(rl.reserve_many(t0, 2), None);
        rl.release(1);
        assert_eq!(rl.reserve(t0), None);
        assert_eq!(rl.reserve(t0), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_request_bodies() {
        let body = ProviderKind::OpenAi.request_body("gpt-4o", "sys", "usr");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "usr");
        assert_eq!(body["max_tokens"], 10);

        let body = ProviderKind::Anthropic.request_body("claude", "sys", "usr");
        assert_eq!(body["system"], "sys");
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));

        let body = ProviderKind::Cohere.request_body("command-r", "sys", "usr");
        assert_eq!(body["preamble"], "sys");
        assert_eq!(body["message"], "usr");
    }

    #[test]
    fn test_extract_text() {
        let openai = json!({ "choices": [{ "message": { "content": " e4\n" } }] });
        assert_eq!(ProviderKind::OpenAi.extract_text(&openai), Some("e4".to_string()));

        let anthropic = json!({ "content": [{ "type": "text", "text": "Nf3" }] });
        assert_eq!(
            ProviderKind::Anthropic.extract_text(&anthropic),
            Some("Nf3".to_string())
        );

        let cohere = json!({ "text": "d4" });
        assert_eq!(ProviderKind::Cohere.extract_text(&cohere), Some("d4".to_string()));

        assert_eq!(ProviderKind::OpenAi.extract_text(&json!({})), None);
    }

    #[test]
    fn test_endpoint_trims_slash() {
        assert_eq!(
            ProviderKind::OpenAi.endpoint("http://localhost:8080/"),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_client_requires_key() {
        let config: ProviderConfig = toml::from_str("provider = \"cohere\"\nenabled = true").unwrap();
        assert!(matches!(LlmClient::new(&config), Err(RunnerError::Config(_))));
    }
}
