#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chess_core::{
    ControllerConfig, GameSetup, MoveSource, Participant, PositionView, Side, SourceError,
    TurnController,
};

/// Observations a test can make about a source after it was boxed away.
#[derive(Clone, Default)]
pub struct Tracker {
    pub requests: Arc<AtomicUsize>,
    pub released: Arc<AtomicBool>,
}

impl Tracker {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Plays a fixed list of proposals, then fails with `NoMove`.
pub struct Scripted {
    name: String,
    moves: VecDeque<String>,
    tracker: Tracker,
}

impl Scripted {
    pub fn new(name: &str, moves: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            moves: moves.iter().map(|m| m.to_string()).collect(),
            tracker: Tracker::default(),
        }
    }

    pub fn tracker(&self) -> Tracker {
        self.tracker.clone()
    }
}

#[async_trait]
impl MoveSource for Scripted {
    fn participant(&self) -> Participant {
        Participant::Model {
            model: self.name.clone(),
            provider: "script".to_string(),
        }
    }

    async fn propose_move(
        &mut self,
        _position: &PositionView,
        _history: &str,
        _side: Side,
    ) -> Result<String, SourceError> {
        self.tracker.requests.fetch_add(1, Ordering::SeqCst);
        self.moves
            .pop_front()
            .ok_or_else(|| SourceError::NoMove(format!("{} ran out of moves", self.name)))
    }

    async fn shutdown(&mut self) {
        self.tracker.released.store(true, Ordering::SeqCst);
    }
}

/// Fails every request, like an unreachable API.
pub struct Failing {
    pub name: String,
    pub tracker: Tracker,
}

impl Failing {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tracker: Tracker::default(),
        }
    }
}

#[async_trait]
impl MoveSource for Failing {
    fn participant(&self) -> Participant {
        Participant::Model {
            model: self.name.clone(),
            provider: "script".to_string(),
        }
    }

    async fn propose_move(
        &mut self,
        _position: &PositionView,
        _history: &str,
        _side: Side,
    ) -> Result<String, SourceError> {
        self.tracker.requests.fetch_add(1, Ordering::SeqCst);
        Err(SourceError::Unavailable("connection refused".to_string()))
    }

    async fn shutdown(&mut self) {
        self.tracker.released.store(true, Ordering::SeqCst);
    }
}

/// Waits `delay` before every answer.
pub struct Slow {
    pub inner: Scripted,
    pub delay: Duration,
}

#[async_trait]
impl MoveSource for Slow {
    fn participant(&self) -> Participant {
        self.inner.participant()
    }

    async fn propose_move(
        &mut self,
        position: &PositionView,
        history: &str,
        side: Side,
    ) -> Result<String, SourceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.propose_move(position, history, side).await
    }

    async fn shutdown(&mut self) {
        self.inner.shutdown().await;
    }
}

pub fn game(white: impl MoveSource + 'static, black: impl MoveSource + 'static) -> TurnController {
    game_from(None, white, black)
}

pub fn game_from(
    fen: Option<&str>,
    white: impl MoveSource + 'static,
    black: impl MoveSource + 'static,
) -> TurnController {
    let setup = GameSetup {
        agent_side: Side::White,
        start_fen: fen.map(str::to_string),
    };
    TurnController::new(setup, Box::new(white), Box::new(black), ControllerConfig::default())
        .expect("valid game setup")
}
