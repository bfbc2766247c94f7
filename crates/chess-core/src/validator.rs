//! Move legality gate and per-game illegal move counter

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::board::{Board, LegalMove};
use crate::error::IllegalMoveRejected;

/// Strikes counted per agent. Lives inside one game and is never shared.
#[derive(Debug, Clone, Default)]
pub struct IllegalMoveCounter {
    counts: HashMap<String, u32>,
}

impl IllegalMoveCounter {
    pub fn get(&self, agent: &str) -> u32 {
        self.counts.get(agent).copied().unwrap_or(0)
    }

    fn increment(&mut self, agent: &str) -> u32 {
        let count = self.counts.entry(agent.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    fn reset(&mut self, agent: &str) {
        self.counts.insert(agent.to_string(), 0);
    }

    /// Ordered copy for the game record.
    pub fn snapshot(&self) -> BTreeMap<String, u32> {
        self.counts
            .iter()
            .map(|(agent, count)| (agent.clone(), *count))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MoveValidator {
    counter: IllegalMoveCounter,
}

impl MoveValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate a raw proposal. A rejection costs the agent exactly one strike.
    pub fn validate(
        &mut self,
        board: &Board,
        raw: &str,
        agent: &str,
    ) -> Result<LegalMove, IllegalMoveRejected> {
        let proposal = normalize_proposal(raw);

        match board.parse_san(&proposal) {
            Ok(mv) => Ok(mv),
            Err(reason) => {
                debug!(agent, %reason, "Proposal rejected");
                let strikes = self.counter.increment(agent);
                Err(IllegalMoveRejected {
                    agent: agent.to_string(),
                    proposal,
                    strikes,
                })
            }
        }
    }

    pub fn get_count(&self, agent: &str) -> u32 {
        self.counter.get(agent)
    }

    pub fn reset(&mut self, agent: &str) {
        self.counter.reset(agent);
    }

    pub fn counter(&self) -> &IllegalMoveCounter {
        &self.counter
    }
}

fn move_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\s*\.+\s*").expect("move number pattern"))
}

fn hyphenated_squares_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([NBRQK]?[a-h][1-8])-([a-h][1-8])").expect("hyphenated move pattern")
    })
}

fn bare_promotion_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([a-h][18])=?([QRBNqrbn])([+#]?)$").expect("promotion pattern")
    })
}

/// Trim whitespace, wrapping quotes/backticks, a leading move number
/// ("12." or "12...") and a trailing period, then rewrite the loose
/// notations models tend to use: `0-0`/`0-0-0` castling, `e2-e4` and
/// promotion without `=` (`e8Q`).
pub fn normalize_proposal(raw: &str) -> String {
    let text = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim();
    let text = move_number_re().replace(text, "");
    let text = text.trim().trim_end_matches('.').trim();

    let text = if let Some(rest) = text.strip_prefix("0-0-0") {
        format!("O-O-O{rest}")
    } else if let Some(rest) = text.strip_prefix("0-0") {
        format!("O-O{rest}")
    } else {
        text.to_string()
    };

    let text = hyphenated_squares_re().replace(&text, "${1}${2}");
    bare_promotion_re()
        .replace(&text, |caps: &regex::Captures| {
            format!(
                "{}={}{}",
                &caps[1],
                caps[2].to_ascii_uppercase(),
                &caps[3]
            )
        })
        .into_owned()
}
