//! Results storage: sealed game records persisted as a JSON array

use std::path::{Path, PathBuf};

use chess_core::{GameRecord, Side};
use chrono::Local;
use tracing::{debug, info};

use crate::error::RunnerError;

/// Destination for sealed game records.
pub trait ResultsSink: Send {
    fn accept(&mut self, record: GameRecord) -> Result<(), RunnerError>;

    fn records(&self) -> &[GameRecord];
}

/// Writes `chess_results_<YYYYmmdd_HHMMSS>.json`, rewritten in full after
/// every accepted record.
pub struct JsonResultsSink {
    path: PathBuf,
    records: Vec<GameRecord>,
}

impl JsonResultsSink {
    pub fn create(output_dir: &Path) -> Result<Self, RunnerError> {
        std::fs::create_dir_all(output_dir)?;
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = output_dir.join(format!("chess_results_{timestamp}.json"));
        info!(path = %path.display(), "Writing results");
        Ok(Self {
            path,
            records: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<(), RunnerError> {
        let json = serde_json::to_string_pretty(&self.records)?;
        std::fs::write(&self.path, json)?;
        debug!(records = self.records.len(), "Results saved");
        Ok(())
    }

    /// Load a results file written by this sink.
    pub fn load(path: &Path) -> Result<Vec<GameRecord>, RunnerError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl ResultsSink for JsonResultsSink {
    fn accept(&mut self, record: GameRecord) -> Result<(), RunnerError> {
        info!("{}", summary_line(&record));
        self.records.push(record);
        self.save()
    }

    fn records(&self) -> &[GameRecord] {
        &self.records
    }
}

/// One console line per game: players, result, move count, strikes.
pub fn summary_line(record: &GameRecord) -> String {
    format!(
        "{} vs {}: {} after {} plies (illegal moves: white {}, black {})",
        record.white().id(),
        record.black().id(),
        record.result(),
        record.moves().len(),
        record.illegal_moves_for(Side::White),
        record.illegal_moves_for(Side::Black),
    )
}
