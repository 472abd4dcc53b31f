use crate::errors::MlHelperResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct Metrics {
    #[serde(skip)]
    start_time: Instant,
    pub rows_read: usize,
    pub rows_train: usize,
    pub rows_test: usize,
    pub phase_durations_ms: BTreeMap<String, u64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            rows_read: 0,
            rows_train: 0,
            rows_test: 0,
            phase_durations_ms: BTreeMap::new(),
        }
    }

    pub fn record_phase(&mut self, phase: &str, duration: Duration) {
        self.phase_durations_ms
            .insert(phase.to_string(), duration.as_millis() as u64);
    }

    pub fn total_duration(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Held-out scores of a trained classifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evaluation {
    pub rows: usize,
    pub accuracy: f64,
    pub log_loss: f64,
}

impl Evaluation {
    /// `true_probs[i]` is the probability given to row i's actual class.
    pub fn from_scores(correct: usize, true_probs: &[f64]) -> Self {
        let rows = true_probs.len();
        let eps = 1e-15;
        let loss: f64 = true_probs
            .iter()
            .map(|p| -p.clamp(eps, 1.0 - eps).ln())
            .sum();
        Self {
            rows,
            accuracy: correct as f64 / rows as f64,
            log_loss: loss / rows as f64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InputFileStats {
    pub path: String,
    pub hash: String, // SHA256 hex
    pub size_bytes: u64,
}

impl InputFileStats {
    pub fn from_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        Ok(Self {
            path: path.display().to_string(),
            hash: compute_file_hash(path)?,
            size_bytes: std::fs::metadata(path)?.len(),
        })
    }
}

pub fn compute_file_hash<P: AsRef<Path>>(path: P) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0; 8192];

    loop {
        let count = file.read(&mut buffer)?;
        if count == 0 {
            break;
        }
        hasher.update(&buffer[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Summary of one training run, written next to the model artifact.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub input: InputFileStats,
    pub algorithm: String,
    pub classes: Vec<String>,
    pub metrics: Metrics,
    pub total_duration_ms: u64,
    pub evaluation: Option<Evaluation>,
    pub outputs: Vec<String>,
}

impl RunReport {
    pub fn write<P: AsRef<Path>>(&self, path: P) -> MlHelperResult<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}
