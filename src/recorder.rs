//! JSONL sample logging and end-of-run session summaries.
//!
//! Each line of the sample log is one reading annotated with the verdict
//! in force at that moment. The log can be fed back through the replay
//! source. On shutdown a summary JSON with the behavior distribution is
//! written next to the log.

use crate::pipeline::types::{Behavior, Verdict};
use crate::sensor::Sample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Flush the buffered writer every this many records.
const FLUSH_EVERY: u64 = 256;

/// One annotated line in the sample log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRecord {
    pub timestamp: DateTime<Utc>,
    pub sample_number: u64,
    pub accel: [f64; 3],
    pub gyro: [f64; 3],
    pub accel_magnitude: f64,
    pub gyro_magnitude: f64,
    pub behavior: Option<Behavior>,
    pub confidence: f64,
}

/// End-of-run session summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started: DateTime<Utc>,
    pub ended: DateTime<Utc>,
    pub total_samples: u64,
    pub total_verdicts: u64,
    pub dominant_behavior: Option<Behavior>,
    pub average_confidence: f64,
    pub behavior_distribution: BTreeMap<String, u64>,
    pub sample_log: PathBuf,
}

/// Writes the sample log and accumulates the summary.
pub struct SampleRecorder {
    writer: BufWriter<File>,
    path: PathBuf,
    session_id: String,
    started: DateTime<Utc>,
    sample_count: u64,
    verdict_count: u64,
    class_counts: [u64; 4],
    confidence_sum: f64,
}

impl SampleRecorder {
    /// Create `session_<timestamp>.jsonl` under the data directory.
    pub fn create(dir: &Path) -> Result<Self, std::io::Error> {
        fs::create_dir_all(dir)?;
        let started = Utc::now();
        let path = dir.join(format!("session_{}.jsonl", started.format("%Y%m%d_%H%M%S")));
        let writer = BufWriter::new(File::create(&path)?);

        Ok(Self {
            writer,
            path,
            session_id: format!("SESS-{}", Uuid::new_v4()),
            started,
            sample_count: 0,
            verdict_count: 0,
            class_counts: [0; 4],
            confidence_sum: 0.0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Append one sample, annotated with the verdict in force.
    pub fn record(
        &mut self,
        sample: &Sample,
        verdict: Option<&Verdict>,
    ) -> Result<(), std::io::Error> {
        self.sample_count += 1;
        let record = SampleRecord {
            timestamp: sample.timestamp,
            sample_number: self.sample_count,
            accel: sample.accel,
            gyro: sample.gyro,
            accel_magnitude: sample.accel_magnitude(),
            gyro_magnitude: sample.gyro_magnitude(),
            behavior: verdict.and_then(|v| v.behavior),
            confidence: verdict.map(|v| v.confidence).unwrap_or(0.0),
        };
        let line = serde_json::to_string(&record).map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")?;
        if self.sample_count % FLUSH_EVERY == 0 {
            self.writer.flush()?;
        }
        Ok(())
    }

    /// Fold a fresh verdict into the summary tallies.
    pub fn note_verdict(&mut self, verdict: &Verdict) {
        self.verdict_count += 1;
        if let Some(behavior) = verdict.behavior {
            self.class_counts[behavior as usize] += 1;
            self.confidence_sum += verdict.confidence;
        }
    }

    /// Flush the log and write the summary JSON next to it.
    pub fn finish(mut self) -> Result<PathBuf, std::io::Error> {
        self.writer.flush()?;

        let classified: u64 = self.class_counts.iter().sum();
        let dominant_behavior = self
            .class_counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .max_by_key(|(_, count)| **count)
            .and_then(|(index, _)| Behavior::from_index(index));
        let average_confidence = if classified > 0 {
            self.confidence_sum / classified as f64
        } else {
            0.0
        };

        let mut behavior_distribution = BTreeMap::new();
        for (index, count) in self.class_counts.iter().enumerate() {
            if let Some(behavior) = Behavior::from_index(index) {
                behavior_distribution.insert(behavior.label().to_string(), *count);
            }
        }

        let summary = SessionSummary {
            session_id: self.session_id.clone(),
            started: self.started,
            ended: Utc::now(),
            total_samples: self.sample_count,
            total_verdicts: self.verdict_count,
            dominant_behavior,
            average_confidence,
            behavior_distribution,
            sample_log: self.path.clone(),
        };

        let summary_path = self.path.with_extension("summary.json");
        let json = serde_json::to_string_pretty(&summary).map_err(std::io::Error::other)?;
        fs::write(&summary_path, json)?;
        Ok(summary_path)
    }
}
