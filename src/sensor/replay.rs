//! Replay of a recorded JSONL sample log.

use crate::sensor::types::Sample;
use crate::sensor::{ReadError, SampleSource};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

/// The subset of a recorded line the replay needs. Annotation fields
/// written by the recorder are ignored.
#[derive(Debug, Deserialize)]
struct ReplayRecord {
    timestamp: DateTime<Utc>,
    accel: [f64; 3],
    gyro: [f64; 3],
}

/// Plays back a sample log produced by an earlier run.
///
/// Recorded timestamps are preserved, so gap and regression handling in
/// the window buffer behaves exactly as it did live.
pub struct ReplaySource {
    lines: Lines<BufReader<File>>,
    path: PathBuf,
    line_number: u64,
}

impl ReplaySource {
    /// Open a JSONL sample log for replay.
    pub fn open(path: &Path) -> Result<Self, ReadError> {
        let file = File::open(path)
            .map_err(|e| ReadError::Bus(format!("open {}: {e}", path.display())))?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            path: path.to_path_buf(),
            line_number: 0,
        })
    }
}

impl SampleSource for ReplaySource {
    fn describe(&self) -> String {
        format!("replay of {}", self.path.display())
    }

    fn read(&mut self) -> Result<Sample, ReadError> {
        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => return Err(ReadError::Bus(e.to_string())),
                None => return Err(ReadError::EndOfStream),
            };
            self.line_number += 1;

            if line.trim().is_empty() {
                continue;
            }

            let record: ReplayRecord = serde_json::from_str(&line).map_err(|e| {
                ReadError::Malformed(format!("line {}: {e}", self.line_number))
            })?;
            return Ok(Sample::at(record.timestamp, record.accel, record.gyro));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_replay_round_trip() {
        let dir = std::env::temp_dir().join("drivesense-replay-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("samples.jsonl");

        let mut file = File::create(&path).unwrap();
        writeln!(
            file,
            r#"{{"timestamp":"2026-01-01T00:00:00Z","accel":[0.1,0.0,1.0],"gyro":[1.0,2.0,3.0],"confidence":0.9}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"timestamp":"2026-01-01T00:00:00.020Z","accel":[0.2,0.0,1.0],"gyro":[0.0,0.0,0.0]}}"#
        )
        .unwrap();
        drop(file);

        let mut source = ReplaySource::open(&path).unwrap();
        let first = source.read().unwrap();
        assert_eq!(first.accel, [0.1, 0.0, 1.0]);
        let second = source.read().unwrap();
        assert!(second.timestamp > first.timestamp);
        assert!(matches!(source.read(), Err(ReadError::EndOfStream)));
    }

    #[test]
    fn test_replay_malformed_line() {
        let dir = std::env::temp_dir().join("drivesense-replay-test-bad");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.jsonl");
        std::fs::write(&path, "not json\n").unwrap();

        let mut source = ReplaySource::open(&path).unwrap();
        assert!(matches!(source.read(), Err(ReadError::Malformed(_))));
    }
}
