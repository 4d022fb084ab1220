//! Session counters for observability and the status command.
//!
//! Counters are atomic so the sampling loop and the emitter worker can
//! both record without coordination. Persisted totals survive restarts
//! and back the `drivesense status` output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Counters for one agent session.
#[derive(Debug)]
pub struct SessionStats {
    samples_read: AtomicU64,
    read_failures: AtomicU64,
    windows_sealed: AtomicU64,
    window_resets: AtomicU64,
    predictions: AtomicU64,
    inference_errors: AtomicU64,
    verdicts: AtomicU64,
    events_emitted: AtomicU64,
    events_dropped: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            samples_read: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
            windows_sealed: AtomicU64::new(0),
            window_resets: AtomicU64::new(0),
            predictions: AtomicU64::new(0),
            inference_errors: AtomicU64::new(0),
            verdicts: AtomicU64::new(0),
            events_emitted: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create stats that persist cumulative totals at the given path.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);
        if let Err(e) = stats.load() {
            debug!("no previous session stats loaded: {e}");
        }
        stats
    }

    pub fn record_sample(&self) {
        self.samples_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_window_sealed(&self) {
        self.windows_sealed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_window_reset(&self) {
        self.window_resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prediction(&self) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference_error(&self) {
        self.inference_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_verdict(&self) {
        self.verdicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_emitted(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_read: self.samples_read.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            windows_sealed: self.windows_sealed.load(Ordering::Relaxed),
            window_resets: self.window_resets.load(Ordering::Relaxed),
            predictions: self.predictions.load(Ordering::Relaxed),
            inference_errors: self.inference_errors.load(Ordering::Relaxed),
            verdicts: self.verdicts.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Printable summary for shutdown and the status command.
    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "Session Statistics:\n\
             - Samples read: {} ({} read failures)\n\
             - Windows sealed: {} ({} resets)\n\
             - Predictions: {} ({} inference errors)\n\
             - Verdicts: {}\n\
             - Events emitted: {} ({} dropped)\n\
             - Session duration: {} seconds",
            s.samples_read,
            s.read_failures,
            s.windows_sealed,
            s.window_resets,
            s.predictions,
            s.inference_errors,
            s.verdicts,
            s.events_emitted,
            s.events_dropped,
            s.session_duration_secs
        )
    }

    /// Save cumulative totals to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let snapshot = self.snapshot();
            let json = serde_json::to_string_pretty(&snapshot).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let snapshot: StatsSnapshot =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;
                self.samples_read
                    .store(snapshot.samples_read, Ordering::Relaxed);
                self.read_failures
                    .store(snapshot.read_failures, Ordering::Relaxed);
                self.windows_sealed
                    .store(snapshot.windows_sealed, Ordering::Relaxed);
                self.window_resets
                    .store(snapshot.window_resets, Ordering::Relaxed);
                self.predictions
                    .store(snapshot.predictions, Ordering::Relaxed);
                self.inference_errors
                    .store(snapshot.inference_errors, Ordering::Relaxed);
                self.verdicts.store(snapshot.verdicts, Ordering::Relaxed);
                self.events_emitted
                    .store(snapshot.events_emitted, Ordering::Relaxed);
                self.events_dropped
                    .store(snapshot.events_dropped, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.samples_read.store(0, Ordering::Relaxed);
        self.read_failures.store(0, Ordering::Relaxed);
        self.windows_sealed.store(0, Ordering::Relaxed);
        self.window_resets.store(0, Ordering::Relaxed);
        self.predictions.store(0, Ordering::Relaxed);
        self.inference_errors.store(0, Ordering::Relaxed);
        self.verdicts.store(0, Ordering::Relaxed);
        self.events_emitted.store(0, Ordering::Relaxed);
        self.events_dropped.store(0, Ordering::Relaxed);
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable snapshot of all counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub samples_read: u64,
    pub read_failures: u64,
    pub windows_sealed: u64,
    pub window_resets: u64,
    pub predictions: u64,
    pub inference_errors: u64,
    pub verdicts: u64,
    pub events_emitted: u64,
    pub events_dropped: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Thread-safe shared stats.
pub type SharedSessionStats = Arc<SessionStats>;

pub fn shared_stats() -> SharedSessionStats {
    Arc::new(SessionStats::new())
}

pub fn shared_stats_with_persistence(path: PathBuf) -> SharedSessionStats {
    Arc::new(SessionStats::with_persistence(path))
}
