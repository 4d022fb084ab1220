//! Sliding-window accumulation over the sample stream.
//!
//! Samples are collected into fixed-length windows that overlap by
//! `capacity - stride` samples. A timestamp regression or a gap beyond the
//! configured tolerance discards the partial window and restarts
//! accumulation; the loss is logged, never silent.

use crate::sensor::Sample;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::warn;

/// A sealed, fixed-length run of consecutive samples.
///
/// Invariant: timestamps are strictly increasing and gap-free within the
/// buffer's tolerance. Read-only once sealed.
#[derive(Debug, Clone)]
pub struct Window {
    samples: Vec<Sample>,
    index: u64,
}

impl Window {
    /// Samples in acquisition order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Zero-based seal order. Strictly increasing across one stream.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Timestamp of the first sample.
    pub fn start(&self) -> DateTime<Utc> {
        self.samples[0].timestamp
    }

    /// Timestamp of the last sample.
    pub fn end(&self) -> DateTime<Utc> {
        self.samples[self.samples.len() - 1].timestamp
    }

    /// Wall-clock span of the window in seconds.
    pub fn duration_secs(&self) -> f64 {
        (self.end() - self.start()).num_milliseconds() as f64 / 1000.0
    }

    /// Peak acceleration magnitude across the window, in g.
    pub fn peak_accel_magnitude(&self) -> f64 {
        self.samples
            .iter()
            .map(Sample::accel_magnitude)
            .fold(0.0, f64::max)
    }
}

/// Ring buffer that seals fixed-length windows from an in-order stream.
#[derive(Debug)]
pub struct WindowBuffer {
    capacity: usize,
    stride: usize,
    max_gap_ms: i64,
    samples: VecDeque<Sample>,
    last_timestamp: Option<DateTime<Utc>>,
    next_index: u64,
    resets: u64,
}

impl WindowBuffer {
    /// Create a buffer sealing windows of `capacity` samples, advancing by
    /// `stride` samples between windows. Callers validate `1 <= stride <=
    /// capacity` and `capacity >= 2` up front.
    pub fn new(capacity: usize, stride: usize, max_gap_ms: i64) -> Self {
        debug_assert!(capacity >= 2);
        debug_assert!(stride >= 1 && stride <= capacity);
        Self {
            capacity,
            stride,
            max_gap_ms,
            samples: VecDeque::with_capacity(capacity),
            last_timestamp: None,
            next_index: 0,
            resets: 0,
        }
    }

    /// Add a sample; returns a sealed window when the buffer fills.
    ///
    /// A duplicate timestamp drops the sample. A regression or a gap over
    /// `max_gap_ms` discards the partial contents and restarts from the
    /// incoming sample.
    pub fn push(&mut self, sample: Sample) -> Option<Window> {
        if let Some(last) = self.last_timestamp {
            let delta_us = sample
                .timestamp
                .signed_duration_since(last)
                .num_microseconds()
                .unwrap_or(i64::MAX);

            if delta_us == 0 {
                warn!(
                    timestamp = %sample.timestamp,
                    "duplicate sample timestamp, dropping sample"
                );
                return None;
            }
            if delta_us < 0 {
                warn!(
                    delta_ms = delta_us / 1000,
                    buffered = self.samples.len(),
                    "timestamp regression, discarding partial window"
                );
                self.reset();
            } else if delta_us / 1000 > self.max_gap_ms {
                warn!(
                    gap_ms = delta_us / 1000,
                    max_gap_ms = self.max_gap_ms,
                    buffered = self.samples.len(),
                    "sample gap over tolerance, discarding partial window"
                );
                self.reset();
            }
        }

        self.last_timestamp = Some(sample.timestamp);
        self.samples.push_back(sample);

        if self.samples.len() < self.capacity {
            return None;
        }

        let window = Window {
            samples: self.samples.iter().copied().collect(),
            index: self.next_index,
        };
        self.next_index += 1;

        // Keep the overlap for the next window.
        self.samples.drain(..self.stride);

        Some(window)
    }

    /// Samples accumulated toward the next window.
    pub fn pending(&self) -> usize {
        self.samples.len()
    }

    /// Number of discard-and-restart events so far.
    pub fn resets(&self) -> u64 {
        self.resets
    }

    fn reset(&mut self) {
        self.samples.clear();
        self.resets += 1;
    }
}
