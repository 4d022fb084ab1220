//! Deterministic sample source for demo runs and tests.

use crate::sensor::types::Sample;
use crate::sensor::{ReadError, SampleSource};

/// Generates gravity on the z axis plus a small triangular dither on every
/// channel. Deterministic and repeatable, so demo runs classify the same
/// way every time.
pub struct SyntheticSource {
    tick: u64,
    amplitude: f64,
}

impl SyntheticSource {
    /// Create a generator with the given dither amplitude in g.
    pub fn new(amplitude: f64) -> Self {
        Self { tick: 0, amplitude }
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new(0.05)
    }
}

impl SampleSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("synthetic (dither amplitude {} g)", self.amplitude)
    }

    fn read(&mut self) -> Result<Sample, ReadError> {
        // Triangular wave with an 8-tick period, centered on zero.
        let phase = (self.tick % 8) as f64 / 8.0;
        let dither = self.amplitude * (4.0 * (phase - 0.5).abs() - 1.0);
        self.tick += 1;

        Ok(Sample::new(
            [dither, -0.5 * dither, 1.0 + 0.25 * dither],
            [20.0 * dither, 10.0 * dither, -15.0 * dither],
        ))
    }
}
