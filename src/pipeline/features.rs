//! Fixed-order feature extraction from sealed windows.
//!
//! The extractor computes seven time-domain statistics per axis plus six
//! cross-axis magnitude terms. The order of the resulting vector is the
//! model input contract; [`FeatureSchema`] names every position so an
//! artifact's manifest can be checked against it at load time.

use crate::pipeline::window::Window;
use crate::sensor::Sample;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use thiserror::Error;

/// Axis order for per-axis statistics.
pub const AXIS_NAMES: [&str; 6] = ["acc_x", "acc_y", "acc_z", "gyro_x", "gyro_y", "gyro_z"];

/// Statistic order within each axis block.
pub const AXIS_STATS: [&str; 7] = ["mean", "std", "min", "max", "energy", "jerk", "zcr"];

/// Cross-axis magnitude terms appended after the axis blocks.
pub const MAGNITUDE_FEATURES: [&str; 6] = [
    "acc_mag_mean",
    "acc_mag_std",
    "acc_mag_max",
    "gyro_mag_mean",
    "gyro_mag_std",
    "gyro_mag_max",
];

/// Total feature count.
pub const FEATURE_COUNT: usize = AXIS_NAMES.len() * AXIS_STATS.len() + MAGNITUDE_FEATURES.len();

/// Ordered feature names. Two schemas are interchangeable only when every
/// name matches at the same position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    /// The canonical schema produced by [`FeatureExtractor`].
    pub fn canonical() -> Self {
        let mut names = Vec::with_capacity(FEATURE_COUNT);
        for axis in AXIS_NAMES {
            for stat in AXIS_STATS {
                names.push(format!("{axis}_{stat}"));
            }
        }
        names.extend(MAGNITUDE_FEATURES.iter().map(|name| (*name).to_string()));
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of a named feature, if present.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Feature vector for one window, ordered per [`FeatureSchema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Build a vector from raw values. Callers own schema agreement; the
    /// classifier still checks the width on every call.
    pub fn from_values(values: Vec<f64>) -> Self {
        Self { values }
    }
}

/// The produced vector does not match the expected feature count. This is
/// a configuration or version mismatch, not a recoverable input error.
#[derive(Debug, Error)]
#[error("feature vector has {actual} entries, schema expects {expected}")]
pub struct SchemaError {
    pub expected: usize,
    pub actual: usize,
}

/// Stateless extractor; `extract` is a pure function of the window.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    schema: FeatureSchema,
    sample_rate_hz: f64,
}

impl FeatureExtractor {
    pub fn new(sample_rate_hz: u32) -> Self {
        Self {
            schema: FeatureSchema::canonical(),
            sample_rate_hz: f64::from(sample_rate_hz),
        }
    }

    /// The schema this extractor produces.
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Compute the feature vector for one sealed window.
    ///
    /// Never yields NaN or infinity for a well-formed window; a constant
    /// signal produces exactly zero for every spread statistic.
    pub fn extract(&self, window: &Window) -> Result<FeatureVector, SchemaError> {
        let samples = window.samples();
        debug_assert!(samples.len() >= 2);

        let mut values = Vec::with_capacity(FEATURE_COUNT);
        for axis in 0..AXIS_NAMES.len() {
            let series: Vec<f64> = samples.iter().map(|s| axis_value(s, axis)).collect();
            push_axis_stats(&mut values, &series, self.sample_rate_hz);
        }

        let acc_mag: Vec<f64> = samples.iter().map(Sample::accel_magnitude).collect();
        let gyro_mag: Vec<f64> = samples.iter().map(Sample::gyro_magnitude).collect();
        push_magnitude_stats(&mut values, &acc_mag);
        push_magnitude_stats(&mut values, &gyro_mag);

        if values.len() != self.schema.len() {
            return Err(SchemaError {
                expected: self.schema.len(),
                actual: values.len(),
            });
        }
        Ok(FeatureVector { values })
    }
}

fn axis_value(sample: &Sample, axis: usize) -> f64 {
    if axis < 3 {
        sample.accel[axis]
    } else {
        sample.gyro[axis - 3]
    }
}

fn push_axis_stats(out: &mut Vec<f64>, series: &[f64], rate_hz: f64) {
    let mean = Statistics::mean(series.iter());
    out.push(mean);
    out.push(std_about(series, mean));
    out.push(Statistics::min(series.iter()));
    out.push(Statistics::max(series.iter()));
    out.push(energy_about(series, mean));
    out.push(mean_abs_jerk(series, rate_hz));
    out.push(zero_crossing_rate(series, mean));
}

fn push_magnitude_stats(out: &mut Vec<f64>, series: &[f64]) {
    let mean = Statistics::mean(series.iter());
    out.push(mean);
    out.push(std_about(series, mean));
    out.push(Statistics::max(series.iter()));
}

/// Two-pass population standard deviation. Deviations are taken against a
/// precomputed mean, so a constant series comes out exactly zero.
fn std_about(series: &[f64], mean: f64) -> f64 {
    energy_about(series, mean).sqrt()
}

/// Mean squared deviation about the mean (AC signal power).
fn energy_about(series: &[f64], mean: f64) -> f64 {
    series.iter().map(|&x| (x - mean) * (x - mean)).sum::<f64>() / series.len() as f64
}

/// Mean absolute successive difference, scaled to units per second.
fn mean_abs_jerk(series: &[f64], rate_hz: f64) -> f64 {
    if series.len() < 2 {
        return 0.0;
    }
    let total: f64 = series.windows(2).map(|pair| (pair[1] - pair[0]).abs()).sum();
    total / (series.len() - 1) as f64 * rate_hz
}

/// Fraction of consecutive pairs whose deviations from the mean change
/// sign. Zero deviations never count as a crossing.
fn zero_crossing_rate(series: &[f64], mean: f64) -> f64 {
    if series.len() < 2 {
        return 0.0;
    }
    let crossings = series
        .windows(2)
        .filter(|pair| (pair[0] - mean) * (pair[1] - mean) < 0.0)
        .count();
    crossings as f64 / (series.len() - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::window::WindowBuffer;
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn window_from(samples: Vec<([f64; 3], [f64; 3])>) -> Window {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let len = samples.len();
        let mut buffer = WindowBuffer::new(len, len, 1_000);
        let mut sealed = None;
        for (i, (accel, gyro)) in samples.into_iter().enumerate() {
            let sample = Sample::at(base + Duration::milliseconds(i as i64 * 20), accel, gyro);
            sealed = buffer.push(sample);
        }
        sealed.expect("window seals")
    }

    fn noise_window(n: usize, amplitude: f64) -> Window {
        let samples = (0..n)
            .map(|i| {
                let dither = amplitude * if i % 2 == 0 { 1.0 } else { -1.0 };
                (
                    [dither, -0.5 * dither, 0.25 * dither],
                    [10.0 * dither, -5.0 * dither, 2.0 * dither],
                )
            })
            .collect();
        window_from(samples)
    }

    #[test]
    fn test_schema_shape() {
        let schema = FeatureSchema::canonical();
        assert_eq!(schema.len(), FEATURE_COUNT);
        assert_eq!(schema.names()[0], "acc_x_mean");
        assert_eq!(schema.names()[6], "acc_x_zcr");
        assert_eq!(schema.names()[7], "acc_y_mean");
        assert_eq!(schema.position("acc_mag_std"), Some(43));
        assert_eq!(schema.position("gyro_mag_max"), Some(FEATURE_COUNT - 1));
    }

    #[test]
    fn test_vector_length_and_finiteness() {
        let extractor = FeatureExtractor::new(50);
        let vector = extractor.extract(&noise_window(50, 0.05)).unwrap();
        assert_eq!(vector.len(), FEATURE_COUNT);
        for (name, value) in extractor.schema().names().iter().zip(vector.values()) {
            assert!(value.is_finite(), "{name} is not finite: {value}");
        }
    }

    #[test]
    fn test_constant_window_spread_statistics_are_zero() {
        let extractor = FeatureExtractor::new(50);
        let samples = (0..50).map(|_| ([0.3, -0.1, 1.0], [5.0, 0.0, -2.0])).collect();
        let vector = extractor.extract(&window_from(samples)).unwrap();
        let schema = extractor.schema();

        for (name, value) in schema.names().iter().zip(vector.values()) {
            let is_spread = name.ends_with("_std")
                || name.ends_with("_energy")
                || name.ends_with("_jerk")
                || name.ends_with("_zcr");
            if is_spread {
                assert_eq!(*value, 0.0, "{name} should be exactly zero");
            }
        }

        let mean_x = vector.values()[schema.position("acc_x_mean").unwrap()];
        assert!((mean_x - 0.3).abs() < 1e-12);
        let min_x = vector.values()[schema.position("acc_x_min").unwrap()];
        let max_x = vector.values()[schema.position("acc_x_max").unwrap()];
        assert_eq!(min_x, max_x);
    }

    #[test]
    fn test_spike_raises_spread_statistics() {
        let extractor = FeatureExtractor::new(50);
        let quiet = extractor.extract(&noise_window(50, 0.05)).unwrap();

        let mut samples: Vec<([f64; 3], [f64; 3])> = (0..50)
            .map(|i| {
                let dither = 0.05 * if i % 2 == 0 { 1.0 } else { -1.0 };
                ([dither, 0.0, 0.0], [0.0, 0.0, 0.0])
            })
            .collect();
        samples[25].0 = [2.0, 0.0, 0.0];
        let spiked = extractor.extract(&window_from(samples)).unwrap();

        let idx = extractor.schema().position("acc_mag_std").unwrap();
        assert!(spiked.values()[idx] > quiet.values()[idx] * 3.0);
    }

    #[test]
    fn test_zero_crossing_rate_alternating() {
        // Alternating series crosses its mean at every step.
        let series: Vec<f64> = (0..10).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let mean = Statistics::mean(series.iter());
        assert!((zero_crossing_rate(&series, mean) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_jerk_scales_with_rate() {
        let series = vec![0.0, 1.0, 0.0, 1.0];
        assert!((mean_abs_jerk(&series, 50.0) - 50.0).abs() < 1e-9);
        assert!((mean_abs_jerk(&series, 100.0) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let extractor = FeatureExtractor::new(50);
        let a = extractor.extract(&noise_window(50, 0.05)).unwrap();
        let b = extractor.extract(&noise_window(50, 0.05)).unwrap();
        assert_eq!(a, b);
    }
}
