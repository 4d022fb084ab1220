//! End-to-end pipeline tests: samples in, verdicts out.

use chrono::{Duration, TimeZone, Utc};
use drivesense_agent::{
    Behavior, Classifier, DecisionConfig, DecisionPolicy, FeatureExtractor, FeatureSchema,
    InferenceError, Sample, Severity, Verdict, WindowBuffer, FEATURE_COUNT,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const RATE_HZ: u32 = 50;
const WINDOW: usize = 50;
const STRIDE: usize = 25;

struct Harness {
    buffer: WindowBuffer,
    extractor: FeatureExtractor,
    classifier: Arc<Classifier>,
    policy: DecisionPolicy,
    clock_ms: i64,
}

impl Harness {
    fn new() -> Self {
        let schema = FeatureSchema::canonical();
        Self {
            buffer: WindowBuffer::new(WINDOW, STRIDE, 250),
            extractor: FeatureExtractor::new(RATE_HZ),
            classifier: Arc::new(Classifier::reference(&schema).expect("reference model")),
            policy: DecisionPolicy::new(DecisionConfig::default()),
            clock_ms: 0,
        }
    }

    /// Push one sample; returns the verdict if a window sealed.
    fn push(&mut self, accel: [f64; 3], gyro: [f64; 3]) -> Option<Verdict> {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let sample = Sample::at(base + Duration::milliseconds(self.clock_ms), accel, gyro);
        self.clock_ms += 1_000 / i64::from(RATE_HZ);

        let window = self.buffer.push(sample)?;
        let features = self.extractor.extract(&window).expect("schema holds");
        let prediction = self.classifier.predict(&features).expect("inference runs");
        Some(self.policy.decide(&prediction, window.index()))
    }

    /// Push `n` small-amplitude noise samples around zero.
    fn push_noise(&mut self, n: usize) -> Vec<Verdict> {
        let mut verdicts = Vec::new();
        for i in 0..n {
            let dither = 0.05 * if i % 2 == 0 { 1.0 } else { -1.0 };
            if let Some(v) = self.push([dither, -0.5 * dither, 0.25 * dither], [0.0, 0.0, 0.0]) {
                verdicts.push(v);
            }
        }
        verdicts
    }
}

#[test]
fn noise_window_classifies_normal_with_low_severity() {
    let mut harness = Harness::new();
    let verdicts = harness.push_noise(WINDOW);

    assert_eq!(verdicts.len(), 1);
    let verdict = &verdicts[0];
    assert_eq!(verdict.behavior, Some(Behavior::Normal));
    assert_eq!(verdict.severity, Severity::Low);
    assert!(verdict.confidence >= 0.70);
    assert!(!verdict.stale);
}

#[test]
fn spike_window_severity_dominates_noise_window() {
    let mut harness = Harness::new();
    let noise_verdict = harness.push_noise(WINDOW).remove(0);

    // One stride of quiet samples with a single sharp spike in the middle.
    let mut spike_verdict = None;
    for i in 0..STRIDE {
        let accel = if i == STRIDE / 2 {
            [2.0, 0.0, 0.0]
        } else {
            [0.02, 0.0, 0.0]
        };
        if let Some(v) = harness.push(accel, [0.0, 0.0, 0.0]) {
            spike_verdict = Some(v);
        }
    }
    let spike_verdict = spike_verdict.expect("second window seals");

    assert!(matches!(
        spike_verdict.behavior,
        Some(Behavior::Aggressive) | Some(Behavior::Dangerous)
    ));
    assert_eq!(spike_verdict.severity, Severity::High);
    assert!(spike_verdict.severity >= noise_verdict.severity);
    // Windows sealed in order, no skips.
    assert_eq!(noise_verdict.window_index, 0);
    assert_eq!(spike_verdict.window_index, 1);
}

#[test]
fn window_count_matches_stride_arithmetic() {
    // window + stride pushes yield exactly two sealed windows.
    let mut harness = Harness::new();
    let verdicts = harness.push_noise(WINDOW + STRIDE);
    assert_eq!(verdicts.len(), 2);
}

#[test]
fn gap_never_produces_a_spanning_window() {
    let mut harness = Harness::new();
    harness.push_noise(WINDOW - 10);

    // Jump the clock far past the gap tolerance, then resume.
    harness.clock_ms += 5_000;
    let verdicts = harness.push_noise(WINDOW - 1);
    assert!(verdicts.is_empty(), "no window may span the gap");

    // The next sample completes a full post-gap window.
    let verdicts = harness.push_noise(1);
    assert_eq!(verdicts.len(), 1);
}

#[test]
fn truncated_vector_is_a_per_call_inference_error() {
    let schema = FeatureSchema::canonical();
    let classifier = Classifier::reference(&schema).expect("reference model");

    let mut harness = Harness::new();
    harness.push_noise(WINDOW);
    let extractor = FeatureExtractor::new(RATE_HZ);
    assert_eq!(extractor.schema().len(), FEATURE_COUNT);

    // A vector of the wrong width is rejected per call, not a crash.
    let short = drivesense_agent::FeatureVector::from_values(vec![0.0; FEATURE_COUNT - 1]);
    let err = classifier.predict(&short).unwrap_err();
    assert!(matches!(err, InferenceError::InputLength { .. }));
}

#[test]
fn missed_cycles_hold_state_then_flag_stale() {
    let mut harness = Harness::new();
    harness.push_noise(WINDOW);
    assert_eq!(harness.policy.accepted(), Some(Behavior::Normal));

    // Five consecutive failed inferences (the default staleness bound).
    let mut last = None;
    for i in 1..=5 {
        last = Some(harness.policy.record_missed(i));
    }
    let verdict = last.unwrap();
    assert_eq!(verdict.behavior, Some(Behavior::Normal));
    assert!(verdict.stale);
    assert_eq!(verdict.missed_cycles, 5);
}
