//! The periodic read -> window -> extract -> classify -> decide loop.
//!
//! One controller owns one stream: its sample source, window buffer, and
//! decision policy. Tick deadlines are computed from a fixed start
//! instant, so sleep error never accumulates into long-run drift. Stops
//! are cooperative and take effect between ticks.

use crate::emitter::EmitterHandle;
use crate::events::{BehaviorEvent, BrakeEvent, ModuleEvent, SensorHealthEvent};
use crate::pipeline::classifier::Classifier;
use crate::pipeline::decision::{DecisionConfig, DecisionPolicy};
use crate::pipeline::features::{FeatureExtractor, SchemaError};
use crate::pipeline::types::Verdict;
use crate::pipeline::window::{Window, WindowBuffer};
use crate::recorder::SampleRecorder;
use crate::sensor::{ReadError, Sample, SampleSource};
use crate::stats::SharedSessionStats;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Runtime settings for one stream, fixed for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Sampling cadence in Hz
    pub sample_rate_hz: u32,
    /// Samples per window
    pub window_len: usize,
    /// New samples between consecutive windows
    pub stride: usize,
    /// Largest tolerated gap between consecutive samples
    pub max_gap_ms: i64,
    /// Decision-policy tunables
    pub decision: DecisionConfig,
    /// Consecutive read failures before the stream is reported unavailable
    pub sensor_fail_threshold: u32,
    /// Minimum spacing between brake events
    pub brake_cooldown_ms: u64,
    /// Stop after this many ticks (`None` runs until stopped)
    pub max_ticks: Option<u64>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            sample_rate_hz: 50,
            window_len: 50,
            stride: 25,
            max_gap_ms: 250,
            decision: DecisionConfig::default(),
            sensor_fail_threshold: 5,
            brake_cooldown_ms: 2_000,
            max_ticks: None,
        }
    }
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The stop flag was cleared (Ctrl+C or an external stop)
    Signal,
    /// The configured tick limit was reached
    TickLimit,
    /// A finite source ran out of samples
    SourceExhausted,
}

/// What a finished run produced.
#[derive(Debug)]
pub struct RunReport {
    pub stop_reason: StopReason,
    pub ticks: u64,
    pub last_verdict: Option<Verdict>,
    pub summary_path: Option<PathBuf>,
}

/// Fatal pipeline faults. Anything transient is handled inside the loop.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Drives one sensor stream at the configured cadence.
pub struct StreamController {
    settings: StreamSettings,
    source: Box<dyn SampleSource>,
    buffer: WindowBuffer,
    extractor: FeatureExtractor,
    classifier: Arc<Classifier>,
    policy: DecisionPolicy,
    emitter: Option<EmitterHandle>,
    recorder: Option<SampleRecorder>,
    stats: SharedSessionStats,
    running: Arc<AtomicBool>,
    last_verdict: Option<Verdict>,
    consecutive_read_failures: u32,
    sensor_reported_down: bool,
    last_brake_event: Option<Instant>,
    seen_resets: u64,
}

impl StreamController {
    pub fn new(
        settings: StreamSettings,
        source: Box<dyn SampleSource>,
        classifier: Arc<Classifier>,
        stats: SharedSessionStats,
        running: Arc<AtomicBool>,
    ) -> Self {
        let buffer = WindowBuffer::new(settings.window_len, settings.stride, settings.max_gap_ms);
        let extractor = FeatureExtractor::new(settings.sample_rate_hz);
        let policy = DecisionPolicy::new(settings.decision.clone());
        Self {
            settings,
            source,
            buffer,
            extractor,
            classifier,
            policy,
            emitter: None,
            recorder: None,
            stats,
            running,
            last_verdict: None,
            consecutive_read_failures: 0,
            sensor_reported_down: false,
            last_brake_event: None,
            seen_resets: 0,
        }
    }

    /// Attach a downstream event emitter.
    pub fn with_emitter(mut self, emitter: EmitterHandle) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Attach a sample recorder.
    pub fn with_recorder(mut self, recorder: SampleRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Run the loop until stopped, exhausted, or over the tick limit.
    pub fn run(&mut self) -> Result<RunReport, PipelineError> {
        let interval = Duration::from_secs_f64(1.0 / f64::from(self.settings.sample_rate_hz));
        info!(
            source = %self.source.describe(),
            rate_hz = self.settings.sample_rate_hz,
            window = self.settings.window_len,
            stride = self.settings.stride,
            model = %self.classifier.origin(),
            "stream started"
        );

        let mut ticks: u64 = 0;
        let mut next_deadline = Instant::now() + interval;

        let stop_reason = loop {
            if !self.running.load(Ordering::SeqCst) {
                break StopReason::Signal;
            }
            if let Some(limit) = self.settings.max_ticks {
                if ticks >= limit {
                    break StopReason::TickLimit;
                }
            }

            match self.source.read() {
                Ok(sample) => {
                    self.note_read_recovery();
                    self.stats.record_sample();
                    self.process_sample(sample)?;
                }
                Err(ReadError::EndOfStream) => break StopReason::SourceExhausted,
                Err(e) => {
                    // Back off while the bus is failing; deadlines stay on
                    // the absolute grid, so recovery does not drift.
                    let skipped = self.note_read_failure(&e);
                    ticks += skipped;
                    next_deadline += interval * skipped as u32;
                }
            }

            ticks += 1;
            let now = Instant::now();
            if next_deadline > now {
                thread::sleep(next_deadline - now);
            } else {
                debug!(
                    behind_ms = (now - next_deadline).as_millis() as u64,
                    "tick overran its interval"
                );
            }
            next_deadline += interval;
        };

        info!(?stop_reason, ticks, "stream stopped");

        // Orderly shutdown: the partial window is dropped, the recorder is
        // finalized, and the emitter drains its queue.
        let summary_path = match self.recorder.take() {
            Some(recorder) => match recorder.finish() {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("session summary write failed: {e}");
                    None
                }
            },
            None => None,
        };
        if let Some(emitter) = self.emitter.take() {
            emitter.shutdown();
        }

        Ok(RunReport {
            stop_reason,
            ticks,
            last_verdict: self.last_verdict.clone(),
            summary_path,
        })
    }

    fn process_sample(&mut self, sample: Sample) -> Result<(), PipelineError> {
        let sealed = self.buffer.push(sample);

        let resets = self.buffer.resets();
        while self.seen_resets < resets {
            self.stats.record_window_reset();
            self.seen_resets += 1;
        }

        if let Some(window) = sealed {
            self.stats.record_window_sealed();
            self.process_window(&window)?;
        }

        if let Some(recorder) = &mut self.recorder {
            if let Err(e) = recorder.record(&sample, self.last_verdict.as_ref()) {
                warn!("sample log write failed: {e}");
            }
        }
        Ok(())
    }

    fn process_window(&mut self, window: &Window) -> Result<(), PipelineError> {
        let features = self.extractor.extract(window)?;

        let verdict = match self.classifier.predict(&features) {
            Ok(prediction) => {
                self.stats.record_prediction();
                self.policy.decide(&prediction, window.index())
            }
            Err(e) => {
                self.stats.record_inference_error();
                warn!(window = window.index(), "inference failed, holding last state: {e}");
                let verdict = self.policy.record_missed(window.index());
                if verdict.stale
                    && verdict.missed_cycles == self.settings.decision.stale_threshold
                {
                    self.emit(ModuleEvent::SensorHealth(SensorHealthEvent::stale_verdict(
                        verdict.missed_cycles,
                    )));
                }
                verdict
            }
        };

        self.stats.record_verdict();
        self.emit(ModuleEvent::Behavior(BehaviorEvent::from_verdict(&verdict)));
        self.maybe_emit_brake(window, &verdict);

        if let Some(recorder) = &mut self.recorder {
            recorder.note_verdict(&verdict);
        }
        self.last_verdict = Some(verdict);
        Ok(())
    }

    fn maybe_emit_brake(&mut self, window: &Window, verdict: &Verdict) {
        let cooldown = Duration::from_millis(self.settings.brake_cooldown_ms);
        let cooled = self
            .last_brake_event
            .map(|at| at.elapsed() >= cooldown)
            .unwrap_or(true);
        if !cooled {
            return;
        }
        if let Some(event) = BrakeEvent::from_magnitude(window.peak_accel_magnitude(), verdict.behavior)
        {
            self.emit(ModuleEvent::Brake(event));
            self.last_brake_event = Some(Instant::now());
        }
    }

    fn note_read_failure(&mut self, error: &ReadError) -> u64 {
        self.stats.record_read_failure();
        self.consecutive_read_failures += 1;
        warn!(
            failures = self.consecutive_read_failures,
            "sensor read failed: {error}"
        );
        if self.consecutive_read_failures == self.settings.sensor_fail_threshold {
            self.sensor_reported_down = true;
            self.emit(ModuleEvent::SensorHealth(SensorHealthEvent::unavailable(
                self.consecutive_read_failures,
            )));
        }
        u64::from(self.consecutive_read_failures.min(8))
    }

    fn note_read_recovery(&mut self) {
        if self.consecutive_read_failures == 0 {
            return;
        }
        if self.sensor_reported_down {
            info!(
                failures = self.consecutive_read_failures,
                "sensor recovered"
            );
            self.emit(ModuleEvent::SensorHealth(SensorHealthEvent::recovered(
                self.consecutive_read_failures,
            )));
            self.sensor_reported_down = false;
        }
        self.consecutive_read_failures = 0;
    }

    fn emit(&self, event: ModuleEvent) {
        if let Some(emitter) = &self.emitter {
            emitter.emit(event);
        }
    }
}
