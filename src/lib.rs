//! Drivesense Agent - real-time driver-behavior inference from a 6-axis IMU.
//!
//! The agent samples an MPU6050 at a fixed cadence, accumulates overlapping
//! windows, extracts a fixed-order feature vector per window, classifies it
//! with a pre-trained decision forest, and gates the result through a
//! debounced decision policy before pushing typed events downstream.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Drivesense Agent                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐   ┌─────────┐   ┌──────────┐   ┌──────────┐        │
//! │  │ Sensor  │──▶│ Window  │──▶│ Features │──▶│Classifier│        │
//! │  │ (I2C)   │   │ Buffer  │   │ (48-dim) │   │ (forest) │        │
//! │  └─────────┘   └─────────┘   └──────────┘   └────┬─────┘        │
//! │       │                                          ▼              │
//! │  ┌─────────┐   ┌─────────┐                  ┌──────────┐        │
//! │  │ Session │   │ Sample  │                  │ Decision │        │
//! │  │  Stats  │   │  Log    │◀─────────────────│  Policy  │        │
//! │  └─────────┘   └─────────┘                  └────┬─────┘        │
//! │                                                  ▼              │
//! │                                             ┌──────────┐        │
//! │                                             │ Emitter  │──▶ relay
//! │                                             └──────────┘        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Data flows strictly left to right each cycle. The loaded model is the
//! only shared resource; everything else is owned by the stream's loop.
//!
//! # Example
//!
//! ```no_run
//! use drivesense_agent::{
//!     pipeline::{Classifier, FeatureSchema},
//!     sensor::SyntheticSource,
//!     stats::shared_stats,
//!     StreamController, StreamSettings,
//! };
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! let schema = FeatureSchema::canonical();
//! let classifier = Arc::new(Classifier::reference(&schema).expect("reference model"));
//! let mut controller = StreamController::new(
//!     StreamSettings::default(),
//!     Box::new(SyntheticSource::default()),
//!     classifier,
//!     shared_stats(),
//!     Arc::new(AtomicBool::new(true)),
//! );
//! let report = controller.run().expect("stream runs");
//! println!("stopped after {} ticks", report.ticks);
//! ```

pub mod config;
pub mod controller;
pub mod emitter;
pub mod events;
pub mod pipeline;
pub mod recorder;
pub mod sensor;
pub mod stats;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use controller::{PipelineError, RunReport, StopReason, StreamController, StreamSettings};
pub use emitter::{EmitterConfig, EmitterHandle};
pub use events::ModuleEvent;
pub use pipeline::{
    Behavior, Classifier, DecisionConfig, DecisionPolicy, FeatureExtractor, FeatureSchema,
    FeatureVector, InferenceError, ModelLoadError, Prediction, SchemaError, Severity, Verdict,
    Window, WindowBuffer, FEATURE_COUNT,
};
pub use recorder::{SampleRecorder, SessionSummary};
pub use sensor::{ReadError, Sample, SampleSource};
pub use stats::{SessionStats, SharedSessionStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
