//! The window -> features -> classification -> decision pipeline.
//!
//! Each stage owns what it produces until it hands it to the next stage;
//! nothing here blocks, and only the loaded model is ever shared.

pub mod classifier;
pub mod decision;
pub mod features;
pub mod types;
pub mod window;

// Re-export commonly used types
pub use classifier::{Classifier, InferenceError, ModelArtifact, ModelLoadError};
pub use decision::{DecisionConfig, DecisionPolicy};
pub use features::{FeatureExtractor, FeatureSchema, FeatureVector, SchemaError, FEATURE_COUNT};
pub use types::{Behavior, Prediction, Severity, Verdict};
pub use window::{Window, WindowBuffer};
