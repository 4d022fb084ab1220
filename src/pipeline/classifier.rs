//! Decision-forest classifier behind a uniform inference call.
//!
//! The model is a serialized forest of axis-aligned decision trees plus a
//! feature-name manifest, loaded once at startup and validated against the
//! extractor schema. After loading, the classifier is immutable; `predict`
//! takes `&self` and is safe to share behind an `Arc` across streams.

use crate::pipeline::features::{FeatureSchema, FeatureVector};
use crate::pipeline::types::{Behavior, Prediction};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Artifact format revision this build understands.
const SUPPORTED_FORMAT_VERSION: u32 = 1;

/// Class names an artifact must declare, in model output order.
const EXPECTED_CLASSES: [&str; 4] = ["normal", "moderate", "aggressive", "dangerous"];

/// Startup-fatal artifact problems. Surfaced before the stream starts.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model artifact {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("model artifact {path} is not valid JSON: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("model artifact declares format version {actual}, this build supports {SUPPORTED_FORMAT_VERSION}")]
    FormatVersion { actual: u32 },

    #[error("model artifact declares {actual} input features, the extractor produces {expected}")]
    InputShape { expected: usize, actual: usize },

    #[error("feature {index} in the manifest is {actual:?}, the extractor produces {expected:?}")]
    FeatureOrder {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("model artifact declares classes {actual:?}, expected {expected:?}")]
    Classes {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("tree {tree} is malformed: {reason}")]
    MalformedTree { tree: usize, reason: String },
}

/// Per-call inference failures. The cycle is skipped, never the stream.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("input vector has {actual} entries, the model expects {expected}")]
    InputLength { expected: usize, actual: usize },

    #[error("input vector contains a non-finite value at index {index}")]
    NonFinite { index: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        weights: [f64; 4],
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<TreeNode>,
}

impl Tree {
    /// Walk from the root to a leaf. Values strictly below the threshold
    /// take the left child.
    fn evaluate(&self, values: &[f64]) -> [f64; 4] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if values[*feature] < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                TreeNode::Leaf { weights } => return *weights,
            }
        }
    }
}

/// Serialized forest plus the feature manifest it was trained against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    format_version: u32,
    classes: Vec<String>,
    feature_names: Vec<String>,
    trees: Vec<Tree>,
}

/// Immutable classifier wrapping a loaded forest.
pub struct Classifier {
    artifact: ModelArtifact,
    origin: String,
}

impl Classifier {
    /// Load an artifact file and validate it against the extractor schema.
    pub fn load(path: &Path, schema: &FeatureSchema) -> Result<Self, ModelLoadError> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
            path: display.clone(),
            source,
        })?;
        let artifact: ModelArtifact =
            serde_json::from_str(&content).map_err(|source| ModelLoadError::Parse {
                path: display.clone(),
                source,
            })?;
        Self::from_artifact(artifact, display, schema)
    }

    /// Validate an in-memory artifact.
    pub fn from_artifact(
        artifact: ModelArtifact,
        origin: impl Into<String>,
        schema: &FeatureSchema,
    ) -> Result<Self, ModelLoadError> {
        if artifact.format_version != SUPPORTED_FORMAT_VERSION {
            return Err(ModelLoadError::FormatVersion {
                actual: artifact.format_version,
            });
        }

        if artifact.classes != EXPECTED_CLASSES {
            return Err(ModelLoadError::Classes {
                expected: EXPECTED_CLASSES.iter().map(|c| (*c).to_string()).collect(),
                actual: artifact.classes,
            });
        }

        if artifact.feature_names.len() != schema.len() {
            return Err(ModelLoadError::InputShape {
                expected: schema.len(),
                actual: artifact.feature_names.len(),
            });
        }
        for (index, (expected, actual)) in schema
            .names()
            .iter()
            .zip(&artifact.feature_names)
            .enumerate()
        {
            if expected != actual {
                return Err(ModelLoadError::FeatureOrder {
                    index,
                    expected: expected.clone(),
                    actual: actual.clone(),
                });
            }
        }

        for (tree_index, tree) in artifact.trees.iter().enumerate() {
            validate_tree(tree_index, tree, artifact.feature_names.len())?;
        }
        if artifact.trees.is_empty() {
            return Err(ModelLoadError::MalformedTree {
                tree: 0,
                reason: "artifact contains no trees".to_string(),
            });
        }

        let classifier = Self {
            artifact,
            origin: origin.into(),
        };
        info!(
            origin = %classifier.origin,
            trees = classifier.tree_count(),
            inputs = classifier.input_len(),
            "model loaded"
        );
        Ok(classifier)
    }

    /// Built-in threshold forest keyed on acceleration and rotation
    /// spread. Used when no trained artifact is configured; selection is
    /// explicit and announced at startup.
    pub fn reference(schema: &FeatureSchema) -> Result<Self, ModelLoadError> {
        let acc_spread = schema.position("acc_mag_std").ok_or_else(|| {
            ModelLoadError::FeatureOrder {
                index: 0,
                expected: "acc_mag_std".to_string(),
                actual: "absent".to_string(),
            }
        })?;
        let gyro_spread = schema.position("gyro_mag_std").ok_or_else(|| {
            ModelLoadError::FeatureOrder {
                index: 0,
                expected: "gyro_mag_std".to_string(),
                actual: "absent".to_string(),
            }
        })?;

        let tree = Tree {
            nodes: vec![
                // 0: calm acceleration goes left, everything else right
                TreeNode::Split {
                    feature: acc_spread,
                    threshold: 0.10,
                    left: 1,
                    right: 4,
                },
                // 1: calm acceleration but hard rotation is still moderate
                TreeNode::Split {
                    feature: gyro_spread,
                    threshold: 30.0,
                    left: 2,
                    right: 3,
                },
                TreeNode::Leaf {
                    weights: [0.92, 0.05, 0.02, 0.01],
                },
                TreeNode::Leaf {
                    weights: [0.10, 0.80, 0.08, 0.02],
                },
                // 4: grade the acceleration spread
                TreeNode::Split {
                    feature: acc_spread,
                    threshold: 0.20,
                    left: 5,
                    right: 6,
                },
                TreeNode::Leaf {
                    weights: [0.10, 0.80, 0.08, 0.02],
                },
                TreeNode::Split {
                    feature: acc_spread,
                    threshold: 0.60,
                    left: 7,
                    right: 8,
                },
                TreeNode::Leaf {
                    weights: [0.02, 0.10, 0.78, 0.10],
                },
                TreeNode::Leaf {
                    weights: [0.01, 0.04, 0.20, 0.75],
                },
            ],
        };

        let artifact = ModelArtifact {
            format_version: SUPPORTED_FORMAT_VERSION,
            classes: EXPECTED_CLASSES.iter().map(|c| (*c).to_string()).collect(),
            feature_names: schema.names().to_vec(),
            trees: vec![tree],
        };
        Self::from_artifact(artifact, "builtin-reference", schema)
    }

    /// Where this model came from, for startup logging.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Declared input width.
    pub fn input_len(&self) -> usize {
        self.artifact.feature_names.len()
    }

    /// Number of trees in the forest.
    pub fn tree_count(&self) -> usize {
        self.artifact.trees.len()
    }

    /// Class names in output order.
    pub fn classes(&self) -> &[String] {
        &self.artifact.classes
    }

    /// Run one inference. `&self` only; concurrent calls are safe.
    pub fn predict(&self, features: &FeatureVector) -> Result<Prediction, InferenceError> {
        let values = features.values();
        if values.len() != self.input_len() {
            return Err(InferenceError::InputLength {
                expected: self.input_len(),
                actual: values.len(),
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(InferenceError::NonFinite { index });
        }

        let mut probabilities = [0.0f64; 4];
        for tree in &self.artifact.trees {
            let weights = tree.evaluate(values);
            for (total, w) in probabilities.iter_mut().zip(weights) {
                *total += w;
            }
        }
        let sum: f64 = probabilities.iter().sum();
        for p in &mut probabilities {
            *p /= sum;
        }

        let (top_index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::MIN), |best, (i, p)| if p > best.1 { (i, p) } else { best });

        // from_index cannot miss: probabilities has exactly four entries.
        let behavior = Behavior::from_index(top_index).unwrap_or(Behavior::Normal);
        Ok(Prediction {
            behavior,
            probabilities,
            confidence,
        })
    }
}

/// Structural checks that make tree evaluation total: children in bounds
/// and strictly after their parent, leaves usable as distributions.
fn validate_tree(tree_index: usize, tree: &Tree, input_len: usize) -> Result<(), ModelLoadError> {
    let malformed = |reason: String| ModelLoadError::MalformedTree {
        tree: tree_index,
        reason,
    };

    if tree.nodes.is_empty() {
        return Err(malformed("tree has no nodes".to_string()));
    }
    for (index, node) in tree.nodes.iter().enumerate() {
        match node {
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if *feature >= input_len {
                    return Err(malformed(format!(
                        "node {index} splits on feature {feature}, input width is {input_len}"
                    )));
                }
                if !threshold.is_finite() {
                    return Err(malformed(format!("node {index} has a non-finite threshold")));
                }
                for child in [left, right] {
                    if *child >= tree.nodes.len() || *child <= index {
                        return Err(malformed(format!(
                            "node {index} references child {child} out of order"
                        )));
                    }
                }
            }
            TreeNode::Leaf { weights } => {
                if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                    return Err(malformed(format!("node {index} has invalid leaf weights")));
                }
                if weights.iter().sum::<f64>() <= 0.0 {
                    return Err(malformed(format!("node {index} has an all-zero leaf")));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::features::FEATURE_COUNT;

    fn schema() -> FeatureSchema {
        FeatureSchema::canonical()
    }

    fn vector_with(schema: &FeatureSchema, entries: &[(&str, f64)]) -> FeatureVector {
        let mut values = vec![0.0; schema.len()];
        for (name, value) in entries {
            values[schema.position(name).unwrap()] = *value;
        }
        FeatureVector::from_values(values)
    }

    #[test]
    fn test_reference_model_loads() {
        let classifier = Classifier::reference(&schema()).unwrap();
        assert_eq!(classifier.input_len(), FEATURE_COUNT);
        assert_eq!(classifier.tree_count(), 1);
        assert_eq!(classifier.origin(), "builtin-reference");
    }

    #[test]
    fn test_reference_model_grades_spread() {
        let schema = schema();
        let classifier = Classifier::reference(&schema).unwrap();

        let calm = classifier
            .predict(&vector_with(&schema, &[("acc_mag_std", 0.03)]))
            .unwrap();
        assert_eq!(calm.behavior, Behavior::Normal);
        assert!(calm.confidence > 0.9);

        let harsh = classifier
            .predict(&vector_with(&schema, &[("acc_mag_std", 0.30)]))
            .unwrap();
        assert_eq!(harsh.behavior, Behavior::Aggressive);

        let extreme = classifier
            .predict(&vector_with(&schema, &[("acc_mag_std", 0.90)]))
            .unwrap();
        assert_eq!(extreme.behavior, Behavior::Dangerous);

        let swerving = classifier
            .predict(&vector_with(
                &schema,
                &[("acc_mag_std", 0.03), ("gyro_mag_std", 45.0)],
            ))
            .unwrap();
        assert_eq!(swerving.behavior, Behavior::Moderate);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let schema = schema();
        let classifier = Classifier::reference(&schema).unwrap();
        let prediction = classifier
            .predict(&vector_with(&schema, &[("acc_mag_std", 0.15)]))
            .unwrap();
        let sum: f64 = prediction.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(prediction.probabilities.iter().all(|p| *p >= 0.0));
        assert!((prediction.confidence
            - prediction
                .probabilities
                .iter()
                .fold(f64::MIN, |a, &b| a.max(b)))
        .abs()
            < 1e-12);
    }

    #[test]
    fn test_wrong_input_length_is_inference_error() {
        let classifier = Classifier::reference(&schema()).unwrap();
        let short = FeatureVector::from_values(vec![0.0; FEATURE_COUNT - 1]);
        assert!(matches!(
            classifier.predict(&short),
            Err(InferenceError::InputLength { .. })
        ));
    }

    #[test]
    fn test_non_finite_input_is_inference_error() {
        let classifier = Classifier::reference(&schema()).unwrap();
        let mut values = vec![0.0; FEATURE_COUNT];
        values[10] = f64::NAN;
        assert!(matches!(
            classifier.predict(&FeatureVector::from_values(values)),
            Err(InferenceError::NonFinite { index: 10 })
        ));
    }

    #[test]
    fn test_manifest_length_mismatch_is_fatal() {
        let json = r#"{
            "format_version": 1,
            "classes": ["normal", "moderate", "aggressive", "dangerous"],
            "feature_names": ["only_one"],
            "trees": [{"nodes": [{"weights": [1.0, 0.0, 0.0, 0.0]}]}]
        }"#;
        let artifact: ModelArtifact = serde_json::from_str(json).unwrap();
        assert!(matches!(
            Classifier::from_artifact(artifact, "test", &schema()),
            Err(ModelLoadError::InputShape { actual: 1, .. })
        ));
    }

    #[test]
    fn test_manifest_order_mismatch_is_fatal() {
        let mut names = schema().names().to_vec();
        names.swap(0, 1);
        let json = serde_json::json!({
            "format_version": 1,
            "classes": ["normal", "moderate", "aggressive", "dangerous"],
            "feature_names": names,
            "trees": [{"nodes": [{"weights": [1.0, 0.0, 0.0, 0.0]}]}]
        });
        let artifact: ModelArtifact = serde_json::from_value(json).unwrap();
        assert!(matches!(
            Classifier::from_artifact(artifact, "test", &schema()),
            Err(ModelLoadError::FeatureOrder { index: 0, .. })
        ));
    }

    #[test]
    fn test_wrong_classes_are_fatal() {
        let json = serde_json::json!({
            "format_version": 1,
            "classes": ["calm", "wild"],
            "feature_names": schema().names(),
            "trees": [{"nodes": [{"weights": [1.0, 0.0, 0.0, 0.0]}]}]
        });
        let artifact: ModelArtifact = serde_json::from_value(json).unwrap();
        assert!(matches!(
            Classifier::from_artifact(artifact, "test", &schema()),
            Err(ModelLoadError::Classes { .. })
        ));
    }

    #[test]
    fn test_out_of_order_child_is_fatal() {
        let json = serde_json::json!({
            "format_version": 1,
            "classes": ["normal", "moderate", "aggressive", "dangerous"],
            "feature_names": schema().names(),
            "trees": [{"nodes": [
                {"feature": 0, "threshold": 0.5, "left": 0, "right": 1},
                {"weights": [1.0, 0.0, 0.0, 0.0]}
            ]}]
        });
        let artifact: ModelArtifact = serde_json::from_value(json).unwrap();
        assert!(matches!(
            Classifier::from_artifact(artifact, "test", &schema()),
            Err(ModelLoadError::MalformedTree { .. })
        ));
    }

    #[test]
    fn test_artifact_json_round_trip() {
        let schema = schema();
        let reference = Classifier::reference(&schema).unwrap();
        let json = serde_json::to_string(&reference.artifact).unwrap();
        let reloaded: ModelArtifact = serde_json::from_str(&json).unwrap();
        let classifier = Classifier::from_artifact(reloaded, "round-trip", &schema).unwrap();

        let probe = vector_with(&schema, &[("acc_mag_std", 0.30)]);
        assert_eq!(
            classifier.predict(&probe).unwrap(),
            reference.predict(&probe).unwrap()
        );
    }
}
