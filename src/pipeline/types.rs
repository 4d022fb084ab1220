//! Shared types for the inference pipeline.

use serde::{Deserialize, Serialize};

/// The closed set of driver-behavior classes, ordered by severity rank.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    Normal,
    Moderate,
    Aggressive,
    Dangerous,
}

impl Behavior {
    /// All classes in model output order.
    pub const ALL: [Behavior; 4] = [
        Behavior::Normal,
        Behavior::Moderate,
        Behavior::Aggressive,
        Behavior::Dangerous,
    ];

    /// Class id used in telemetry (1 through 4).
    pub fn class_id(self) -> u8 {
        match self {
            Behavior::Normal => 1,
            Behavior::Moderate => 2,
            Behavior::Aggressive => 3,
            Behavior::Dangerous => 4,
        }
    }

    /// Display label.
    pub fn label(self) -> &'static str {
        match self {
            Behavior::Normal => "Normal Driving",
            Behavior::Moderate => "Moderate Driving",
            Behavior::Aggressive => "Aggressive Driving",
            Behavior::Dangerous => "Dangerous Driving",
        }
    }

    /// Risk tier shown alongside the label.
    pub fn risk_level(self) -> &'static str {
        match self {
            Behavior::Normal => "Low",
            Behavior::Moderate => "Low-Medium",
            Behavior::Aggressive => "High",
            Behavior::Dangerous => "Very High",
        }
    }

    /// Severity tier attached to verdicts and outbound events.
    pub fn severity(self) -> Severity {
        match self {
            Behavior::Normal => Severity::Low,
            Behavior::Moderate => Severity::Moderate,
            Behavior::Aggressive | Behavior::Dangerous => Severity::High,
        }
    }

    /// Rough cruising-speed estimate in mph, used as numeric event context
    /// when no GPS fix is available.
    pub fn estimated_speed_mph(self) -> u32 {
        match self {
            Behavior::Normal => 35,
            Behavior::Moderate => 50,
            Behavior::Aggressive => 60,
            Behavior::Dangerous => 70,
        }
    }

    /// Class at the given model output index.
    pub fn from_index(index: usize) -> Option<Behavior> {
        Behavior::ALL.get(index).copied()
    }
}

/// Severity tier for verdicts and outbound events.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Moderate,
    High,
}

/// Classifier output for one feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Top class
    pub behavior: Behavior,
    /// Probability per class, in [`Behavior::ALL`] order; sums to 1
    pub probabilities: [f64; 4],
    /// Probability of the top class
    pub confidence: f64,
}

/// Decision output for one window cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Accepted class; `None` until the first confident prediction
    pub behavior: Option<Behavior>,
    /// Severity of the accepted class (low while holding)
    pub severity: Severity,
    /// Confidence of the prediction that last confirmed the accepted class
    pub confidence: f64,
    /// Set once consecutive inference failures pass the staleness threshold
    pub stale: bool,
    /// Consecutive cycles without a usable prediction
    pub missed_cycles: u32,
    /// Index of the window this verdict answers
    pub window_index: u64,
    /// Human-readable summary
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Moderate);
        assert!(Severity::Moderate < Severity::High);
    }

    #[test]
    fn test_behavior_rank_matches_severity() {
        assert!(Behavior::Normal < Behavior::Moderate);
        assert!(Behavior::Aggressive < Behavior::Dangerous);
        assert_eq!(Behavior::Aggressive.severity(), Severity::High);
        assert_eq!(Behavior::Dangerous.severity(), Severity::High);
    }

    #[test]
    fn test_class_ids_match_index_order() {
        for (index, behavior) in Behavior::ALL.iter().enumerate() {
            assert_eq!(behavior.class_id() as usize, index + 1);
            assert_eq!(Behavior::from_index(index), Some(*behavior));
        }
        assert_eq!(Behavior::from_index(4), None);
    }
}
