//! Confidence gating, debounce, and staleness over classifier output.
//!
//! Severity upgrades take effect on a single confident prediction.
//! Downgrades need a run of consecutive confident predictions in the new
//! class so one noisy window cannot flap the accepted state. Cycles whose
//! inference failed hold the last accepted state and are flagged stale
//! once the miss run passes the configured threshold.

use crate::pipeline::types::{Behavior, Prediction, Severity, Verdict};

/// Tunables for the decision state machine.
#[derive(Debug, Clone)]
pub struct DecisionConfig {
    /// Minimum top-class confidence for a prediction to count.
    pub confidence_threshold: f64,
    /// Consecutive confident predictions required to accept a downgrade.
    pub debounce_count: u32,
    /// Consecutive missed cycles after which verdicts are flagged stale.
    pub stale_threshold: u32,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.70,
            debounce_count: 3,
            stale_threshold: 5,
        }
    }
}

/// State machine that turns per-window predictions into verdicts.
#[derive(Debug)]
pub struct DecisionPolicy {
    config: DecisionConfig,
    accepted: Option<Behavior>,
    accepted_confidence: f64,
    downgrade_run: Option<(Behavior, u32)>,
    missed_cycles: u32,
}

impl DecisionPolicy {
    pub fn new(config: DecisionConfig) -> Self {
        Self {
            config,
            accepted: None,
            accepted_confidence: 0.0,
            downgrade_run: None,
            missed_cycles: 0,
        }
    }

    /// The currently accepted class; `None` while holding.
    pub fn accepted(&self) -> Option<Behavior> {
        self.accepted
    }

    /// Consecutive cycles without a usable prediction.
    pub fn missed_cycles(&self) -> u32 {
        self.missed_cycles
    }

    /// Fold one prediction into the state machine.
    pub fn decide(&mut self, prediction: &Prediction, window_index: u64) -> Verdict {
        self.missed_cycles = 0;

        if prediction.confidence < self.config.confidence_threshold {
            // Low confidence never changes the accepted state, and it
            // breaks any downgrade run in progress.
            self.downgrade_run = None;
            return self.verdict(window_index);
        }

        match self.accepted {
            None => self.accept(prediction),
            Some(current) if prediction.behavior == current => {
                self.downgrade_run = None;
                self.accepted_confidence = prediction.confidence;
            }
            Some(current) if prediction.behavior > current => {
                // Severity escalation fires immediately.
                self.accept(prediction);
            }
            Some(_) => {
                let run = match self.downgrade_run {
                    Some((candidate, n)) if candidate == prediction.behavior => n + 1,
                    _ => 1,
                };
                if run >= self.config.debounce_count {
                    self.accept(prediction);
                } else {
                    self.downgrade_run = Some((prediction.behavior, run));
                }
            }
        }

        self.verdict(window_index)
    }

    /// Record a cycle with no usable prediction.
    pub fn record_missed(&mut self, window_index: u64) -> Verdict {
        self.missed_cycles += 1;
        self.verdict(window_index)
    }

    fn accept(&mut self, prediction: &Prediction) {
        self.accepted = Some(prediction.behavior);
        self.accepted_confidence = prediction.confidence;
        self.downgrade_run = None;
    }

    fn verdict(&self, window_index: u64) -> Verdict {
        let stale = self.missed_cycles >= self.config.stale_threshold;
        match self.accepted {
            Some(behavior) => Verdict {
                behavior: Some(behavior),
                severity: behavior.severity(),
                confidence: self.accepted_confidence,
                stale,
                missed_cycles: self.missed_cycles,
                window_index,
                message: if stale {
                    format!(
                        "{} (stale: {} cycles without fresh inference)",
                        behavior.label(),
                        self.missed_cycles
                    )
                } else {
                    format!(
                        "{} detected. Risk level: {}",
                        behavior.label(),
                        behavior.risk_level()
                    )
                },
            },
            None => Verdict {
                behavior: None,
                severity: Severity::Low,
                confidence: 0.0,
                stale,
                missed_cycles: self.missed_cycles,
                window_index,
                message: "Awaiting a confident classification".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confident(behavior: Behavior) -> Prediction {
        let mut probabilities = [0.05, 0.05, 0.05, 0.05];
        probabilities[behavior as usize] = 0.85;
        Prediction {
            behavior,
            probabilities,
            confidence: 0.85,
        }
    }

    fn uncertain(behavior: Behavior) -> Prediction {
        let mut probabilities = [0.15; 4];
        probabilities[behavior as usize] = 0.55;
        Prediction {
            behavior,
            probabilities,
            confidence: 0.55,
        }
    }

    fn policy() -> DecisionPolicy {
        DecisionPolicy::new(DecisionConfig::default())
    }

    #[test]
    fn test_holding_until_first_confident_prediction() {
        let mut policy = policy();
        let verdict = policy.decide(&uncertain(Behavior::Aggressive), 0);
        assert_eq!(verdict.behavior, None);
        assert_eq!(verdict.severity, Severity::Low);

        let verdict = policy.decide(&confident(Behavior::Moderate), 1);
        assert_eq!(verdict.behavior, Some(Behavior::Moderate));
        assert_eq!(verdict.severity, Severity::Moderate);
    }

    #[test]
    fn test_low_confidence_never_changes_state() {
        let mut policy = policy();
        policy.decide(&confident(Behavior::Normal), 0);
        for i in 1..10 {
            let verdict = policy.decide(&uncertain(Behavior::Dangerous), i);
            assert_eq!(verdict.behavior, Some(Behavior::Normal));
        }
    }

    #[test]
    fn test_upgrade_fires_immediately() {
        let mut policy = policy();
        let first = policy.decide(&confident(Behavior::Normal), 0);
        let second = policy.decide(&confident(Behavior::Dangerous), 1);
        assert_eq!(first.behavior, Some(Behavior::Normal));
        assert_eq!(second.behavior, Some(Behavior::Dangerous));
        assert_eq!(second.severity, Severity::High);
    }

    #[test]
    fn test_downgrade_debounced_three_cycles() {
        let mut policy = policy();
        let sequence = [
            Behavior::Dangerous,
            Behavior::Normal,
            Behavior::Normal,
            Behavior::Normal,
        ];
        let reported: Vec<Option<Behavior>> = sequence
            .iter()
            .enumerate()
            .map(|(i, b)| policy.decide(&confident(*b), i as u64).behavior)
            .collect();
        assert_eq!(
            reported,
            vec![
                Some(Behavior::Dangerous),
                Some(Behavior::Dangerous),
                Some(Behavior::Dangerous),
                Some(Behavior::Normal),
            ]
        );
    }

    #[test]
    fn test_downgrade_run_broken_by_other_class() {
        let mut policy = policy();
        policy.decide(&confident(Behavior::Dangerous), 0);
        policy.decide(&confident(Behavior::Normal), 1);
        policy.decide(&confident(Behavior::Moderate), 2);
        policy.decide(&confident(Behavior::Normal), 3);
        // The interleaved class restarted both runs.
        let verdict = policy.decide(&confident(Behavior::Normal), 4);
        assert_eq!(verdict.behavior, Some(Behavior::Dangerous));
        let verdict = policy.decide(&confident(Behavior::Normal), 5);
        assert_eq!(verdict.behavior, Some(Behavior::Normal));
    }

    #[test]
    fn test_downgrade_run_broken_by_low_confidence() {
        let mut policy = policy();
        policy.decide(&confident(Behavior::Dangerous), 0);
        policy.decide(&confident(Behavior::Normal), 1);
        policy.decide(&confident(Behavior::Normal), 2);
        policy.decide(&uncertain(Behavior::Normal), 3);
        // The run must restart after the low-confidence window.
        let verdict = policy.decide(&confident(Behavior::Normal), 4);
        assert_eq!(verdict.behavior, Some(Behavior::Dangerous));
    }

    #[test]
    fn test_missed_cycles_mark_stale_at_threshold() {
        let mut policy = DecisionPolicy::new(DecisionConfig {
            stale_threshold: 3,
            ..DecisionConfig::default()
        });
        policy.decide(&confident(Behavior::Moderate), 0);

        let v1 = policy.record_missed(1);
        let v2 = policy.record_missed(2);
        let v3 = policy.record_missed(3);
        assert!(!v1.stale && !v2.stale);
        assert!(v3.stale);
        assert_eq!(v3.behavior, Some(Behavior::Moderate));
        assert_eq!(v3.missed_cycles, 3);
        assert!(v3.message.contains("stale"));

        // A fresh prediction clears the miss run.
        let v4 = policy.decide(&confident(Behavior::Moderate), 4);
        assert!(!v4.stale);
        assert_eq!(v4.missed_cycles, 0);
    }

    #[test]
    fn test_verdict_confidence_tracks_accepting_prediction() {
        let mut policy = policy();
        let verdict = policy.decide(&confident(Behavior::Normal), 0);
        assert!((verdict.confidence - 0.85).abs() < 1e-12);

        // A rejected low-confidence prediction leaves the confidence of
        // the accepted state untouched.
        let verdict = policy.decide(&uncertain(Behavior::Dangerous), 1);
        assert!((verdict.confidence - 0.85).abs() < 1e-12);
    }
}
