//! Typed outbound events for downstream consumers.
//!
//! The event set is closed: every module the agent reports on has its own
//! variant with its own typed fields, and consumers pattern-match on the
//! variant instead of probing optional keys. On the wire each event
//! carries a `module` tag plus the variant's fields.

use crate::pipeline::types::{Behavior, Severity, Verdict};
use serde::{Deserialize, Serialize};

/// Acceleration magnitude, in g, at which a hard-brake event fires.
pub const HARD_BRAKE_THRESHOLD_G: f64 = 1.5;

/// Acceleration magnitude, in g, at which a moderate-brake event fires.
pub const MODERATE_BRAKE_THRESHOLD_G: f64 = 1.0;

/// Speed estimate used when no verdict is available yet, in mph.
const DEFAULT_SPEED_MPH: u32 = 45;

/// One outbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "module")]
pub enum ModuleEvent {
    #[serde(rename = "Behavior Monitoring")]
    Behavior(BehaviorEvent),
    #[serde(rename = "Brake Checking")]
    Brake(BrakeEvent),
    #[serde(rename = "Sensor Health")]
    SensorHealth(SensorHealthEvent),
}

impl ModuleEvent {
    pub fn severity(&self) -> Severity {
        match self {
            ModuleEvent::Behavior(e) => e.severity,
            ModuleEvent::Brake(e) => e.severity,
            ModuleEvent::SensorHealth(e) => e.severity,
        }
    }
}

/// One event per verdict, fresh or held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorEvent {
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub behavior_class: u8,
    pub behavior_type: String,
    pub risk_level: String,
    pub confidence: f64,
    pub stale: bool,
    pub window_index: u64,
    pub severity: Severity,
    pub message: String,
}

impl BehaviorEvent {
    pub fn from_verdict(verdict: &Verdict) -> Self {
        let (class, label, risk) = match verdict.behavior {
            Some(b) => (b.class_id(), b.label().to_string(), b.risk_level().to_string()),
            None => (0, "Holding".to_string(), "Unknown".to_string()),
        };
        Self {
            event_type: "verdict".to_string(),
            behavior_class: class,
            behavior_type: label,
            risk_level: risk,
            confidence: verdict.confidence,
            stale: verdict.stale,
            window_index: verdict.window_index,
            severity: verdict.severity,
            message: verdict.message.clone(),
        }
    }
}

/// Brake intensity bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrakeKind {
    Hard,
    Moderate,
}

/// Threshold event on peak acceleration magnitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrakeEvent {
    #[serde(rename = "eventType")]
    pub event_type: BrakeKind,
    /// Braking force on a 0-100 scale
    pub force: u8,
    /// Estimated speed in mph
    pub speed: u32,
    pub behavior_class: u8,
    pub accel_magnitude: f64,
    pub severity: Severity,
    pub message: String,
}

impl BrakeEvent {
    /// Build a brake event when the magnitude crosses a threshold.
    pub fn from_magnitude(accel_magnitude: f64, behavior: Option<Behavior>) -> Option<Self> {
        let kind = if accel_magnitude > HARD_BRAKE_THRESHOLD_G {
            BrakeKind::Hard
        } else if accel_magnitude > MODERATE_BRAKE_THRESHOLD_G {
            BrakeKind::Moderate
        } else {
            return None;
        };

        let speed = behavior
            .map(Behavior::estimated_speed_mph)
            .unwrap_or(DEFAULT_SPEED_MPH);
        let force = (accel_magnitude * 50.0).min(100.0) as u8;

        let (severity, message) = match kind {
            BrakeKind::Hard => (
                Severity::High,
                format!("HARD BRAKING DETECTED at {speed} mph! Maintain safe following distance."),
            ),
            BrakeKind::Moderate => (
                Severity::Moderate,
                format!("Moderate braking at {speed} mph. Monitor traffic ahead."),
            ),
        };

        Some(Self {
            event_type: kind,
            force,
            speed,
            behavior_class: behavior.map(Behavior::class_id).unwrap_or(0),
            accel_magnitude: (accel_magnitude * 100.0).round() / 100.0,
            severity,
            message,
        })
    }
}

/// Kind of sensor-health notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorHealthKind {
    Unavailable,
    Recovered,
    StaleVerdict,
}

/// Explicit notification about the health of the sample stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorHealthEvent {
    #[serde(rename = "eventType")]
    pub event_type: SensorHealthKind,
    pub consecutive_failures: u32,
    pub severity: Severity,
    pub message: String,
}

impl SensorHealthEvent {
    pub fn unavailable(consecutive_failures: u32) -> Self {
        Self {
            event_type: SensorHealthKind::Unavailable,
            consecutive_failures,
            severity: Severity::High,
            message: format!(
                "Sensor unavailable after {consecutive_failures} consecutive read failures."
            ),
        }
    }

    pub fn recovered(consecutive_failures: u32) -> Self {
        Self {
            event_type: SensorHealthKind::Recovered,
            consecutive_failures,
            severity: Severity::Low,
            message: format!("Sensor recovered after {consecutive_failures} failed reads."),
        }
    }

    pub fn stale_verdict(missed_cycles: u32) -> Self {
        Self {
            event_type: SensorHealthKind::StaleVerdict,
            consecutive_failures: missed_cycles,
            severity: Severity::Moderate,
            message: format!(
                "Verdict is stale: {missed_cycles} consecutive cycles without inference."
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brake_thresholds() {
        assert!(BrakeEvent::from_magnitude(0.8, Some(Behavior::Normal)).is_none());

        let moderate = BrakeEvent::from_magnitude(1.2, Some(Behavior::Moderate)).unwrap();
        assert_eq!(moderate.event_type, BrakeKind::Moderate);
        assert_eq!(moderate.severity, Severity::Moderate);
        assert_eq!(moderate.force, 60);
        assert_eq!(moderate.speed, 50);

        let hard = BrakeEvent::from_magnitude(2.4, Some(Behavior::Dangerous)).unwrap();
        assert_eq!(hard.event_type, BrakeKind::Hard);
        assert_eq!(hard.severity, Severity::High);
        assert_eq!(hard.force, 100);
        assert_eq!(hard.speed, 70);
    }

    #[test]
    fn test_module_tag_on_the_wire() {
        let event = ModuleEvent::Brake(BrakeEvent::from_magnitude(2.0, None).unwrap());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["module"], "Brake Checking");
        assert_eq!(json["eventType"], "hard");
        assert_eq!(json["severity"], "high");
        assert!(json["message"].as_str().unwrap().contains("HARD BRAKING"));
    }

    #[test]
    fn test_behavior_event_from_holding_verdict() {
        let verdict = Verdict {
            behavior: None,
            severity: Severity::Low,
            confidence: 0.0,
            stale: false,
            missed_cycles: 0,
            window_index: 7,
            message: "Awaiting a confident classification".to_string(),
        };
        let event = BehaviorEvent::from_verdict(&verdict);
        assert_eq!(event.behavior_class, 0);
        assert_eq!(event.behavior_type, "Holding");
        assert_eq!(event.window_index, 7);
    }

    #[test]
    fn test_event_round_trip() {
        let event = ModuleEvent::SensorHealth(SensorHealthEvent::stale_verdict(6));
        let json = serde_json::to_string(&event).unwrap();
        let back: ModuleEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
