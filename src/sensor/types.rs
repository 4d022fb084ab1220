//! Sample types for the 6-axis motion stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timestamped 6-axis motion reading.
///
/// Acceleration is in g, angular velocity in degrees per second, matching
/// the ±2 g / ±250 °/s ranges the sensor is configured for. A sample is
/// immutable once read; downstream stages copy it into windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Timestamp assigned at acquisition
    pub timestamp: DateTime<Utc>,
    /// Linear acceleration [x, y, z] in g
    pub accel: [f64; 3],
    /// Angular velocity [x, y, z] in deg/s
    pub gyro: [f64; 3],
}

impl Sample {
    /// Create a sample timestamped now.
    pub fn new(accel: [f64; 3], gyro: [f64; 3]) -> Self {
        Self {
            timestamp: Utc::now(),
            accel,
            gyro,
        }
    }

    /// Create a sample with an explicit timestamp.
    pub fn at(timestamp: DateTime<Utc>, accel: [f64; 3], gyro: [f64; 3]) -> Self {
        Self {
            timestamp,
            accel,
            gyro,
        }
    }

    /// Euclidean norm of the acceleration vector, in g.
    pub fn accel_magnitude(&self) -> f64 {
        let [x, y, z] = self.accel;
        (x * x + y * y + z * z).sqrt()
    }

    /// Euclidean norm of the angular-velocity vector, in deg/s.
    pub fn gyro_magnitude(&self) -> f64 {
        let [x, y, z] = self.gyro;
        (x * x + y * y + z * z).sqrt()
    }
}
