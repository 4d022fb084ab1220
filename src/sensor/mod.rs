//! Sample acquisition for the drivesense agent.
//!
//! The hardware backend reads an MPU6050 over the I2C bus and is only
//! available on Linux. The synthetic and replay sources exist so the
//! pipeline can run (and be tested) on machines without the bus.

pub mod replay;
pub mod synthetic;
pub mod types;

#[cfg(target_os = "linux")]
pub mod mpu6050;

pub use replay::ReplaySource;
pub use synthetic::SyntheticSource;
pub use types::Sample;

#[cfg(target_os = "linux")]
pub use mpu6050::Mpu6050Source;

use thiserror::Error;

/// Failures surfaced by a sample read.
#[derive(Debug, Error)]
pub enum ReadError {
    /// Bus-level transaction failure (open, write, or register read).
    #[error("bus transaction failed: {0}")]
    Bus(String),

    /// The device has not completed its configuration sequence.
    #[error("sensor not initialized")]
    NotInitialized,

    /// A replayed record could not be decoded.
    #[error("malformed sample record: {0}")]
    Malformed(String),

    /// A finite source has no more samples. Ends the stream cleanly.
    #[error("sample stream exhausted")]
    EndOfStream,
}

/// A source of timestamped motion samples.
///
/// `read` must complete well within the sampling interval; transient
/// failures come back as a [`ReadError`] so the caller can apply its own
/// retry and backoff policy instead of unwinding the loop.
pub trait SampleSource: Send {
    /// Human-readable description for startup logging.
    fn describe(&self) -> String;

    /// Acquire one sample.
    fn read(&mut self) -> Result<Sample, ReadError>;
}
