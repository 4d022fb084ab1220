//! Best-effort event delivery to the relay endpoint.
//!
//! Events go onto a bounded channel and are posted from a dedicated worker
//! thread, so the sampling loop never waits on the network. A full queue
//! drops the event and counts the drop; a failed POST is logged and not
//! retried.

use crate::events::ModuleEvent;
use crate::stats::SharedSessionStats;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Emitter configuration.
#[derive(Debug, Clone)]
pub struct EmitterConfig {
    /// POST target, e.g. `http://localhost:8000/emit`
    pub url: String,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Events held while the worker is busy
    pub queue_capacity: usize,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000/emit".to_string(),
            timeout_ms: 500,
            queue_capacity: 256,
        }
    }
}

/// The emitter worker could not be started.
#[derive(Debug, Error)]
#[error("failed to start emitter worker: {0}")]
pub struct EmitError(String);

/// Envelope adding the device identity to each outbound event.
#[derive(Debug, Serialize)]
struct OutboundEvent<'a> {
    device: &'a str,
    #[serde(flatten)]
    event: &'a ModuleEvent,
}

/// Handle owned by the controller; cheap to call from the sampling loop.
pub struct EmitterHandle {
    sender: Option<Sender<ModuleEvent>>,
    worker: Option<JoinHandle<()>>,
    stats: SharedSessionStats,
}

impl EmitterHandle {
    /// Spawn the worker thread and return the sending handle.
    pub fn spawn(config: EmitterConfig, stats: SharedSessionStats) -> Result<Self, EmitError> {
        let (sender, receiver) = bounded(config.queue_capacity);
        let device_id = device_id();
        let worker_stats = stats.clone();
        let worker = thread::Builder::new()
            .name("drivesense-emitter".to_string())
            .spawn(move || emit_loop(config, device_id, receiver, worker_stats))
            .map_err(|e| EmitError(e.to_string()))?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            stats,
        })
    }

    /// Queue one event. Never blocks.
    pub fn emit(&self, event: ModuleEvent) {
        let Some(sender) = &self.sender else { return };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.stats.record_event_dropped();
                warn!("emitter queue full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.stats.record_event_dropped();
                warn!("emitter worker gone, dropping event");
            }
        }
    }

    /// Close the queue and wait for the worker to drain.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for EmitterHandle {
    fn drop(&mut self) {
        self.close();
    }
}

fn emit_loop(
    config: EmitterConfig,
    device_id: String,
    receiver: Receiver<ModuleEvent>,
    stats: SharedSessionStats,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!("emitter disabled, runtime creation failed: {e}");
            return;
        }
    };
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_millis(config.timeout_ms))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!("emitter disabled, HTTP client creation failed: {e}");
            return;
        }
    };

    info!(url = %config.url, device = %device_id, "event emission enabled");

    for event in receiver.iter() {
        let outbound = OutboundEvent {
            device: &device_id,
            event: &event,
        };
        match runtime.block_on(client.post(&config.url).json(&outbound).send()) {
            Ok(response) if response.status().is_success() => {
                stats.record_event_emitted();
            }
            Ok(response) => {
                stats.record_event_dropped();
                warn!(status = %response.status(), "relay rejected event");
            }
            Err(e) => {
                stats.record_event_dropped();
                warn!("event delivery failed: {e}");
            }
        }
    }
}

/// Hostname plus a short random suffix, stable for one process.
fn device_id() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let suffix: String = uuid::Uuid::new_v4().to_string().chars().take(8).collect();
    format!("drivesense-{host}-{suffix}")
}
