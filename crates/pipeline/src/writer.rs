//! Bounded background writer for best-effort persistence.
//!
//! Telemetry records and profile updates are queued on a fixed-capacity
//! channel and applied by one worker task. `submit` never waits: a full
//! queue drops the job, logs a warning and bumps the dropped counter.
//! Failures inside the worker are logged and swallowed. Telemetry appends
//! run on the blocking pool.

use crate::profile::{ProfileUpdate, apply_updates};
use maitre_core::ProfileStore;
use maitre_telemetry::{TelemetryRecord, TelemetryRecorder};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Work for the background writer.
#[derive(Debug, Clone)]
pub enum WriteJob {
    Telemetry(TelemetryRecord),
    Profile {
        user_id: String,
        updates: Vec<ProfileUpdate>,
    },
}

impl WriteJob {
    fn kind(&self) -> &'static str {
        match self {
            Self::Telemetry(_) => "telemetry",
            Self::Profile { .. } => "profile",
        }
    }
}

enum Envelope {
    Job(WriteJob),
    Flush(oneshot::Sender<()>),
}

pub struct BackgroundWriter {
    tx: mpsc::Sender<Envelope>,
    dropped: Arc<AtomicU64>,
    worker: JoinHandle<()>,
}

impl BackgroundWriter {
    /// Start the worker. `telemetry = None` discards telemetry jobs.
    pub fn spawn(
        capacity: usize,
        telemetry: Option<Arc<TelemetryRecorder>>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run(rx, telemetry, profiles));
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            worker,
        }
    }

    /// Queue a job without waiting. Returns false if it was dropped.
    pub fn submit(&self, job: WriteJob) -> bool {
        let kind = job.kind();
        match self.tx.try_send(Envelope::Job(job)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(kind, dropped, "Background queue full, dropping job");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(kind, "Background writer stopped, dropping job");
                false
            }
        }
    }

    /// Jobs dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Wait until every job submitted before this call has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Envelope::Flush(done_tx)).await.is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    /// Drain the queue and stop the worker.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            warn!(error = %e, "Background writer task failed");
        }
    }
}

async fn run(
    mut rx: mpsc::Receiver<Envelope>,
    telemetry: Option<Arc<TelemetryRecorder>>,
    profiles: Arc<dyn ProfileStore>,
) {
    while let Some(envelope) = rx.recv().await {
        match envelope {
            Envelope::Job(WriteJob::Telemetry(record)) => {
                let Some(recorder) = &telemetry else { continue };
                // Sinks do blocking file I/O; keep it off the async workers.
                let recorder = Arc::clone(recorder);
                let user_id = record.user_id.clone();
                let written = tokio::task::spawn_blocking(move || recorder.append(&record)).await;
                match written {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(user_id = %user_id, error = %e, "Failed to write telemetry");
                    }
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Telemetry write task failed");
                    }
                }
            }
            Envelope::Job(WriteJob::Profile { user_id, updates }) => {
                if let Err(e) = apply_updates(profiles.as_ref(), &user_id, &updates).await {
                    warn!(user_id = %user_id, error = %e, "Failed to update profile");
                }
            }
            Envelope::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Background writer drained");
}
