//! crates/marginalia_core/src/tracker.rs
//!
//! Reading-time tracking. An independent periodic task reporting presence
//! to the collector; coupled to the reader lifecycle only, never to
//! selection or annotation state. Everything here is best-effort: tracking
//! must never block or fail the reader.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ports::BackendService;

/// Fixed delay between presence heartbeats.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Handle to the spawned heartbeat task.
pub struct SessionTracker {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    session_id: Option<String>,
}

impl SessionTracker {
    /// Requests a reading session for the document and starts the heartbeat
    /// task. A failed session start is logged, not retried; no heartbeat is
    /// ever sent for a session that never started.
    pub async fn start(backend: Arc<dyn BackendService>, doc_id: &str) -> Self {
        let session_id = match backend.start_reading_session(doc_id).await {
            Ok(session) => {
                info!(session_id = %session.id, doc_id, "reading session started");
                Some(session.id)
            }
            Err(err) => {
                warn!(error = %err, doc_id, "reading session not started; tracking disabled");
                None
            }
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(heartbeat_loop(
            backend,
            session_id.clone(),
            cancel.clone(),
        ));
        Self {
            cancel,
            task,
            session_id,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Stops the interval after one final best-effort heartbeat.
    pub async fn stop(self) {
        self.cancel.cancel();
        if self.task.await.is_err() {
            warn!("heartbeat task panicked");
        }
    }
}

async fn heartbeat_loop(
    backend: Arc<dyn BackendService>,
    session_id: Option<String>,
    cancel: CancellationToken,
) {
    let Some(session_id) = session_id else {
        return;
    };

    let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    // A tokio interval's first tick completes immediately; the session
    // start itself already marked presence, so consume it.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Exactly one final heartbeat before teardown.
                send_heartbeat(backend.as_ref(), &session_id).await;
                debug!(%session_id, "reading session tracker stopped");
                return;
            }
            _ = interval.tick() => {
                send_heartbeat(backend.as_ref(), &session_id).await;
            }
        }
    }
}

/// Fire-and-forget: a failure is logged, not retried, and does not stop the
/// interval.
async fn send_heartbeat(backend: &dyn BackendService, session_id: &str) {
    match backend.heartbeat(session_id).await {
        Ok(session) => {
            debug!(session_id, duration = session.duration_seconds, "heartbeat sent")
        }
        Err(err) => warn!(error = %err, session_id, "heartbeat failed"),
    }
}
