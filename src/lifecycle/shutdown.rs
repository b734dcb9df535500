//! Drain coordination.
//!
//! Shutdown here is a drain, not a stop: the acceptance loop closes the
//! listener, the limiter sweeper exits, and in-flight splices get a bounded
//! window to finish on their own. This module carries the one bit of state
//! that starts that sequence.
//!
//! Built on a watch channel so an observer that starts looking after the
//! drain began still sees it; a broadcast would lose the event for late
//! subscribers.

use tokio::sync::watch;

/// Starts the drain sequence. One per process, owned by whatever translates
/// OS signals into shutdown.
pub struct DrainController {
    tx: watch::Sender<bool>,
}

impl DrainController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Hand out an observer for the drain state.
    pub fn signal(&self) -> DrainSignal {
        DrainSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Begin the drain. Idempotent; every observer wakes exactly once.
    pub fn begin_drain(&self) {
        if !*self.tx.borrow() {
            tracing::info!("Drain initiated");
        }
        self.tx.send_replace(true);
    }
}

impl Default for DrainController {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer half of the drain state.
#[derive(Clone)]
pub struct DrainSignal {
    rx: watch::Receiver<bool>,
}

impl DrainSignal {
    /// Wait until the drain begins. Resolves immediately when it already
    /// has. A dropped controller counts as a drain; the process is exiting
    /// either way.
    pub async fn draining(&mut self) {
        let _ = self.rx.wait_for(|draining| *draining).await;
    }
}
