//! Per-document generation status.
//!
//! ```text
//! ready ──generate──▶ loading ──first token──▶ generating ──end──▶ ready
//!   ▲                                                              │
//!   └──────────────────────────── cancel ◀─────────────────────────┘
//! no-connection ◀── failed probe      successful probe ──▶ ready
//! ```

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use modelpad_types::GenerationStatus;

/// Shared status value with change notifications.
///
/// Setting the current value again is a no-op and does not notify.
pub struct StatusCell {
    current: RwLock<GenerationStatus>,
    tx: broadcast::Sender<GenerationStatus>,
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new(GenerationStatus::default())
    }
}

impl StatusCell {
    pub fn new(initial: GenerationStatus) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            current: RwLock::new(initial),
            tx,
        }
    }

    pub fn get(&self) -> GenerationStatus {
        *self.current.read()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GenerationStatus> {
        self.tx.subscribe()
    }

    /// Set the status. Returns whether it changed.
    pub fn set(&self, status: GenerationStatus) -> bool {
        let mut current = self.current.write();
        if *current == status {
            return false;
        }
        debug!(from = %*current, to = %status, "generation status");
        *current = status;
        drop(current);
        let _ = self.tx.send(status);
        true
    }

    /// A generation was requested.
    pub fn begin(&self) {
        self.set(GenerationStatus::Loading);
    }

    /// The first event of a stream arrived.
    pub fn streaming(&self) {
        self.set(GenerationStatus::Generating);
    }

    /// The stream ended normally or was cancelled.
    pub fn finish(&self) {
        self.set(GenerationStatus::Ready);
    }

    /// Record a model-listing probe. Only a probe that found at least one
    /// model leaves `no-connection`.
    pub fn probe_result(&self, models_found: usize) {
        if models_found > 0 {
            if self.get() == GenerationStatus::NoConnection {
                self.set(GenerationStatus::Ready);
            }
        } else {
            self.set(GenerationStatus::NoConnection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let cell = StatusCell::new(GenerationStatus::Ready);
        let mut rx = cell.subscribe();
        cell.begin();
        cell.streaming();
        cell.streaming();
        cell.finish();
        assert_eq!(rx.try_recv().unwrap(), GenerationStatus::Loading);
        assert_eq!(rx.try_recv().unwrap(), GenerationStatus::Generating);
        assert_eq!(rx.try_recv().unwrap(), GenerationStatus::Ready);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_probe_transitions() {
        let cell = StatusCell::default();
        assert_eq!(cell.get(), GenerationStatus::NoConnection);
        cell.probe_result(0);
        assert_eq!(cell.get(), GenerationStatus::NoConnection);
        cell.probe_result(2);
        assert_eq!(cell.get(), GenerationStatus::Ready);

        // A successful probe mid-generation does not reset the status.
        cell.begin();
        cell.probe_result(1);
        assert_eq!(cell.get(), GenerationStatus::Loading);
        cell.probe_result(0);
        assert_eq!(cell.get(), GenerationStatus::NoConnection);
    }
}
