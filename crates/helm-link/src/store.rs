use helm_proto::TelemetryRecord;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Latest telemetry paired with the connectivity flag it was observed under.
#[derive(Debug, Clone, Copy, Default)]
pub struct Snapshot {
    pub record: TelemetryRecord,
    pub connected: bool,
    pub updated_at: Option<Instant>,
}

impl Snapshot {
    /// Time since the last good frame.
    pub fn age(&self) -> Option<Duration> {
        self.updated_at.map(|t| t.elapsed())
    }
}

/// Shared telemetry state. The link machine is the only writer; any number of
/// readers may take snapshots from other tasks or threads.
#[derive(Debug, Clone, Default)]
pub struct TelemetryStore {
    inner: Arc<Mutex<Snapshot>>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Snapshot {
        *self.lock()
    }

    pub(crate) fn publish(&self, record: TelemetryRecord) {
        let mut s = self.lock();
        s.record = record;
        s.connected = true;
        s.updated_at = Some(Instant::now());
    }

    pub(crate) fn mark_connected(&self) {
        self.lock().connected = true;
    }

    /// Keeps the last record so readers can still show it.
    pub(crate) fn mark_disconnected(&self) {
        self.lock().connected = false;
    }

    // A panicking reader cannot leave a Snapshot half-written, so a poisoned
    // lock still holds a usable value.
    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
