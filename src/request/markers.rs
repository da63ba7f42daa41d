//! Per-request event log.
//!
//! Every lifecycle transition appends a marker. On finish, requests that
//! took longer than the slow threshold dump their full timeline through
//! the `log` facade; everything else is discarded. The log doubles as the
//! observable trace the integration suites assert against.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default slow-request threshold in milliseconds.
pub const DEFAULT_SLOW_THRESHOLD_MS: u64 = 3_000;

/// One recorded lifecycle event.
#[derive(Debug, Clone)]
pub struct Marker {
    /// Event name, e.g. `cache-hit` or `network-queue-take`.
    pub name: String,
    /// Label of the thread that recorded the event.
    pub thread: String,
    /// When the event was recorded.
    pub at: Instant,
}

/// Append-only marker log with a slow-request dump on finish.
#[derive(Debug)]
pub(crate) struct MarkerLog {
    events: Mutex<Vec<Marker>>,
    slow_threshold_ms: AtomicU64,
}

impl MarkerLog {
    pub(crate) fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            slow_threshold_ms: AtomicU64::new(DEFAULT_SLOW_THRESHOLD_MS),
        }
    }

    /// Adopt the owning queue's configured threshold.
    pub(crate) fn set_slow_threshold(&self, threshold_ms: u64) {
        self.slow_threshold_ms.store(threshold_ms, Ordering::Relaxed);
    }

    pub(crate) fn add(&self, name: &str) {
        let marker = Marker {
            name: name.to_string(),
            thread: thread_label(),
            at: Instant::now(),
        };
        self.lock_events().push(marker);
    }

    /// Finalize the log under `header` (typically method and URL). Dumps
    /// the timeline via `log::debug!` when the request ran longer than
    /// the slow threshold.
    pub(crate) fn finish(&self, header: &str) {
        let events = self.lock_events();
        let Some(first) = events.first() else {
            return;
        };
        let Some(last) = events.last() else {
            return;
        };
        let duration = last.at.duration_since(first.at);
        let threshold = Duration::from_millis(self.slow_threshold_ms.load(Ordering::Relaxed));
        if duration < threshold {
            return;
        }
        log::debug!("{} took {}ms", header, duration.as_millis());
        let start = first.at;
        for marker in events.iter() {
            log::debug!(
                "  (+{:>5}ms) [{}] {}",
                marker.at.duration_since(start).as_millis(),
                marker.thread,
                marker.name
            );
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<Marker> {
        self.lock_events().clone()
    }

    fn lock_events(&self) -> std::sync::MutexGuard<'_, Vec<Marker>> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn thread_label() -> String {
    let current = std::thread::current();
    match current.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", current.id()),
    }
}
