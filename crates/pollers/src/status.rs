//! Shared poller status, read by the health endpoint (spec.md §6 `GET
//! /health` → `{status: ok, poller?: {running, failures, cursor}}`).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct PollerSnapshot {
    pub running: bool,
    pub failures: u32,
    pub cursor: DateTime<Utc>,
}

/// Cross-task status: the poller loop writes, the health handler reads.
pub struct PollerStatus {
    running: AtomicBool,
    failures: AtomicU32,
    cursor: Mutex<DateTime<Utc>>,
}

impl PollerStatus {
    pub fn new(initial_cursor: DateTime<Utc>) -> Self {
        Self {
            running: AtomicBool::new(true),
            failures: AtomicU32::new(0),
            cursor: Mutex::new(initial_cursor),
        }
    }

    pub fn snapshot(&self) -> PollerSnapshot {
        PollerSnapshot {
            running: self.running.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cursor: *self.cursor.lock().expect("poller status mutex poisoned"),
        }
    }

    pub(crate) fn record_success(&self, cursor: DateTime<Utc>) {
        self.failures.store(0, Ordering::Relaxed);
        *self.cursor.lock().expect("poller status mutex poisoned") = cursor;
    }

    /// Returns the new failure count, for the caller's backoff calculation.
    pub(crate) fn record_failure(&self) -> u32 {
        self.failures.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_resets_failures_and_advances_cursor() {
        let status = PollerStatus::new(Utc::now());
        status.record_failure();
        status.record_failure();
        let next = Utc::now();
        status.record_success(next);
        let snap = status.snapshot();
        assert_eq!(snap.failures, 0);
        assert_eq!(snap.cursor, next);
    }

    #[test]
    fn failures_accumulate() {
        let status = PollerStatus::new(Utc::now());
        assert_eq!(status.record_failure(), 1);
        assert_eq!(status.record_failure(), 2);
    }
}
