// ═══════════════════════════════════════════════════════════════
// SCAN METRICS - A tally of every verdict we handed out
// ═══════════════════════════════════════════════════════════════
//
// One atomic counter per outcome kind. The scanner bumps them as results
// come in; main logs the snapshot as JSON when the run is over. Atomics
// because the detection futures run concurrently when --concurrency > 1,
// and a mutex around seven integers would be embarrassing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::models::ScanOutcome;

/// What gets serialized at the end of a run
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub domains_scanned: u64,
    pub not_found: u64,
    pub timed_out: u64,
    pub unreachable: u64,
    pub read_failed: u64,
    pub takeovers_attempted: u64,
    pub unsupported: u64,
    pub missing_credentials: u64,
    pub resources_created: u64,
    pub elapsed_seconds: f64,
    pub domains_per_second: f64,
}

pub struct ScanMetrics {
    not_found: AtomicU64,
    timed_out: AtomicU64,
    unreachable: AtomicU64,
    read_failed: AtomicU64,
    takeovers_attempted: AtomicU64,
    unsupported: AtomicU64,
    missing_credentials: AtomicU64,
    resources_created: AtomicU64,
    start_time: Instant,
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self {
            not_found: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            unreachable: AtomicU64::new(0),
            read_failed: AtomicU64::new(0),
            takeovers_attempted: AtomicU64::new(0),
            unsupported: AtomicU64::new(0),
            missing_credentials: AtomicU64::new(0),
            resources_created: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, outcome: &ScanOutcome) {
        let counter = match outcome {
            ScanOutcome::NotFound { .. } => &self.not_found,
            ScanOutcome::TimedOut { .. } => &self.timed_out,
            ScanOutcome::Unreachable { .. } => &self.unreachable,
            ScanOutcome::ReadFailed { .. } => &self.read_failed,
            ScanOutcome::TakeoverAttempted { resources, .. } => {
                self.resources_created
                    .fetch_add(resources.len() as u64, Ordering::Relaxed);
                &self.takeovers_attempted
            }
            ScanOutcome::Unsupported { .. } => &self.unsupported,
            ScanOutcome::MissingCredentials { .. } => &self.missing_credentials,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let not_found = self.not_found.load(Ordering::Relaxed);
        let timed_out = self.timed_out.load(Ordering::Relaxed);
        let unreachable = self.unreachable.load(Ordering::Relaxed);
        let read_failed = self.read_failed.load(Ordering::Relaxed);
        let takeovers_attempted = self.takeovers_attempted.load(Ordering::Relaxed);
        let unsupported = self.unsupported.load(Ordering::Relaxed);
        let missing_credentials = self.missing_credentials.load(Ordering::Relaxed);

        let domains_scanned = not_found
            + timed_out
            + unreachable
            + read_failed
            + takeovers_attempted
            + unsupported
            + missing_credentials;

        let elapsed = self.start_time.elapsed().as_secs_f64();
        let domains_per_second = if elapsed > 0.0 {
            domains_scanned as f64 / elapsed
        } else {
            0.0
        };

        MetricsSnapshot {
            domains_scanned,
            not_found,
            timed_out,
            unreachable,
            read_failed,
            takeovers_attempted,
            unsupported,
            missing_credentials,
            resources_created: self.resources_created.load(Ordering::Relaxed),
            elapsed_seconds: elapsed,
            domains_per_second,
        }
    }
}
