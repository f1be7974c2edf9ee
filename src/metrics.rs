use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::types::ScanTotals;

/// Process-wide counters, exposed via `/metrics`
#[derive(Clone)]
pub struct Metrics {
    pub scans_started: Arc<AtomicUsize>,
    pub scans_completed: Arc<AtomicUsize>,
    pub scans_failed: Arc<AtomicUsize>,
    pub scans_cancelled: Arc<AtomicUsize>,
    pub files_scanned: Arc<AtomicU64>,
    pub files_clean: Arc<AtomicU64>,
    pub files_infected: Arc<AtomicU64>,
    pub files_error: Arc<AtomicU64>,
    pub warnings_count: Arc<AtomicUsize>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            scans_started: Arc::new(AtomicUsize::new(0)),
            scans_completed: Arc::new(AtomicUsize::new(0)),
            scans_failed: Arc::new(AtomicUsize::new(0)),
            scans_cancelled: Arc::new(AtomicUsize::new(0)),
            files_scanned: Arc::new(AtomicU64::new(0)),
            files_clean: Arc::new(AtomicU64::new(0)),
            files_infected: Arc::new(AtomicU64::new(0)),
            files_error: Arc::new(AtomicU64::new(0)),
            warnings_count: Arc::new(AtomicUsize::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_scans_started(&self) {
        self.scans_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_scans_completed(&self) {
        self.scans_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_scans_failed(&self) {
        self.scans_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_scans_cancelled(&self) {
        self.scans_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_totals(&self, totals: &ScanTotals) {
        self.files_scanned.fetch_add(totals.scanned(), Ordering::Relaxed);
        self.files_clean.fetch_add(totals.clean, Ordering::Relaxed);
        self.files_infected.fetch_add(totals.infected, Ordering::Relaxed);
        self.files_error.fetch_add(totals.errors, Ordering::Relaxed);
    }

    pub fn add_warnings(&self, count: usize) {
        self.warnings_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scans_started: self.scans_started.load(Ordering::Relaxed),
            scans_completed: self.scans_completed.load(Ordering::Relaxed),
            scans_failed: self.scans_failed.load(Ordering::Relaxed),
            scans_cancelled: self.scans_cancelled.load(Ordering::Relaxed),
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            files_clean: self.files_clean.load(Ordering::Relaxed),
            files_infected: self.files_infected.load(Ordering::Relaxed),
            files_error: self.files_error.load(Ordering::Relaxed),
            warnings_count: self.warnings_count.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub scans_started: usize,
    pub scans_completed: usize,
    pub scans_failed: usize,
    pub scans_cancelled: usize,
    pub files_scanned: u64,
    pub files_clean: u64,
    pub files_infected: u64,
    pub files_error: u64,
    pub warnings_count: usize,
    pub uptime_seconds: u64,
}
