//! Process-wide atomic counters for aitest runs.
//!
//! Counters are bumped silently at the call site. Call [`Metrics::flush`]
//! once at the end of a run to emit them as a single `tracing::info!` event;
//! flushing zeroes them so the next run in the process starts clean.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    cases_invoked: AtomicU64,
    cases_failed: AtomicU64,
    frames_painted: AtomicU64,
    frames_skipped: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            cases_invoked: AtomicU64::new(0),
            cases_failed: AtomicU64::new(0),
            frames_painted: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
        }
    }

    pub fn inc_cases_invoked(&self) {
        self.cases_invoked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cases_failed(&self) {
        self.cases_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_frames_painted(&self) {
        self.frames_painted.fetch_add(1, Ordering::Relaxed);
    }

    /// Throttled or contended renders.
    pub fn inc_frames_skipped(&self) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit and zero every counter.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            cases_invoked = self.cases_invoked.swap(0, Ordering::Relaxed),
            cases_failed = self.cases_failed.swap(0, Ordering::Relaxed),
            frames_painted = self.frames_painted.swap(0, Ordering::Relaxed),
            frames_skipped = self.frames_skipped.swap(0, Ordering::Relaxed),
        );
    }

    pub fn cases_invoked(&self) -> u64 {
        self.cases_invoked.load(Ordering::Relaxed)
    }

    pub fn cases_failed(&self) -> u64 {
        self.cases_failed.load(Ordering::Relaxed)
    }

    pub fn frames_painted(&self) -> u64 {
        self.frames_painted.load(Ordering::Relaxed)
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_independently() {
        let m = Metrics::new();
        m.inc_cases_invoked();
        m.inc_cases_invoked();
        m.inc_cases_failed();
        m.inc_frames_skipped();
        assert_eq!(m.cases_invoked(), 2);
        assert_eq!(m.cases_failed(), 1);
        assert_eq!(m.frames_painted(), 0);
        assert_eq!(m.frames_skipped(), 1);
    }

    #[test]
    #[tracing_test::traced_test]
    fn flush_emits_then_zeroes() {
        let m = Metrics::new();
        m.inc_cases_invoked();
        m.inc_cases_invoked();
        m.inc_frames_painted();
        m.flush();
        assert!(logs_contain("cases_invoked=2"));
        assert_eq!(m.cases_invoked(), 0);
        assert_eq!(m.frames_painted(), 0);
    }
}
