//! Shared health state for the /health endpoint.
//! Updated by the crawl and normalize stages in `main`.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Shared pipeline progress. Written by the pipeline, read by API.
#[derive(Default)]
pub struct HealthState {
    /// True while source adapters are crawling.
    pub crawl_running: AtomicBool,
    /// Unix seconds of the last finished crawl (0 = none).
    pub last_crawl_finished_at: AtomicI64,
    /// Raw captures appended during the current process.
    pub captures_written: AtomicU64,
    /// Listings inserted or replaced by the last normalize run.
    pub listings_promoted: AtomicU64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct HealthReport {
    pub status: &'static str,
    pub crawl_running: bool,
    pub last_crawl_finished_at: Option<DateTime<Utc>>,
    pub captures_written: u64,
    pub listings_promoted: u64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_crawl_running(&self, v: bool) {
        self.crawl_running.store(v, Ordering::Relaxed);
    }

    pub fn mark_crawl_finished(&self, at: DateTime<Utc>) {
        self.last_crawl_finished_at.store(at.timestamp(), Ordering::Relaxed);
        self.set_crawl_running(false);
    }

    pub fn add_captures_written(&self, n: u64) {
        self.captures_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_listings_promoted(&self, n: u64) {
        self.listings_promoted.store(n, Ordering::Relaxed);
    }

    pub fn report(&self) -> HealthReport {
        let finished = self.last_crawl_finished_at.load(Ordering::Relaxed);
        HealthReport {
            status: "ok",
            crawl_running: self.crawl_running.load(Ordering::Relaxed),
            last_crawl_finished_at: (finished > 0).then(|| DateTime::from_timestamp(finished, 0)).flatten(),
            captures_written: self.captures_written.load(Ordering::Relaxed),
            listings_promoted: self.listings_promoted.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_reflects_pipeline_progress() {
        let health = HealthState::new();
        assert_eq!(health.report().last_crawl_finished_at, None);

        health.set_crawl_running(true);
        health.add_captures_written(3);
        health.add_captures_written(2);
        assert!(health.report().crawl_running);

        let at = DateTime::from_timestamp(1_760_000_000, 0).unwrap();
        health.mark_crawl_finished(at);
        health.set_listings_promoted(4);
        let report = health.report();
        assert!(!report.crawl_running);
        assert_eq!(report.last_crawl_finished_at, Some(at));
        assert_eq!(report.captures_written, 5);
        assert_eq!(report.listings_promoted, 4);
    }
}
