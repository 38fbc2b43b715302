use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::adapter::{Cursor, Page, SourceAdapter};
use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::store::RawCaptureStore;
use crate::types::SourceId;

/// Per-source outcome of one crawl run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlStats {
    pub source: SourceId,
    pub pages_fetched: u64,
    pub pages_skipped: u64,
    /// Cursors of index pages that failed after all retries.
    pub skipped_pages: Vec<Cursor>,
    pub items_captured: u64,
    pub items_skipped: u64,
    pub policy_violations: u64,
    pub capture_write_failures: u64,
    pub cancelled: bool,
}

impl CrawlStats {
    pub fn new(source: SourceId) -> Self {
        Self {
            source,
            pages_fetched: 0,
            pages_skipped: 0,
            skipped_pages: Vec::new(),
            items_captured: 0,
            items_skipped: 0,
            policy_violations: 0,
            capture_write_failures: 0,
            cancelled: false,
        }
    }

    fn absorb(&mut self, other: CrawlStats) {
        self.pages_fetched += other.pages_fetched;
        self.pages_skipped += other.pages_skipped;
        self.skipped_pages.extend(other.skipped_pages);
        self.items_captured += other.items_captured;
        self.items_skipped += other.items_skipped;
        self.policy_violations += other.policy_violations;
        self.capture_write_failures += other.capture_write_failures;
        self.cancelled |= other.cancelled;
    }
}

/// Drives every source adapter to completion, writing each capture to the
/// raw store as soon as its page returns.
#[derive(Clone)]
pub struct Crawler {
    fetcher: Arc<Fetcher>,
    raw_store: Arc<dyn RawCaptureStore>,
    workers_per_source: usize,
    user_agent: String,
}

impl Crawler {
    pub fn new(
        fetcher: Arc<Fetcher>,
        raw_store: Arc<dyn RawCaptureStore>,
        workers_per_source: usize,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            raw_store,
            workers_per_source: workers_per_source.max(1),
            user_agent: user_agent.into(),
        }
    }

    /// Crawl all sources concurrently. A failing source never stops the others.
    pub async fn crawl_all(&self, adapters: Vec<Arc<dyn SourceAdapter>>) -> Vec<CrawlStats> {
        let mut tasks = JoinSet::new();
        for adapter in adapters {
            let crawler = self.clone();
            tasks.spawn(async move { crawler.crawl_source(adapter).await });
        }

        let mut all = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(stats) => all.push(stats),
                Err(e) => error!("[CRAWL] source task panicked: {e}"),
            }
        }
        all.sort_by_key(|s| s.source);
        all
    }

    pub async fn crawl_source(&self, adapter: Arc<dyn SourceAdapter>) -> CrawlStats {
        let source = adapter.source();
        let mut stats = CrawlStats::new(source);

        match self.fetcher.fetch_policy(source, adapter.base_url(), &self.user_agent).await {
            Ok(policy) => self.fetcher.coordinator().set_policy(source, policy),
            Err(_) => {
                stats.cancelled = true;
                return stats;
            }
        }

        let lanes = adapter.start_cursors();
        let workers = self.workers_per_source.min(lanes.len()).max(1);
        info!(source = %source, lanes = lanes.len(), workers, "[CRAWL] starting");
        let queue = Arc::new(Mutex::new(VecDeque::from(lanes)));

        let mut tasks = JoinSet::new();
        for _ in 0..workers {
            let crawler = self.clone();
            let adapter = Arc::clone(&adapter);
            let queue = Arc::clone(&queue);
            tasks.spawn(async move { crawler.work_lanes(adapter, queue).await });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(partial) => stats.absorb(partial),
                Err(e) => error!(source = %source, "[CRAWL] lane worker panicked: {e}"),
            }
        }
        stats.cancelled |= self.fetcher.is_cancelled();

        info!(
            source = %source,
            pages = stats.pages_fetched,
            pages_skipped = stats.pages_skipped,
            items = stats.items_captured,
            items_skipped = stats.items_skipped,
            policy_violations = stats.policy_violations,
            write_failures = stats.capture_write_failures,
            cancelled = stats.cancelled,
            "[CRAWL] finished"
        );
        stats
    }

    async fn work_lanes(&self, adapter: Arc<dyn SourceAdapter>, queue: Arc<Mutex<VecDeque<Cursor>>>) -> CrawlStats {
        let mut stats = CrawlStats::new(adapter.source());
        loop {
            let next = match queue.lock() {
                Ok(mut q) => q.pop_front(),
                Err(_) => None,
            };
            let Some(start) = next else { break };
            self.walk_lane(adapter.as_ref(), start, &mut stats).await;
            if stats.cancelled {
                break;
            }
        }
        stats
    }

    /// Follow one lane page by page. A page that fails after retries is
    /// skipped and the walk moves on to the following cursor.
    async fn walk_lane(&self, adapter: &dyn SourceAdapter, start: Cursor, stats: &mut CrawlStats) {
        let source = adapter.source();
        let mut cursor = Some(start);

        while let Some(current) = cursor {
            if self.fetcher.is_cancelled() {
                stats.cancelled = true;
                return;
            }
            match adapter.fetch_page(&current).await {
                Ok(page) => {
                    stats.pages_fetched += 1;
                    cursor = page.next.clone();
                    self.persist(source, page, stats).await;
                }
                Err(FetchError::Cancelled) => {
                    stats.cancelled = true;
                    return;
                }
                Err(err @ FetchError::PolicyViolation { .. }) => {
                    stats.policy_violations += 1;
                    stats.pages_skipped += 1;
                    stats.skipped_pages.push(current);
                    warn!(source = %source, "[CRAWL] lane abandoned: {err}");
                    return;
                }
                Err(err) => {
                    warn!(source = %source, lane = current.lane, page = current.page, "[CRAWL] page skipped: {err}");
                    stats.pages_skipped += 1;
                    cursor = adapter.next_cursor(&current);
                    stats.skipped_pages.push(current);
                }
            }
        }
    }

    async fn persist(&self, source: SourceId, page: Page, stats: &mut CrawlStats) {
        for skipped in &page.skipped {
            stats.items_skipped += 1;
            if matches!(skipped.error, FetchError::PolicyViolation { .. }) {
                stats.policy_violations += 1;
            }
        }
        for capture in &page.captures {
            match self.raw_store.append(capture).await {
                Ok(true) => stats.items_captured += 1,
                Ok(false) => debug!(source = %source, id = %capture.source_listing_id, "capture already stored"),
                Err(e) => {
                    stats.capture_write_failures += 1;
                    error!(source = %source, id = %capture.source_listing_id, "[CRAWL] raw write failed: {e}");
                }
            }
        }
    }
}
