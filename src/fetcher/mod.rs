pub mod latency;
pub mod transport;

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ROBOTS_PATH;
use crate::coordinator::{Coordinator, CrawlPolicy, Outcome};
use crate::error::FetchError;
use crate::types::SourceId;

pub use latency::LatencyStats;
pub use transport::{HttpResponse, ReqwestTransport, Transport};

/// Permit-gated, retrying GET shared by every source adapter.
pub struct Fetcher {
    coordinator: Arc<Coordinator>,
    transport: Arc<dyn Transport>,
    latency: Arc<LatencyStats>,
    cancel: CancellationToken,
    max_attempts: u32,
}

impl Fetcher {
    pub fn new(
        coordinator: Arc<Coordinator>,
        transport: Arc<dyn Transport>,
        latency: Arc<LatencyStats>,
        cancel: CancellationToken,
        max_attempts: u32,
    ) -> Self {
        Self {
            coordinator,
            transport,
            latency,
            cancel,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// GET `url` for `source`, acquiring a permit before every attempt.
    ///
    /// Transient, blocked and rate-limited failures are retried up to
    /// `max_attempts` times in total; the coordinator's escalated spacing is
    /// the only backoff. Policy violations and other statuses return at once.
    pub async fn fetch(&self, source: SourceId, url: &Url) -> Result<HttpResponse, FetchError> {
        let mut last_err = None;

        for attempt in 1..=self.max_attempts {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                permit = self.coordinator.acquire(source, url) => permit?,
            };

            let started = Instant::now();
            match self.transport.get(url, permit.identity).await {
                Ok(resp) => {
                    self.latency.record(started.elapsed());
                    self.coordinator.report_outcome(source, Outcome::Success);
                    debug!(source = %source, url = %url, attempt, "fetched");
                    return Ok(resp);
                }
                Err(err) => {
                    self.coordinator.report_outcome(source, Outcome::from(&err));
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    warn!(
                        source = %source,
                        url = %url,
                        attempt,
                        max_attempts = self.max_attempts,
                        "fetch failed: {err}"
                    );
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| FetchError::Transient {
            url: url.to_string(),
            reason: "no attempt made".to_string(),
        }))
    }

    /// Load the source's exclusion rules. A missing robots.txt (4xx) allows
    /// everything. A server error, block or unreachable host disallows
    /// everything for this crawl.
    pub async fn fetch_policy(&self, source: SourceId, base: &Url, agent: &str) -> Result<CrawlPolicy, FetchError> {
        let robots_url = base.join(ROBOTS_PATH).map_err(|e| FetchError::Status {
            url: format!("{base}{ROBOTS_PATH}: {e}"),
            status: 0,
        })?;

        match self.fetch(source, &robots_url).await {
            Ok(resp) => {
                let body = String::from_utf8_lossy(&resp.body);
                Ok(CrawlPolicy::parse(&body, agent))
            }
            Err(FetchError::Status { status, .. }) => {
                info!(source = %source, status, "[COORD] no robots.txt, allowing all paths");
                Ok(CrawlPolicy::allow_all())
            }
            Err(FetchError::Cancelled) => Err(FetchError::Cancelled),
            Err(err) => {
                warn!(source = %source, "[COORD] robots.txt unreachable ({err}), disallowing all paths");
                Ok(CrawlPolicy::disallow_all())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::time::Duration;

    use super::transport::scripted::ScriptedTransport;
    use super::*;
    use crate::coordinator::CoordinatorConfig;

    pub fn coordinator(identities: usize) -> Arc<Coordinator> {
        Arc::new(Coordinator::new(CoordinatorConfig {
            base_delay: Duration::ZERO,
            max_delay: Duration::from_millis(8),
            jitter: Duration::ZERO,
            identities,
        }))
    }

    pub fn fetcher(transport: Arc<ScriptedTransport>, max_attempts: u32) -> Arc<Fetcher> {
        Arc::new(Fetcher::new(
            coordinator(1),
            transport,
            Arc::new(LatencyStats::new()),
            CancellationToken::new(),
            max_attempts,
        ))
    }
}
