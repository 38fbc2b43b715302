//! Anti-block coordinator: the single owner of per-source request budgets,
//! backoff state, proxy identity rotation and crawl-policy enforcement.
//!
//! Adapters never sleep on their own. They `acquire` a permit before every
//! network call and `report_outcome` after it; the coordinator decides how long
//! the next caller for that source has to wait.

pub mod robots;

use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::FetchError;
use crate::types::SourceId;

pub use robots::CrawlPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Blocked,
    RateLimited,
    /// Timeout, connection failure or 5xx: spacing grows, identity stays.
    Transient,
    /// Any other failure; leaves the spacing alone.
    Error,
}

impl From<&FetchError> for Outcome {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::Blocked { .. } => Outcome::Blocked,
            FetchError::RateLimited { .. } => Outcome::RateLimited,
            FetchError::Transient { .. } => Outcome::Transient,
            _ => Outcome::Error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Spacing between consecutive permits for one source while unthrottled.
    pub base_delay: Duration,
    /// Upper bound for the escalated spacing.
    pub max_delay: Duration,
    /// Uniform random extra spacing in `[0, jitter]` per permit.
    pub jitter: Duration,
    /// Number of network identities (1 = direct connection only).
    pub identities: usize,
}

/// Proof that the caller may issue one request for `source` now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permit {
    pub source: SourceId,
    /// Identity (proxy index) the request must go out through.
    pub identity: usize,
    /// 1-based sequence number of this permit for the source.
    pub seq: u64,
}

/// Observable per-source counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub permits_issued: u64,
    pub successes: u64,
    pub errors: u64,
    /// Times the spacing was escalated after a block, rate limit or transient failure.
    pub escalations: u64,
    pub rotations: u64,
    pub policy_violations: u64,
    pub current_delay_ms: u64,
    pub identity: usize,
}

#[derive(Debug)]
struct SourceState {
    /// Earliest instant at which the next permit may be released.
    next_slot: Instant,
    delay: Duration,
    identity: usize,
    stats: SourceStats,
}

pub struct Coordinator {
    cfg: CoordinatorConfig,
    /// Every read-modify-write happens under the map's entry lock, so two
    /// concurrent `acquire` calls for one source always reserve distinct slots.
    states: DashMap<SourceId, SourceState>,
    policies: DashMap<SourceId, CrawlPolicy>,
}

impl Coordinator {
    pub fn new(cfg: CoordinatorConfig) -> Self {
        Self {
            cfg: CoordinatorConfig { identities: cfg.identities.max(1), ..cfg },
            states: DashMap::new(),
            policies: DashMap::new(),
        }
    }

    pub fn set_policy(&self, source: SourceId, policy: CrawlPolicy) {
        info!(source = %source, rules = policy.rule_count(), "[COORD] crawl policy installed");
        self.policies.insert(source, policy);
    }

    /// Fail fast when the URL's path is excluded for `source`.
    pub fn check_policy(&self, source: SourceId, url: &Url) -> Result<(), FetchError> {
        let path = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };
        let allowed = self
            .policies
            .get(&source)
            .map_or(true, |policy| policy.is_allowed(&path));
        if allowed {
            return Ok(());
        }
        self.state_mut(source).stats.policy_violations += 1;
        warn!(source = %source, path = %path, "[COORD] path excluded by crawl policy");
        Err(FetchError::PolicyViolation { source_id: source, path })
    }

    /// Wait until the source's budget allows another request, then hand out a permit.
    pub async fn acquire(&self, source: SourceId, url: &Url) -> Result<Permit, FetchError> {
        self.check_policy(source, url)?;

        let (wait, permit) = {
            let mut state = self.state_mut(source);
            let now = Instant::now();
            let slot = state.next_slot.max(now);
            state.next_slot = slot + state.delay + self.jitter();
            state.stats.permits_issued += 1;
            let permit = Permit {
                source,
                identity: state.identity,
                seq: state.stats.permits_issued,
            };
            (slot - now, permit)
        };

        if !wait.is_zero() {
            debug!(source = %source, wait_ms = wait.as_millis() as u64, "[COORD] waiting for slot");
            tokio::time::sleep(wait).await;
        }
        Ok(permit)
    }

    /// Feed back the result of a permitted request.
    pub fn report_outcome(&self, source: SourceId, outcome: Outcome) {
        let mut state = self.state_mut(source);
        match outcome {
            Outcome::Success => {
                state.stats.successes += 1;
                state.delay = self.cfg.base_delay;
            }
            Outcome::Error => {
                state.stats.errors += 1;
            }
            Outcome::Transient | Outcome::Blocked | Outcome::RateLimited => {
                if outcome == Outcome::Transient {
                    state.stats.errors += 1;
                }
                let escalated = state
                    .delay
                    .max(Duration::from_millis(1))
                    .saturating_mul(2)
                    .min(self.cfg.max_delay);
                state.delay = escalated;
                state.stats.escalations += 1;
                // The next permit waits at least the escalated delay from now.
                let earliest = Instant::now() + escalated;
                if state.next_slot < earliest {
                    state.next_slot = earliest;
                }
                if outcome != Outcome::Transient && self.cfg.identities > 1 {
                    state.identity = (state.identity + 1) % self.cfg.identities;
                    state.stats.rotations += 1;
                }
                warn!(
                    source = %source,
                    outcome = ?outcome,
                    delay_ms = escalated.as_millis() as u64,
                    identity = state.identity,
                    "[COORD] backing off"
                );
            }
        }
        state.stats.current_delay_ms = state.delay.as_millis() as u64;
        state.stats.identity = state.identity;
    }

    pub fn stats(&self, source: SourceId) -> SourceStats {
        self.states
            .get(&source)
            .map(|s| s.stats.clone())
            .unwrap_or_default()
    }

    pub fn current_delay(&self, source: SourceId) -> Duration {
        self.states.get(&source).map_or(self.cfg.base_delay, |s| s.delay)
    }

    fn state_mut(&self, source: SourceId) -> dashmap::mapref::one::RefMut<'_, SourceId, SourceState> {
        self.states.entry(source).or_insert_with(|| SourceState {
            next_slot: Instant::now(),
            delay: self.cfg.base_delay,
            identity: 0,
            stats: SourceStats {
                current_delay_ms: self.cfg.base_delay.as_millis() as u64,
                ..SourceStats::default()
            },
        })
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.cfg.jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn cfg(base_ms: u64, max_ms: u64, identities: usize) -> CoordinatorConfig {
        CoordinatorConfig {
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            jitter: Duration::ZERO,
            identities,
        }
    }

    fn url(path: &str) -> Url {
        Url::parse(&format!("https://example.com{path}")).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn permits_are_spaced_by_base_delay() {
        let coord = Coordinator::new(cfg(1_000, 60_000, 1));
        let start = Instant::now();
        for _ in 0..3 {
            coord.acquire(SourceId::VivaReal, &url("/venda")).await.unwrap();
        }
        // First permit is immediate, the next two wait one delay each.
        assert!(start.elapsed() >= Duration::from_millis(2_000));
        assert!(start.elapsed() < Duration::from_millis(2_500));
    }

    #[tokio::test(start_paused = true)]
    async fn sources_do_not_share_budgets() {
        let coord = Coordinator::new(cfg(5_000, 60_000, 1));
        let start = Instant::now();
        coord.acquire(SourceId::VivaReal, &url("/a")).await.unwrap();
        coord.acquire(SourceId::LeiloesJudiciais, &url("/a")).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn blocks_escalate_exponentially_up_to_cap_and_success_resets() {
        let coord = Coordinator::new(cfg(100, 500, 1));
        let src = SourceId::LeiloesJudiciais;

        coord.report_outcome(src, Outcome::Blocked);
        assert_eq!(coord.current_delay(src), Duration::from_millis(200));
        coord.report_outcome(src, Outcome::RateLimited);
        assert_eq!(coord.current_delay(src), Duration::from_millis(400));
        coord.report_outcome(src, Outcome::Blocked);
        assert_eq!(coord.current_delay(src), Duration::from_millis(500));
        assert_eq!(coord.stats(src).escalations, 3);

        coord.report_outcome(src, Outcome::Error);
        assert_eq!(coord.current_delay(src), Duration::from_millis(500));

        coord.report_outcome(src, Outcome::Success);
        assert_eq!(coord.current_delay(src), Duration::from_millis(100));
        assert_eq!(coord.stats(src).escalations, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_widen_spacing_without_rotating() {
        let coord = Coordinator::new(cfg(100, 10_000, 2));
        let src = SourceId::LeiloesJudiciais;
        coord.acquire(src, &url("/imoveis")).await.unwrap();

        coord.report_outcome(src, Outcome::Transient);
        coord.report_outcome(src, Outcome::Transient);
        assert_eq!(coord.current_delay(src), Duration::from_millis(400));
        let stats = coord.stats(src);
        assert_eq!(stats.escalations, 2);
        assert_eq!(stats.errors, 2);
        assert_eq!(stats.rotations, 0);

        let start = Instant::now();
        coord.acquire(src, &url("/imoveis")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(400));

        coord.report_outcome(src, Outcome::Error);
        assert_eq!(coord.current_delay(src), Duration::from_millis(400));
    }

    #[test]
    fn transient_fetch_errors_map_to_transient_outcome() {
        let timeout = FetchError::Transient { url: "u".into(), reason: "timeout".into() };
        assert_eq!(Outcome::from(&timeout), Outcome::Transient);
        let missing = FetchError::Status { url: "u".into(), status: 404 };
        assert_eq!(Outcome::from(&missing), Outcome::Error);
    }

    #[test]
    fn blocks_rotate_identity_when_proxies_are_configured() {
        let coord = Coordinator::new(cfg(10, 1_000, 3));
        let src = SourceId::VivaReal;
        coord.report_outcome(src, Outcome::Blocked);
        coord.report_outcome(src, Outcome::Blocked);
        assert_eq!(coord.stats(src).identity, 2);
        coord.report_outcome(src, Outcome::RateLimited);
        assert_eq!(coord.stats(src).identity, 0);
        assert_eq!(coord.stats(src).rotations, 3);

        let direct = Coordinator::new(cfg(10, 1_000, 1));
        direct.report_outcome(src, Outcome::Blocked);
        assert_eq!(direct.stats(src).rotations, 0);
    }

    #[tokio::test]
    async fn excluded_path_fails_fast_without_consuming_budget() {
        let coord = Coordinator::new(cfg(0, 0, 1));
        coord.set_policy(
            SourceId::VivaReal,
            CrawlPolicy::parse("User-agent: *\nDisallow: /api/\n", "scanner"),
        );

        let err = coord
            .acquire(SourceId::VivaReal, &url("/api/listings?page=2"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FetchError::PolicyViolation {
                source_id: SourceId::VivaReal,
                path: "/api/listings?page=2".to_string()
            }
        );
        let stats = coord.stats(SourceId::VivaReal);
        assert_eq!(stats.policy_violations, 1);
        assert_eq!(stats.permits_issued, 0);

        assert!(coord.acquire(SourceId::VivaReal, &url("/venda/sp")).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_acquires_reserve_distinct_slots() {
        let coord = Arc::new(Coordinator::new(cfg(10, 1_000, 1)));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let coord = Arc::clone(&coord);
            handles.push(tokio::spawn(async move {
                coord.acquire(SourceId::LeiloesJudiciais, &url("/imoveis")).await.unwrap().seq
            }));
        }
        let mut seqs = Vec::new();
        for h in handles {
            seqs.push(h.await.unwrap());
        }
        seqs.sort_unstable();
        assert_eq!(seqs, (1..=20).collect::<Vec<u64>>());
        assert_eq!(coord.stats(SourceId::LeiloesJudiciais).permits_issued, 20);
    }
}
