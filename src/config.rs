use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const LEILAO_BASE_URL: &str = "https://www.leiloesjudiciais.com.br";
pub const VIVAREAL_BASE_URL: &str = "https://www.vivareal.com.br";

/// Browser-like identity sent with every request.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
pub const ACCEPT_LANGUAGE: &str = "pt-BR,pt;q=0.9,en;q=0.8";

/// Path every source publishes its exclusion rules under.
pub const ROBOTS_PATH: &str = "/robots.txt";

/// Path fragment that marks a detail page link on both portals.
pub const DETAIL_PATH_MARKER: &str = "/imovel/";

/// Concurrent upserts issued by one normalization run.
pub const NORMALIZE_CONCURRENCY: usize = 16;

/// Default cities and property types searched on the resale portal.
pub const DEFAULT_VIVAREAL_CITIES: &str = "sao-paulo,rio-de-janeiro,goiania,brasilia";
pub const DEFAULT_VIVAREAL_TYPES: &str = "apartamento,casa";

/// Outlier trimming bounds on price per area, applied per channel.
pub mod trim_defaults {
    pub const LOWER_QUANTILE: f64 = 0.01;
    pub const UPPER_QUANTILE: f64 = 0.99;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    pub leilao_base_url: String,
    pub vivareal_base_url: String,
    /// Pages walked per cursor lane (CRAWL_MAX_PAGES)
    pub crawl_max_pages: u32,
    /// Detail pages captured per source per run (CRAWL_MAX_ITEMS_PER_SOURCE)
    pub crawl_max_items_per_source: usize,
    /// Concurrent lane workers per source (CRAWL_WORKERS_PER_SOURCE)
    pub workers_per_source: usize,
    /// City slugs searched on the resale portal (VIVAREAL_CITIES, comma-separated)
    pub vivareal_cities: Vec<String>,
    /// Property type slugs searched on the resale portal (VIVAREAL_TYPES, comma-separated)
    pub vivareal_types: Vec<String>,
    /// Minimum spacing between two requests to the same source (REQUEST_BASE_DELAY_MS)
    pub request_base_delay: Duration,
    /// Backoff cap after repeated blocks (REQUEST_MAX_DELAY_MS)
    pub request_max_delay: Duration,
    /// Random extra spacing added to each permit (REQUEST_JITTER_MS)
    pub request_jitter: Duration,
    /// Attempts per URL before the page or item is skipped (FETCH_MAX_ATTEMPTS)
    pub fetch_max_attempts: u32,
    pub http_timeout: Duration,
    /// Proxy identities rotated on block (PROXY_URLS, comma-separated). Empty = direct.
    pub proxy_urls: Vec<String>,
    pub user_agent: String,
    /// (lower, upper) price-per-area quantiles kept by the aggregation engine.
    /// None disables trimming (TRIM_LOWER_QUANTILE / TRIM_UPPER_QUANTILE, "off" to disable).
    pub trim_quantiles: Option<(f64, f64)>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let trim_quantiles = match std::env::var("TRIM_LOWER_QUANTILE").as_deref() {
            Ok("off") => None,
            _ => {
                let lower = env_or("TRIM_LOWER_QUANTILE", trim_defaults::LOWER_QUANTILE);
                let upper = env_or("TRIM_UPPER_QUANTILE", trim_defaults::UPPER_QUANTILE);
                if !valid_trim_bounds(lower, upper) {
                    return Err(AppError::Config(format!(
                        "trim quantiles must satisfy 0 <= lower < upper <= 1, got {lower}..{upper}"
                    )));
                }
                Some((lower, upper))
            }
        };

        let fetch_max_attempts = env_or("FETCH_MAX_ATTEMPTS", 4u32);
        if fetch_max_attempts == 0 {
            return Err(AppError::Config("FETCH_MAX_ATTEMPTS must be at least 1".to_string()));
        }

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "listings.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            leilao_base_url: std::env::var("LEILAO_BASE_URL")
                .unwrap_or_else(|_| LEILAO_BASE_URL.to_string()),
            vivareal_base_url: std::env::var("VIVAREAL_BASE_URL")
                .unwrap_or_else(|_| VIVAREAL_BASE_URL.to_string()),
            crawl_max_pages: env_or("CRAWL_MAX_PAGES", 3),
            crawl_max_items_per_source: env_or("CRAWL_MAX_ITEMS_PER_SOURCE", 100),
            workers_per_source: env_or("CRAWL_WORKERS_PER_SOURCE", 2usize).max(1),
            vivareal_cities: env_list("VIVAREAL_CITIES", DEFAULT_VIVAREAL_CITIES),
            vivareal_types: env_list("VIVAREAL_TYPES", DEFAULT_VIVAREAL_TYPES),
            request_base_delay: Duration::from_millis(env_or("REQUEST_BASE_DELAY_MS", 3_000)),
            request_max_delay: Duration::from_millis(env_or("REQUEST_MAX_DELAY_MS", 120_000)),
            request_jitter: Duration::from_millis(env_or("REQUEST_JITTER_MS", 2_000)),
            fetch_max_attempts,
            http_timeout: Duration::from_secs(env_or("HTTP_TIMEOUT_SECS", 30)),
            proxy_urls: env_list("PROXY_URLS", ""),
            user_agent: std::env::var("USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
            trim_quantiles,
        })
    }
}

fn valid_trim_bounds(lower: f64, upper: f64) -> bool {
    0.0 <= lower && lower < upper && upper <= 1.0
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_list(key: &str, default: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
