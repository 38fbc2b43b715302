use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use url::Url;

use crate::config::{ACCEPT, ACCEPT_LANGUAGE};
use crate::error::{FetchError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    /// Identity the request went out through.
    pub identity: usize,
    pub body: Vec<u8>,
}

/// One HTTP GET through a given network identity. Non-success statuses come
/// back already classified as `FetchError`s.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url, identity: usize) -> std::result::Result<HttpResponse, FetchError>;
}

/// Map an HTTP status onto the fetch error taxonomy.
pub fn classify_status(url: &str, status: u16) -> std::result::Result<(), FetchError> {
    match status {
        200..=299 => Ok(()),
        429 => Err(FetchError::RateLimited { url: url.to_string() }),
        403 => Err(FetchError::Blocked { url: url.to_string(), status }),
        408 | 500..=599 => Err(FetchError::Transient {
            url: url.to_string(),
            reason: format!("status {status}"),
        }),
        _ => Err(FetchError::Status { url: url.to_string(), status }),
    }
}

/// reqwest-backed transport with one client per identity: index 0 is the
/// direct connection when no proxies are configured, otherwise one client per proxy.
pub struct ReqwestTransport {
    clients: Vec<reqwest::Client>,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, timeout: Duration, proxy_urls: &[String]) -> Result<Self> {
        let clients = if proxy_urls.is_empty() {
            vec![build_client(user_agent, timeout, None)?]
        } else {
            proxy_urls
                .iter()
                .map(|p| build_client(user_agent, timeout, Some(p)))
                .collect::<reqwest::Result<Vec<_>>>()?
        };
        Ok(Self { clients })
    }

    pub fn identities(&self) -> usize {
        self.clients.len()
    }
}

fn build_client(user_agent: &str, timeout: Duration, proxy: Option<&str>) -> reqwest::Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE));
    headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .default_headers(headers);
    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }
    builder.build()
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &Url, identity: usize) -> std::result::Result<HttpResponse, FetchError> {
        let identity = identity % self.clients.len();
        let transient = |e: reqwest::Error| FetchError::Transient {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let resp = self.clients[identity].get(url.clone()).send().await.map_err(transient)?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();

        // Anti-bot challenge pages come back as 403/503 with this marker header.
        let challenged = resp
            .headers()
            .get("cf-mitigated")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("challenge"));
        if challenged {
            return Err(FetchError::Blocked { url: final_url, status });
        }
        classify_status(&final_url, status)?;

        let body = resp.bytes().await.map_err(transient)?.to_vec();
        Ok(HttpResponse { status, url: final_url, identity, body })
    }
}
