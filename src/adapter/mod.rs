//! Source adapters: one variant per listing portal behind [`SourceAdapter`].
//!
//! Both portals expose paginated index pages linking to one detail page per
//! listing. An index page is only mined for links; each detail page body is
//! returned untouched as a [`RawCapture`] so the crawler can persist it before
//! anything tries to parse it.

pub mod html;
pub mod leilao;
pub mod vivareal;

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashSet;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::types::{FetchMeta, RawCapture, SourceId};

pub use leilao::LeilaoAdapter;
pub use vivareal::VivaRealAdapter;

/// Position in a source's pagination. A lane is one independent listing
/// sequence (e.g. one city × type search); pages within a lane are sequential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cursor {
    pub lane: usize,
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedItem {
    pub url: String,
    pub error: FetchError,
}

#[derive(Debug, Default)]
pub struct Page {
    pub captures: Vec<RawCapture>,
    pub skipped: Vec<SkippedItem>,
    /// `None` once the lane is exhausted, the item budget is spent or the crawl is cancelled.
    pub next: Option<Cursor>,
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> SourceId;

    /// Scheme + host the source is served from; robots.txt lives under it.
    fn base_url(&self) -> &Url;

    /// First cursor of every lane.
    fn start_cursors(&self) -> Vec<Cursor>;

    /// Cursor following `cursor` regardless of its content, used to move past a failed page.
    fn next_cursor(&self, cursor: &Cursor) -> Option<Cursor>;

    async fn fetch_page(&self, cursor: &Cursor) -> Result<Page, FetchError>;
}

/// Per-source crawl bookkeeping shared by all lanes of one adapter: the
/// remaining detail-page budget and the detail URLs already claimed.
pub struct DetailCollector {
    remaining: AtomicUsize,
    seen: DashSet<String>,
}

impl DetailCollector {
    pub fn new(max_items: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(max_items),
            seen: DashSet::new(),
        }
    }

    fn take_budget(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Fetch one index page, then every unseen detail page it links to.
    ///
    /// Index failures propagate so the caller can skip the page. Detail
    /// failures are collected in `Page::skipped` and never abort the page.
    pub async fn collect(
        &self,
        fetcher: &Fetcher,
        source: SourceId,
        index_url: &Url,
        next: Option<Cursor>,
        listing_id_of: fn(&Url) -> Option<String>,
    ) -> Result<Page, FetchError> {
        let index = fetcher.fetch(source, index_url).await?;
        let base = Url::parse(&index.url).unwrap_or_else(|_| index_url.clone());
        let links = html::extract_detail_links(&base, &String::from_utf8_lossy(&index.body));

        if links.is_empty() {
            debug!(source = %source, url = %index_url, "index page has no listings, lane done");
            return Ok(Page::default());
        }

        let mut page = Page { next, ..Page::default() };
        for link in links {
            if fetcher.is_cancelled() {
                page.next = None;
                break;
            }
            let Some(listing_id) = listing_id_of(&link) else {
                debug!(source = %source, url = %link, "no listing id in detail url");
                continue;
            };
            if !self.seen.insert(link.to_string()) {
                continue;
            }
            if !self.take_budget() {
                debug!(source = %source, "item budget exhausted");
                page.next = None;
                break;
            }

            match fetcher.fetch(source, &link).await {
                Ok(resp) => page.captures.push(RawCapture {
                    source,
                    source_listing_id: listing_id,
                    fetched_at: Utc::now(),
                    payload: resp.body,
                    meta: FetchMeta {
                        status: resp.status,
                        url: resp.url,
                        identity: resp.identity,
                    },
                }),
                Err(FetchError::Cancelled) => {
                    page.next = None;
                    break;
                }
                Err(error) => {
                    warn!(source = %source, url = %link, "detail page skipped: {error}");
                    page.skipped.push(SkippedItem { url: link.to_string(), error });
                }
            }
        }
        Ok(page)
    }
}
