use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use super::html::last_path_segment;
use super::{Cursor, DetailCollector, Page, SourceAdapter};
use crate::error::{AppError, FetchError, Result};
use crate::fetcher::Fetcher;
use crate::types::SourceId;

/// Resale portal. Every (city, property type) search is its own lane:
/// `/venda/{city}/{type}/?pagina=N`.
pub struct VivaRealAdapter {
    fetcher: Arc<Fetcher>,
    base: Url,
    lanes: Vec<(String, String)>,
    max_pages: u32,
    collector: DetailCollector,
}

impl VivaRealAdapter {
    pub fn new(
        fetcher: Arc<Fetcher>,
        base_url: &str,
        cities: &[String],
        types: &[String],
        max_pages: u32,
        max_items: usize,
    ) -> Result<Self> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            return Err(AppError::Config(format!("VIVAREAL_BASE_URL is not a base url: {base_url}")));
        }
        let lanes = cities
            .iter()
            .flat_map(|city| types.iter().map(move |kind| (city.clone(), kind.clone())))
            .collect();
        Ok(Self {
            fetcher,
            base,
            lanes,
            max_pages: max_pages.max(1),
            collector: DetailCollector::new(max_items),
        })
    }

    fn search_url(&self, cursor: &Cursor) -> std::result::Result<Url, FetchError> {
        let Some((city, kind)) = self.lanes.get(cursor.lane) else {
            return Err(FetchError::Status { url: format!("{} lane {}", self.base, cursor.lane), status: 0 });
        };
        self.base
            .join(&format!("/venda/{city}/{kind}/?pagina={}", cursor.page))
            .map_err(|e| FetchError::Status { url: format!("{}: {e}", self.base), status: 0 })
    }
}

/// Detail slugs end in `-id-<digits>`; the digits are the portal's listing id.
fn listing_id(url: &Url) -> Option<String> {
    let segment = last_path_segment(url)?;
    match segment.rsplit_once("-id-") {
        Some((_, id)) if !id.is_empty() => Some(id.to_string()),
        _ => Some(segment),
    }
}

#[async_trait]
impl SourceAdapter for VivaRealAdapter {
    fn source(&self) -> SourceId {
        SourceId::VivaReal
    }

    fn base_url(&self) -> &Url {
        &self.base
    }

    fn start_cursors(&self) -> Vec<Cursor> {
        (0..self.lanes.len()).map(|lane| Cursor { lane, page: 1 }).collect()
    }

    fn next_cursor(&self, cursor: &Cursor) -> Option<Cursor> {
        (cursor.page < self.max_pages).then(|| Cursor { lane: cursor.lane, page: cursor.page + 1 })
    }

    async fn fetch_page(&self, cursor: &Cursor) -> std::result::Result<Page, FetchError> {
        let url = self.search_url(cursor)?;
        self.collector
            .collect(&self.fetcher, self.source(), &url, self.next_cursor(cursor), listing_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::fetcher;
    use crate::fetcher::transport::scripted::ScriptedTransport;

    fn adapter(transport: Arc<ScriptedTransport>, max_items: usize) -> VivaRealAdapter {
        VivaRealAdapter::new(
            fetcher(transport, 1),
            "https://viva.test",
            &["goiania".to_string(), "brasilia".to_string()],
            &["apartamento".to_string(), "casa".to_string()],
            2,
            max_items,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn one_lane_per_city_and_type() {
        let adapter = adapter(Arc::new(ScriptedTransport::new()), 10);
        let cursors = adapter.start_cursors();
        assert_eq!(cursors.len(), 4);
        assert!(cursors.iter().all(|c| c.page == 1));
        assert_eq!(
            adapter.search_url(&Cursor { lane: 3, page: 2 }).unwrap().as_str(),
            "https://viva.test/venda/brasilia/casa/?pagina=2"
        );
        assert!(adapter.search_url(&Cursor { lane: 9, page: 1 }).is_err());
    }

    #[test]
    fn listing_id_prefers_numeric_suffix() {
        let url = Url::parse("https://viva.test/imovel/apartamento-3-quartos-setor-bueno-id-2612345678/").unwrap();
        assert_eq!(listing_id(&url).as_deref(), Some("2612345678"));
        let plain = Url::parse("https://viva.test/imovel/casa-98765/").unwrap();
        assert_eq!(listing_id(&plain).as_deref(), Some("casa-98765"));
    }

    #[tokio::test]
    async fn same_detail_from_two_lanes_is_fetched_once() {
        let transport = Arc::new(ScriptedTransport::new());
        let shared = r#"<a href="/imovel/casa-id-77/">casa</a>"#;
        transport.html("https://viva.test/venda/goiania/apartamento/?pagina=1", shared);
        transport.html("https://viva.test/venda/goiania/casa/?pagina=1", shared);
        transport.html("https://viva.test/imovel/casa-id-77/", "<h1>Casa</h1>");
        let adapter = adapter(transport.clone(), 10);

        let first = adapter.fetch_page(&Cursor { lane: 0, page: 1 }).await.unwrap();
        let second = adapter.fetch_page(&Cursor { lane: 1, page: 1 }).await.unwrap();

        assert_eq!(first.captures.len(), 1);
        assert_eq!(first.captures[0].source_listing_id, "77");
        assert!(second.captures.is_empty());
        assert_eq!(second.next, Some(Cursor { lane: 1, page: 2 }));
        assert_eq!(transport.call_count("https://viva.test/imovel/casa-id-77/"), 1);
    }
}
