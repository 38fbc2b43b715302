use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use super::html::last_path_segment;
use super::{Cursor, DetailCollector, Page, SourceAdapter};
use crate::error::{AppError, FetchError, Result};
use crate::fetcher::Fetcher;
use crate::types::SourceId;

/// Auction portal: a single paginated catalogue at `/imoveis?page=N`.
pub struct LeilaoAdapter {
    fetcher: Arc<Fetcher>,
    base: Url,
    max_pages: u32,
    collector: DetailCollector,
}

impl LeilaoAdapter {
    pub fn new(fetcher: Arc<Fetcher>, base_url: &str, max_pages: u32, max_items: usize) -> Result<Self> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            return Err(AppError::Config(format!("LEILAO_BASE_URL is not a base url: {base_url}")));
        }
        Ok(Self {
            fetcher,
            base,
            max_pages: max_pages.max(1),
            collector: DetailCollector::new(max_items),
        })
    }

    fn index_url(&self, page: u32) -> std::result::Result<Url, FetchError> {
        self.base
            .join(&format!("/imoveis?page={page}"))
            .map_err(|e| FetchError::Status { url: format!("{}: {e}", self.base), status: 0 })
    }
}

#[async_trait]
impl SourceAdapter for LeilaoAdapter {
    fn source(&self) -> SourceId {
        SourceId::LeiloesJudiciais
    }

    fn base_url(&self) -> &Url {
        &self.base
    }

    fn start_cursors(&self) -> Vec<Cursor> {
        vec![Cursor { lane: 0, page: 1 }]
    }

    fn next_cursor(&self, cursor: &Cursor) -> Option<Cursor> {
        (cursor.page < self.max_pages).then(|| Cursor { lane: cursor.lane, page: cursor.page + 1 })
    }

    async fn fetch_page(&self, cursor: &Cursor) -> std::result::Result<Page, FetchError> {
        let url = self.index_url(cursor.page)?;
        self.collector
            .collect(&self.fetcher, self.source(), &url, self.next_cursor(cursor), last_path_segment)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::fetcher;
    use crate::fetcher::transport::scripted::ScriptedTransport;

    const BASE: &str = "https://leiloes.test";

    fn index(links: &[&str]) -> String {
        let anchors: String = links.iter().map(|l| format!(r#"<a href="{l}">lote</a>"#)).collect();
        format!("<html><body>{anchors}<a href=\"/contato\">contato</a></body></html>")
    }

    #[tokio::test]
    async fn page_captures_every_detail_and_points_to_next() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.html(
            "https://leiloes.test/imoveis?page=1",
            &index(&["/imovel/casa-centro-101", "/imovel/apto-sul-102/"]),
        );
        transport.html("https://leiloes.test/imovel/casa-centro-101", "<h1>Casa</h1>");
        transport.html("https://leiloes.test/imovel/apto-sul-102/", "<h1>Apto</h1>");

        let adapter = LeilaoAdapter::new(fetcher(transport.clone(), 2), BASE, 3, 50).unwrap();
        let page = adapter.fetch_page(&Cursor { lane: 0, page: 1 }).await.unwrap();

        let ids: Vec<&str> = page.captures.iter().map(|c| c.source_listing_id.as_str()).collect();
        assert_eq!(ids, vec!["casa-centro-101", "apto-sul-102"]);
        assert_eq!(page.captures[0].payload, b"<h1>Casa</h1>".to_vec());
        assert_eq!(page.captures[0].meta.status, 200);
        assert!(page.skipped.is_empty());
        assert_eq!(page.next, Some(Cursor { lane: 0, page: 2 }));
    }

    #[tokio::test]
    async fn empty_index_ends_the_lane() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.html("https://leiloes.test/imoveis?page=2", "<html><p>Nenhum imóvel</p></html>");
        let adapter = LeilaoAdapter::new(fetcher(transport, 1), BASE, 5, 50).unwrap();

        let page = adapter.fetch_page(&Cursor { lane: 0, page: 2 }).await.unwrap();
        assert!(page.captures.is_empty());
        assert_eq!(page.next, None);
    }

    #[tokio::test]
    async fn failed_detail_is_skipped_not_fatal() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.html(
            "https://leiloes.test/imoveis?page=1",
            &index(&["/imovel/ok-1", "/imovel/gone-2"]),
        );
        transport.html("https://leiloes.test/imovel/ok-1", "<h1>ok</h1>");

        let adapter = LeilaoAdapter::new(fetcher(transport, 1), BASE, 1, 50).unwrap();
        let page = adapter.fetch_page(&Cursor { lane: 0, page: 1 }).await.unwrap();

        assert_eq!(page.captures.len(), 1);
        assert_eq!(page.skipped.len(), 1);
        assert!(matches!(page.skipped[0].error, FetchError::Status { status: 404, .. }));
        assert_eq!(page.next, None);
    }

    #[tokio::test]
    async fn item_budget_stops_detail_fetches() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.html(
            "https://leiloes.test/imoveis?page=1",
            &index(&["/imovel/a-1", "/imovel/b-2", "/imovel/c-3"]),
        );
        for id in ["a-1", "b-2", "c-3"] {
            transport.html(&format!("https://leiloes.test/imovel/{id}"), "<h1>x</h1>");
        }

        let adapter = LeilaoAdapter::new(fetcher(transport.clone(), 1), BASE, 10, 2).unwrap();
        let page = adapter.fetch_page(&Cursor { lane: 0, page: 1 }).await.unwrap();

        assert_eq!(page.captures.len(), 2);
        assert_eq!(page.next, None);
        assert_eq!(transport.call_count("https://leiloes.test/imovel/c-3"), 0);
    }

    #[tokio::test]
    async fn next_cursor_respects_page_limit() {
        let transport = Arc::new(ScriptedTransport::new());
        let adapter = LeilaoAdapter::new(fetcher(transport, 1), BASE, 2, 10).unwrap();
        assert_eq!(adapter.next_cursor(&Cursor { lane: 0, page: 1 }), Some(Cursor { lane: 0, page: 2 }));
        assert_eq!(adapter.next_cursor(&Cursor { lane: 0, page: 2 }), None);
    }
}
