use scraper::{Html, Selector};
use url::Url;

use crate::config::DETAIL_PATH_MARKER;

/// Absolute, de-duplicated detail page links found on an index page, in page order.
/// Only same-host links whose path contains the detail marker are kept.
pub fn extract_detail_links(base: &Url, html: &str) -> Vec<Url> {
    let document = Html::parse_document(html);
    let Ok(anchor) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut links: Vec<Url> = Vec::new();
    for element in document.select(&anchor) {
        let Some(href) = element.value().attr("href") else { continue };
        let Ok(mut url) = base.join(href.trim()) else { continue };
        if url.host_str() != base.host_str() || !url.path().contains(DETAIL_PATH_MARKER) {
            continue;
        }
        url.set_fragment(None);
        if !links.contains(&url) {
            links.push(url);
        }
    }
    links
}

/// Last non-empty path segment of a detail URL, e.g.
/// `/imovel/apartamento-centro-4521/` → `apartamento-centro-4521`.
pub fn last_path_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_same_host_detail_links_once() {
        let base = Url::parse("https://www.leiloes.test/imoveis?page=1").unwrap();
        let html = r##"
            <a href="/imovel/casa-1">Casa</a>
            <a href="https://www.leiloes.test/imovel/casa-1#fotos">Casa again</a>
            <a href="imovel/apto-2">relative</a>
            <a href="/sobre">About</a>
            <a href="https://ads.test/imovel/3">Ad</a>
            <a>no href</a>
        "##;
        let links = extract_detail_links(&base, html);
        let paths: Vec<&str> = links.iter().map(|u| u.path()).collect();
        assert_eq!(paths, vec!["/imovel/casa-1", "/imovel/apto-2"]);
    }

    #[test]
    fn last_segment_ignores_trailing_slash() {
        let url = Url::parse("https://x.test/imovel/apartamento-centro-4521/").unwrap();
        assert_eq!(last_path_segment(&url).as_deref(), Some("apartamento-centro-4521"));
        let root = Url::parse("https://x.test/").unwrap();
        assert_eq!(last_path_segment(&root), None);
    }
}
