//! RawCapture → Listing.
//!
//! Normalization is a pure function of the capture: the same capture always
//! yields the same Listing (or the same ValidationError). Dispatch happens on
//! the capture's `SourceId`, never on the payload's shape.

pub mod leilao;
pub mod parse;
pub mod vivareal;
pub mod vocab;

use std::collections::HashMap;

use scraper::{Html, Selector};

use crate::error::ValidationError;
use crate::types::{Listing, ListingId, RawCapture, SourceId};

pub fn normalize(capture: &RawCapture) -> Result<Listing, ValidationError> {
    match capture.source {
        SourceId::LeiloesJudiciais => leilao::normalize(capture),
        SourceId::VivaReal => vivareal::normalize(capture),
    }
}

/// The latest capture of every listing id, ordered by id. Older captures of
/// the same listing are superseded and never normalized.
pub fn latest_per_listing(captures: &[RawCapture]) -> Vec<&RawCapture> {
    let mut latest: HashMap<ListingId, &RawCapture> = HashMap::new();
    for capture in captures {
        latest
            .entry(capture.listing_id())
            .and_modify(|current| {
                if capture.fetched_at > current.fetched_at {
                    *current = capture;
                }
            })
            .or_insert(capture);
    }
    let mut out: Vec<&RawCapture> = latest.into_values().collect();
    out.sort_by(|a, b| a.key().cmp(&b.key()));
    out
}

/// Parsed detail page with first-match text lookup over selector fallbacks.
pub(crate) struct Doc {
    html: Html,
}

impl Doc {
    pub fn parse(payload: &[u8]) -> Self {
        Self {
            html: Html::parse_document(&String::from_utf8_lossy(payload)),
        }
    }

    /// Whitespace-collapsed text of the first non-empty element matching any
    /// selector, tried in order.
    pub fn text(&self, selectors: &[&str]) -> Option<String> {
        selectors.iter().find_map(|raw| {
            let selector = Selector::parse(raw).ok()?;
            self.html
                .select(&selector)
                .map(|el| collapse(el.text()))
                .find(|t| !t.is_empty())
        })
    }

    /// Text of every element matching `selector`, empty entries and repeats dropped.
    pub fn texts(&self, selector: &str) -> Vec<String> {
        let Ok(selector) = Selector::parse(selector) else {
            return Vec::new();
        };
        let mut out: Vec<String> = Vec::new();
        for text in self.html.select(&selector).map(|el| collapse(el.text())) {
            if !text.is_empty() && !out.contains(&text) {
                out.push(text);
            }
        }
        out
    }
}

fn collapse<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Non-empty pieces of free text joined for keyword matching.
pub(crate) fn joined(parts: &[Option<&str>]) -> String {
    parts.iter().flatten().copied().collect::<Vec<_>>().join(" \n ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::capture_store::fixtures::capture;

    #[test]
    fn doc_text_uses_first_matching_fallback() {
        let doc = Doc::parse(
            br#"<div class="valor">  R$
                 500.000 </div><span class="price"></span><li class="feature">Piscina</li><li class="amenity">Piscina</li>"#,
        );
        assert_eq!(doc.text(&[".price", ".valor"]).as_deref(), Some("R$ 500.000"));
        assert_eq!(doc.text(&[".missing"]), None);
        assert_eq!(doc.texts(".feature, .amenity"), vec!["Piscina".to_string()]);
    }

    #[test]
    fn latest_capture_wins_per_listing() {
        let captures = vec![
            capture(SourceId::VivaReal, "1", 300, "new"),
            capture(SourceId::VivaReal, "1", 100, "old"),
            capture(SourceId::VivaReal, "2", 200, "other"),
            capture(SourceId::LeiloesJudiciais, "1", 50, "auction"),
        ];
        let latest = latest_per_listing(&captures);
        assert_eq!(latest.len(), 3);
        let viva_one = latest
            .iter()
            .find(|c| c.source == SourceId::VivaReal && c.source_listing_id == "1")
            .unwrap();
        assert_eq!(viva_one.payload, b"new".to_vec());
    }
}
