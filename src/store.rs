//! Storage seams for the two persistence layers.
//!
//! Bronze ([`RawCaptureStore`]) is append-only and keyed by
//! `(source, source_listing_id, fetched_at)`. Silver ([`ListingStore`]) holds
//! one logical Listing per `(source, source_listing_id)` plus the captures that
//! failed validation. Both have an in-memory implementation in `state` and a
//! SQLite one in `db`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    CaptureRef, Channel, Listing, ListingId, Occupancy, PropertyType, RawCapture, Region, SourceId,
    ValidationFailure,
};

#[async_trait]
pub trait RawCaptureStore: Send + Sync {
    /// Append a capture. Returns `false` (and stores nothing) when the key already exists.
    async fn append(&self, capture: &RawCapture) -> Result<bool>;

    async fn get(&self, key: &CaptureRef) -> Result<Option<RawCapture>>;

    /// All captures, optionally for one source, ordered by key.
    async fn scan(&self, source: Option<SourceId>) -> Result<Vec<RawCapture>>;

    async fn len(&self) -> Result<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    /// The stored Listing came from a later capture; nothing changed.
    Stale,
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn get(&self, id: &ListingId) -> Result<Option<Arc<Listing>>>;

    /// Insert or replace by `listing.id`, last-write-wins on `captured_from.fetched_at`.
    async fn upsert(&self, listing: Listing) -> Result<UpsertOutcome>;

    /// Point-in-time snapshot of every Listing matching `filter`, ordered by id.
    async fn scan(&self, filter: &ListingFilter) -> Result<Vec<Arc<Listing>>>;

    async fn record_failure(&self, failure: ValidationFailure) -> Result<()>;

    /// Failures ordered by capture key. Re-recording a capture replaces its entry.
    async fn failures(&self) -> Result<Vec<ValidationFailure>>;
}

/// Conjunctive filter; `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFilter {
    pub source: Option<SourceId>,
    pub channel: Option<Channel>,
    pub property_type: Option<PropertyType>,
    pub region: Option<Region>,
    pub auction_round: Option<u8>,
    pub occupancy: Option<Occupancy>,
}

impl ListingFilter {
    pub fn matches(&self, listing: &Listing) -> bool {
        self.source.map_or(true, |s| listing.id.source == s)
            && self.channel.map_or(true, |c| listing.channel == c)
            && self.property_type.as_ref().map_or(true, |t| &listing.property_type == t)
            && self.region.as_ref().map_or(true, |r| &listing.region == r)
            && self.auction_round.map_or(true, |r| listing.auction_round == Some(r))
            && self.occupancy.map_or(true, |o| listing.occupancy_status == o)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::listing;

    #[test]
    fn empty_filter_matches_everything() {
        let l = listing(SourceId::VivaReal, "1", None, None);
        assert!(ListingFilter::default().matches(&l));
    }

    #[test]
    fn filter_fields_are_conjunctive() {
        let mut l = listing(SourceId::LeiloesJudiciais, "1", Some(1.0), Some(1.0));
        l.auction_round = Some(2);

        let filter = ListingFilter {
            channel: Some(Channel::Auction),
            region: Some(Region::Known("sao_paulo".into())),
            ..ListingFilter::default()
        };
        assert!(filter.matches(&l));

        let wrong_round = ListingFilter { auction_round: Some(1), ..filter.clone() };
        assert!(!wrong_round.matches(&l));

        let wrong_type = ListingFilter { property_type: Some(PropertyType::House), ..filter };
        assert!(!wrong_type.matches(&l));
    }
}
