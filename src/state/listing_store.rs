use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::Result;
use crate::store::{ListingFilter, ListingStore, UpsertOutcome};
use crate::types::{CaptureRef, Listing, ListingId, ValidationFailure};

/// In-process silver layer.
///
/// Listings are held behind `Arc` and swapped whole under the map's entry
/// lock, so concurrent upserts of one id serialize and a reader holding a
/// snapshot never sees a half-written record.
#[derive(Default)]
pub struct MemoryListingStore {
    listings: DashMap<ListingId, Arc<Listing>>,
    failures: DashMap<CaptureRef, ValidationFailure>,
}

impl MemoryListingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn get(&self, id: &ListingId) -> Result<Option<Arc<Listing>>> {
        Ok(self.listings.get(id).map(|l| Arc::clone(l.value())))
    }

    async fn upsert(&self, listing: Listing) -> Result<UpsertOutcome> {
        let outcome = match self.listings.entry(listing.id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(listing));
                UpsertOutcome::Inserted
            }
            Entry::Occupied(mut slot) => {
                if listing.captured_from.fetched_at < slot.get().captured_from.fetched_at {
                    UpsertOutcome::Stale
                } else {
                    slot.insert(Arc::new(listing));
                    UpsertOutcome::Replaced
                }
            }
        };
        Ok(outcome)
    }

    async fn scan(&self, filter: &ListingFilter) -> Result<Vec<Arc<Listing>>> {
        let mut out: Vec<Arc<Listing>> = self
            .listings
            .iter()
            .filter(|l| filter.matches(l.value()))
            .map(|l| Arc::clone(l.value()))
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn record_failure(&self, failure: ValidationFailure) -> Result<()> {
        self.failures.insert(failure.capture.clone(), failure);
        Ok(())
    }

    async fn failures(&self) -> Result<Vec<ValidationFailure>> {
        let mut out: Vec<ValidationFailure> = self.failures.iter().map(|f| f.value().clone()).collect();
        out.sort_by(|a, b| a.capture.cmp(&b.capture));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::error::ValidationError;
    use crate::state::capture_store::fixtures::at;
    use crate::types::fixtures::listing;
    use crate::types::{Channel, SourceId};

    fn captured_at(mut l: Listing, secs: i64) -> Listing {
        l.captured_from.fetched_at = at(secs);
        l
    }

    #[tokio::test]
    async fn upsert_is_last_write_wins_by_capture_time() {
        let store = MemoryListingStore::new();
        let older = captured_at(listing(SourceId::VivaReal, "7", Some(100.0), None), 100);
        let newer = captured_at(listing(SourceId::VivaReal, "7", Some(200.0), None), 200);

        assert_eq!(store.upsert(newer.clone()).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(older).await.unwrap(), UpsertOutcome::Stale);
        assert_eq!(store.upsert(newer.clone()).await.unwrap(), UpsertOutcome::Replaced);

        let stored = store.get(&newer.id).await.unwrap().unwrap();
        assert_eq!(stored.price, Some(200.0));
    }

    #[tokio::test]
    async fn scan_applies_filter_in_id_order() {
        let store = MemoryListingStore::new();
        store.upsert(listing(SourceId::VivaReal, "b", None, None)).await.unwrap();
        store.upsert(listing(SourceId::VivaReal, "a", None, None)).await.unwrap();
        store.upsert(listing(SourceId::LeiloesJudiciais, "z", None, None)).await.unwrap();

        let trad = store
            .scan(&ListingFilter { channel: Some(Channel::Traditional), ..ListingFilter::default() })
            .await
            .unwrap();
        let ids: Vec<&str> = trad.iter().map(|l| l.id.source_listing_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn snapshot_is_unaffected_by_later_upserts() {
        let store = MemoryListingStore::new();
        let first = captured_at(listing(SourceId::VivaReal, "1", Some(1.0), None), 1);
        store.upsert(first).await.unwrap();
        let snapshot = store.scan(&ListingFilter::default()).await.unwrap();

        store
            .upsert(captured_at(listing(SourceId::VivaReal, "1", Some(2.0), None), 2))
            .await
            .unwrap();
        assert_eq!(snapshot[0].price, Some(1.0));
    }

    #[tokio::test]
    async fn failures_are_keyed_by_capture() {
        let store = MemoryListingStore::new();
        let capture = listing(SourceId::LeiloesJudiciais, "x", None, None).captured_from;
        for field in ["title", "price"] {
            store
                .record_failure(ValidationFailure {
                    capture: capture.clone(),
                    error: ValidationError::missing(field),
                    recorded_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        let failures = store.failures().await.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error.field(), "price");
    }
}
