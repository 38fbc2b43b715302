//! Bronze → silver promotion.

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::NORMALIZE_CONCURRENCY;
use crate::error::Result;
use crate::normalizer::{latest_per_listing, normalize};
use crate::store::{ListingStore, RawCaptureStore, UpsertOutcome};
use crate::types::ValidationFailure;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeStats {
    pub captures_seen: usize,
    /// Captures superseded by a later capture of the same listing.
    pub superseded: usize,
    pub inserted: usize,
    pub replaced: usize,
    pub stale: usize,
    pub failed: usize,
}

/// Normalize the latest capture of every listing in `raw` and upsert the
/// result into `listings`. Validation failures are recorded and the batch
/// carries on; only storage errors abort the run.
pub async fn normalize_all(raw: &dyn RawCaptureStore, listings: &dyn ListingStore) -> Result<NormalizeStats> {
    let captures = raw.scan(None).await?;
    let latest = latest_per_listing(&captures);

    let mut stats = NormalizeStats {
        captures_seen: captures.len(),
        superseded: captures.len() - latest.len(),
        ..Default::default()
    };

    let mut valid = Vec::with_capacity(latest.len());
    for capture in latest {
        match normalize(capture) {
            Ok(listing) => valid.push(listing),
            Err(error) => {
                warn!(source = %capture.source, id = %capture.source_listing_id, "[NORMALIZE] rejected: {error}");
                stats.failed += 1;
                listings
                    .record_failure(ValidationFailure {
                        capture: capture.key(),
                        error,
                        recorded_at: Utc::now(),
                    })
                    .await?;
            }
        }
    }

    let outcomes: Vec<Result<UpsertOutcome>> = stream::iter(valid)
        .map(|listing| listings.upsert(listing))
        .buffer_unordered(NORMALIZE_CONCURRENCY)
        .collect()
        .await;
    for outcome in outcomes {
        match outcome? {
            UpsertOutcome::Inserted => stats.inserted += 1,
            UpsertOutcome::Replaced => stats.replaced += 1,
            UpsertOutcome::Stale => stats.stale += 1,
        }
    }

    info!(
        seen = stats.captures_seen,
        superseded = stats.superseded,
        inserted = stats.inserted,
        replaced = stats.replaced,
        stale = stats.stale,
        failed = stats.failed,
        "[NORMALIZE] finished"
    );
    Ok(stats)
}
