use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::models::{encode_ts, ListingRow, RawCaptureRow, ValidationFailureRow};
use crate::error::Result;
use crate::store::{ListingFilter, ListingStore, RawCaptureStore, UpsertOutcome};
use crate::types::{CaptureRef, Channel, Listing, ListingId, RawCapture, SourceId, ValidationFailure};

/// Both persistence layers on one SQLite pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RawCaptureStore for SqliteStore {
    async fn append(&self, capture: &RawCapture) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO raw_captures (
                source, source_listing_id, fetched_at, payload, status, final_url, identity
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(capture.source.as_str())
        .bind(&capture.source_listing_id)
        .bind(encode_ts(&capture.fetched_at))
        .bind(&capture.payload)
        .bind(i64::from(capture.meta.status))
        .bind(&capture.meta.url)
        .bind(capture.meta.identity as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, key: &CaptureRef) -> Result<Option<RawCapture>> {
        let row = sqlx::query_as::<_, RawCaptureRow>(
            r#"
            SELECT source, source_listing_id, fetched_at, payload, status, final_url, identity
            FROM raw_captures
            WHERE source = ? AND source_listing_id = ? AND fetched_at = ?
            "#,
        )
        .bind(key.source.as_str())
        .bind(&key.source_listing_id)
        .bind(encode_ts(&key.fetched_at))
        .fetch_optional(&self.pool)
        .await?;
        row.map(RawCaptureRow::into_capture).transpose()
    }

    async fn scan(&self, source: Option<SourceId>) -> Result<Vec<RawCapture>> {
        let rows = sqlx::query_as::<_, RawCaptureRow>(
            r#"
            SELECT source, source_listing_id, fetched_at, payload, status, final_url, identity
            FROM raw_captures
            WHERE ?1 IS NULL OR source = ?1
            ORDER BY source, source_listing_id, fetched_at
            "#,
        )
        .bind(source.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        let mut captures = rows
            .into_iter()
            .map(RawCaptureRow::into_capture)
            .collect::<Result<Vec<_>>>()?;
        // SQL orders sources by name; keep the same order as the in-memory store.
        captures.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(captures)
    }

    async fn len(&self) -> Result<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM raw_captures")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

fn channel_str(channel: Channel) -> &'static str {
    match channel {
        Channel::Auction => "auction",
        Channel::Traditional => "traditional",
    }
}

#[async_trait]
impl ListingStore for SqliteStore {
    async fn get(&self, id: &ListingId) -> Result<Option<Arc<Listing>>> {
        let row = sqlx::query_as::<_, ListingRow>(
            "SELECT record FROM listings WHERE source = ? AND source_listing_id = ?",
        )
        .bind(id.source.as_str())
        .bind(&id.source_listing_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ListingRow::into_listing).transpose()?.map(Arc::new))
    }

    /// One statement, so the last-write-wins check and the write take the
    /// same lock. `revision` tells an insert from a replace; no row back means
    /// the stored listing came from a later capture.
    async fn upsert(&self, listing: Listing) -> Result<UpsertOutcome> {
        let record = serde_json::to_string(&listing)?;
        let revision: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO listings (
                source, source_listing_id, channel, captured_at, price, area, record, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (source, source_listing_id) DO UPDATE SET
                channel = excluded.channel,
                captured_at = excluded.captured_at,
                price = excluded.price,
                area = excluded.area,
                record = excluded.record,
                updated_at = excluded.updated_at,
                revision = listings.revision + 1
            WHERE excluded.captured_at >= listings.captured_at
            RETURNING revision
            "#,
        )
        .bind(listing.id.source.as_str())
        .bind(&listing.id.source_listing_id)
        .bind(channel_str(listing.channel))
        .bind(encode_ts(&listing.captured_from.fetched_at))
        .bind(listing.price)
        .bind(listing.area)
        .bind(&record)
        .bind(encode_ts(&Utc::now()))
        .fetch_optional(&self.pool)
        .await?;

        Ok(match revision {
            None => UpsertOutcome::Stale,
            Some((1,)) => UpsertOutcome::Inserted,
            Some(_) => UpsertOutcome::Replaced,
        })
    }

    async fn scan(&self, filter: &ListingFilter) -> Result<Vec<Arc<Listing>>> {
        let rows = sqlx::query_as::<_, ListingRow>(
            r#"
            SELECT record FROM listings
            WHERE (?1 IS NULL OR source = ?1) AND (?2 IS NULL OR channel = ?2)
            ORDER BY source, source_listing_id
            "#,
        )
        .bind(filter.source.map(|s| s.as_str()))
        .bind(filter.channel.map(channel_str))
        .fetch_all(&self.pool)
        .await?;

        let mut listings = Vec::with_capacity(rows.len());
        for row in rows {
            let listing = row.into_listing()?;
            if filter.matches(&listing) {
                listings.push(Arc::new(listing));
            }
        }
        listings.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(listings)
    }

    async fn record_failure(&self, failure: ValidationFailure) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO validation_failures (
                source, source_listing_id, fetched_at, kind, field, error, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(failure.capture.source.as_str())
        .bind(&failure.capture.source_listing_id)
        .bind(encode_ts(&failure.capture.fetched_at))
        .bind(failure.error.kind())
        .bind(failure.error.field())
        .bind(serde_json::to_string(&failure.error)?)
        .bind(encode_ts(&failure.recorded_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn failures(&self) -> Result<Vec<ValidationFailure>> {
        let rows = sqlx::query_as::<_, ValidationFailureRow>(
            r#"
            SELECT source, source_listing_id, fetched_at, error, recorded_at
            FROM validation_failures
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        let mut failures = rows
            .into_iter()
            .map(ValidationFailureRow::into_failure)
            .collect::<Result<Vec<_>>>()?;
        failures.sort_by(|a, b| a.capture.cmp(&b.capture));
        Ok(failures)
    }
}
