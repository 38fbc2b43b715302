//! Row types for the tables in `migrations/0001_init.sql`.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{AppError, Result};
use crate::types::{CaptureRef, FetchMeta, Listing, RawCapture, SourceId, ValidationFailure};

/// Fixed-width UTC timestamp, so that text order equals time order.
pub fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::Decode(format!("timestamp {raw:?}: {e}")))
}

fn decode_source(raw: &str) -> Result<SourceId> {
    SourceId::parse(raw).ok_or_else(|| AppError::Decode(format!("unknown source {raw:?}")))
}

#[derive(Debug, sqlx::FromRow)]
pub struct RawCaptureRow {
    pub source: String,
    pub source_listing_id: String,
    pub fetched_at: String,
    pub payload: Vec<u8>,
    pub status: i64,
    pub final_url: String,
    pub identity: i64,
}

impl RawCaptureRow {
    pub fn into_capture(self) -> Result<RawCapture> {
        Ok(RawCapture {
            source: decode_source(&self.source)?,
            source_listing_id: self.source_listing_id,
            fetched_at: decode_ts(&self.fetched_at)?,
            payload: self.payload,
            meta: FetchMeta {
                status: u16::try_from(self.status)
                    .map_err(|_| AppError::Decode(format!("status {}", self.status)))?,
                url: self.final_url,
                identity: usize::try_from(self.identity)
                    .map_err(|_| AppError::Decode(format!("identity {}", self.identity)))?,
            },
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ListingRow {
    pub record: String,
}

impl ListingRow {
    pub fn into_listing(self) -> Result<Listing> {
        Ok(serde_json::from_str(&self.record)?)
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ValidationFailureRow {
    pub source: String,
    pub source_listing_id: String,
    pub fetched_at: String,
    pub error: String,
    pub recorded_at: String,
}

impl ValidationFailureRow {
    pub fn into_failure(self) -> Result<ValidationFailure> {
        Ok(ValidationFailure {
            capture: CaptureRef {
                source: decode_source(&self.source)?,
                source_listing_id: self.source_listing_id,
                fetched_at: decode_ts(&self.fetched_at)?,
            },
            error: serde_json::from_str(&self.error)?,
            recorded_at: decode_ts(&self.recorded_at)?,
        })
    }
}
