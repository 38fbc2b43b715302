use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::aggregation::{AggregationEngine, ComparisonResult, Dimension};
use crate::api::health::{HealthReport, HealthState};
use crate::error::AppError;
use crate::fetcher::LatencyStats;
use crate::normalizer::vocab;
use crate::store::{ListingFilter, ListingStore};
use crate::types::{Channel, PropertyType, Region, SourceId, ValidationFailure};

#[derive(Clone)]
pub struct ApiState {
    pub listings: Arc<dyn ListingStore>,
    pub engine: Arc<AggregationEngine>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/comparisons", get(get_comparisons))
        .route("/validation-failures", get(get_validation_failures))
        .route("/stats/fetch-latency", get(get_fetch_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ComparisonsQuery {
    /// Comma-separated dimensions: `property_type`, `region`, `auction_round`.
    pub group_by: Option<String>,
    pub channel: Option<String>,
    pub source: Option<String>,
    pub property_type: Option<String>,
    pub region: Option<String>,
}

impl ComparisonsQuery {
    fn filter(&self) -> Result<ListingFilter, AppError> {
        let channel = match self.channel.as_deref() {
            Some(raw) => Some(
                Channel::parse(raw).ok_or_else(|| AppError::BadRequest(format!("unknown channel {raw:?}")))?,
            ),
            None => None,
        };
        let source = match self.source.as_deref() {
            Some(raw) => {
                Some(SourceId::parse(raw).ok_or_else(|| AppError::BadRequest(format!("unknown source {raw:?}")))?)
            }
            None => None,
        };
        Ok(ListingFilter {
            source,
            channel,
            property_type: self.property_type.as_deref().map(parse_property_type),
            region: self.region.as_deref().map(parse_region),
            ..Default::default()
        })
    }
}

/// Canonical names first (`apartment`), then source vocabulary (`Apartamento`).
fn parse_property_type(raw: &str) -> PropertyType {
    match raw.trim() {
        "apartment" => PropertyType::Apartment,
        "house" => PropertyType::House,
        "commercial" => PropertyType::Commercial,
        "land" => PropertyType::Land,
        "rural" => PropertyType::Rural,
        "unknown" => PropertyType::Unknown,
        other => match other.strip_prefix("unmapped:") {
            Some(label) => PropertyType::Unmapped(label.to_string()),
            None => vocab::property_type(Some(other)),
        },
    }
}

fn parse_region(raw: &str) -> Region {
    match raw.trim() {
        "unknown" => Region::Unknown,
        other => match other.strip_prefix("unmapped:") {
            Some(label) => Region::Unmapped(label.to_string()),
            None => vocab::region(Some(other)),
        },
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthReport> {
    Json(state.health.report())
}

async fn get_comparisons(
    State(state): State<ApiState>,
    Query(params): Query<ComparisonsQuery>,
) -> Result<Json<Vec<ComparisonResult>>, AppError> {
    let group_by = Dimension::parse_list(params.group_by.as_deref().unwrap_or_default())?;
    let filter = params.filter()?;
    let results = state
        .engine
        .compute_from_store(state.listings.as_ref(), &group_by, &filter)
        .await?;
    Ok(Json(results))
}

async fn get_validation_failures(
    State(state): State<ApiState>,
) -> Result<Json<Vec<ValidationFailure>>, AppError> {
    Ok(Json(state.listings.failures().await?))
}

async fn get_fetch_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let (p50_ms, p95_ms, p99_ms) = state.latency.percentiles();
    Json(LatencyResponse {
        samples: state.latency.len(),
        p50_ms,
        p95_ms,
        p99_ms,
    })
}
