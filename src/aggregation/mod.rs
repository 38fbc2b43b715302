//! Grouped auction-vs-traditional comparisons over validated listings.
//!
//! Results are derived on demand from a point-in-time snapshot and are never
//! written back. Auction round only partitions the auction side: the
//! traditional baseline of a round group is the traditional group that shares
//! its other dimensions.

pub mod stats;

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::store::{ListingFilter, ListingStore};
use crate::types::{Channel, Listing, PropertyType, Region};

pub use stats::{discount_pct, AggregateStat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    PropertyType,
    Region,
    AuctionRound,
}

impl Dimension {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "property_type" => Ok(Dimension::PropertyType),
            "region" => Ok(Dimension::Region),
            "auction_round" => Ok(Dimension::AuctionRound),
            other => Err(AppError::BadRequest(format!("unknown group_by dimension {other:?}"))),
        }
    }

    /// Comma-separated list, e.g. `property_type,region`. Blank means no grouping.
    pub fn parse_list(s: &str) -> Result<Vec<Self>> {
        s.split(',')
            .filter(|part| !part.trim().is_empty())
            .map(Dimension::parse)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionRoundKey {
    Round(u8),
    /// Auction listing without a stated round.
    Unspecified,
}

/// Group coordinates. `None` on a dimension means it is not grouped on (wildcard).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupKey {
    pub property_type: Option<PropertyType>,
    pub region: Option<Region>,
    pub auction_round: Option<AuctionRoundKey>,
}

impl GroupKey {
    /// The all-wildcard key.
    pub fn all() -> Self {
        Self::default()
    }

    fn of(listing: &Listing, group_by: &BTreeSet<Dimension>) -> Self {
        Self {
            property_type: group_by
                .contains(&Dimension::PropertyType)
                .then(|| listing.property_type.clone()),
            region: group_by.contains(&Dimension::Region).then(|| listing.region.clone()),
            auction_round: (group_by.contains(&Dimension::AuctionRound) && listing.channel == Channel::Auction)
                .then(|| listing.auction_round.map_or(AuctionRoundKey::Unspecified, AuctionRoundKey::Round)),
        }
    }

    fn without_round(&self) -> Self {
        Self { auction_round: None, ..self.clone() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub key: GroupKey,
    pub auction: AggregateStat,
    pub traditional: AggregateStat,
    pub price_discount_pct: Option<f64>,
    pub price_per_area_discount_pct: Option<f64>,
}

impl ComparisonResult {
    pub fn new(key: GroupKey, auction: AggregateStat, traditional: AggregateStat) -> Self {
        Self {
            price_discount_pct: discount_pct(traditional.mean_price, auction.mean_price),
            price_per_area_discount_pct: discount_pct(
                traditional.mean_price_per_area,
                auction.mean_price_per_area,
            ),
            key,
            auction,
            traditional,
        }
    }

    fn empty(key: GroupKey) -> Self {
        Self::new(
            key.clone(),
            AggregateStat::empty(key.clone(), Channel::Auction),
            AggregateStat::empty(key, Channel::Traditional),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct AggregationEngine {
    /// Per-channel price-per-area quantile bounds; `None` disables trimming.
    trim: Option<(f64, f64)>,
}

impl AggregationEngine {
    pub fn new(trim: Option<(f64, f64)>) -> Self {
        Self { trim }
    }

    /// Comparisons for every group present in `listings ∩ filter`, ordered by key.
    /// An empty selection yields exactly one all-wildcard result with zero counts.
    pub fn compute<L>(&self, listings: &[L], group_by: &[Dimension], filter: &ListingFilter) -> Vec<ComparisonResult>
    where
        L: AsRef<Listing>,
    {
        let group_by: BTreeSet<Dimension> = group_by.iter().copied().collect();
        let selected: Vec<&Listing> = listings
            .iter()
            .map(|l| l.as_ref())
            .filter(|l| filter.matches(l))
            .collect();
        if selected.is_empty() {
            return vec![ComparisonResult::empty(GroupKey::all())];
        }

        let (auction, traditional): (Vec<&Listing>, Vec<&Listing>) =
            selected.into_iter().partition(|l| l.channel == Channel::Auction);
        let auction = self.trimmed(auction);
        let traditional = self.trimmed(traditional);

        let mut auction_groups: BTreeMap<GroupKey, Vec<&Listing>> = BTreeMap::new();
        for listing in auction {
            auction_groups.entry(GroupKey::of(listing, &group_by)).or_default().push(listing);
        }
        let mut traditional_groups: BTreeMap<GroupKey, Vec<&Listing>> = BTreeMap::new();
        for listing in traditional {
            traditional_groups.entry(GroupKey::of(listing, &group_by)).or_default().push(listing);
        }

        // Traditional groups with no auction counterpart still get a row.
        let mut keys: BTreeSet<GroupKey> = auction_groups.keys().cloned().collect();
        let covered: BTreeSet<GroupKey> = keys.iter().map(GroupKey::without_round).collect();
        keys.extend(traditional_groups.keys().filter(|k| !covered.contains(*k)).cloned());

        let results: Vec<ComparisonResult> = keys
            .into_iter()
            .map(|key| {
                let auction = auction_groups.get(&key).map_or(&[][..], Vec::as_slice);
                let traditional = traditional_groups
                    .get(&key.without_round())
                    .map_or(&[][..], Vec::as_slice);
                ComparisonResult::new(
                    key.clone(),
                    AggregateStat::compute(key.clone(), Channel::Auction, auction),
                    AggregateStat::compute(key, Channel::Traditional, traditional),
                )
            })
            .collect();
        debug!(groups = results.len(), "comparisons computed");
        results
    }

    /// Snapshot the store under `filter`, then compute.
    pub async fn compute_from_store(
        &self,
        store: &dyn ListingStore,
        group_by: &[Dimension],
        filter: &ListingFilter,
    ) -> Result<Vec<ComparisonResult>> {
        let snapshot = store.scan(filter).await?;
        Ok(self.compute(&snapshot, group_by, filter))
    }

    fn trimmed<'a>(&self, listings: Vec<&'a Listing>) -> Vec<&'a Listing> {
        match self.trim {
            Some((lower, upper)) => stats::trim_price_per_area(listings, lower, upper),
            None => listings,
        }
    }
}
