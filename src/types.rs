use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Sources and channels
// ---------------------------------------------------------------------------

/// Every external listing source the scanner knows how to crawl and parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// Judicial / extrajudicial auction portal.
    LeiloesJudiciais,
    /// Traditional resale portal.
    VivaReal,
}

impl SourceId {
    pub const ALL: [SourceId; 2] = [SourceId::LeiloesJudiciais, SourceId::VivaReal];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::LeiloesJudiciais => "leiloes_judiciais",
            SourceId::VivaReal => "vivareal",
        }
    }

    pub fn channel(&self) -> Channel {
        match self {
            SourceId::LeiloesJudiciais => Channel::Auction,
            SourceId::VivaReal => Channel::Traditional,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        SourceId::ALL.into_iter().find(|id| id.as_str() == s)
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Auction,
    Traditional,
}

impl Channel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auction" | "leilao" => Some(Channel::Auction),
            "traditional" | "tradicional" => Some(Channel::Traditional),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Auction => write!(f, "auction"),
            Channel::Traditional => write!(f, "traditional"),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Stable identity of a listing: one logical record per (source, source-native id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListingId {
    pub source: SourceId,
    pub source_listing_id: String,
}

impl ListingId {
    pub fn new(source: SourceId, source_listing_id: impl Into<String>) -> Self {
        Self { source, source_listing_id: source_listing_id.into() }
    }
}

impl std::fmt::Display for ListingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.source, self.source_listing_id)
    }
}

/// Key of a raw capture: (source, source-native id, fetch timestamp).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaptureRef {
    pub source: SourceId,
    pub source_listing_id: String,
    pub fetched_at: DateTime<Utc>,
}

impl CaptureRef {
    pub fn listing_id(&self) -> ListingId {
        ListingId::new(self.source, self.source_listing_id.clone())
    }
}

// ---------------------------------------------------------------------------
// Bronze layer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchMeta {
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    /// Index of the network identity (proxy) the permit was issued for.
    pub identity: usize,
}

/// Unmodified payload of one successful detail fetch. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCapture {
    pub source: SourceId,
    pub source_listing_id: String,
    pub fetched_at: DateTime<Utc>,
    pub payload: Vec<u8>,
    pub meta: FetchMeta,
}

impl RawCapture {
    pub fn key(&self) -> CaptureRef {
        CaptureRef {
            source: self.source,
            source_listing_id: self.source_listing_id.clone(),
            fetched_at: self.fetched_at,
        }
    }

    pub fn listing_id(&self) -> ListingId {
        ListingId::new(self.source, self.source_listing_id.clone())
    }
}

// ---------------------------------------------------------------------------
// Canonical vocabulary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Apartment,
    House,
    Commercial,
    Land,
    Rural,
    /// Source label that has no canonical mapping, kept verbatim.
    Unmapped(String),
    /// The source did not state a type.
    Unknown,
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyType::Apartment => write!(f, "apartment"),
            PropertyType::House => write!(f, "house"),
            PropertyType::Commercial => write!(f, "commercial"),
            PropertyType::Land => write!(f, "land"),
            PropertyType::Rural => write!(f, "rural"),
            PropertyType::Unmapped(label) => write!(f, "unmapped:{label}"),
            PropertyType::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    /// Canonical city slug, e.g. `sao_paulo`.
    Known(String),
    /// Source label that has no canonical mapping, kept verbatim.
    Unmapped(String),
    Unknown,
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Region::Known(slug) => write!(f, "{slug}"),
            Region::Unmapped(label) => write!(f, "unmapped:{label}"),
            Region::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occupancy {
    Vacant,
    Occupied,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegalRisk {
    /// Property is under a court attachment (penhora).
    Lien,
    /// Unpaid condominium fees or property tax pass to the buyer.
    OutstandingDebts,
    /// Ongoing lawsuit over the property or the auction itself.
    PendingLitigation,
    /// Registry record missing or irregular.
    IrregularRegistration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentTerms {
    Cash,
    Installments,
    Financing,
    Unknown,
}

// ---------------------------------------------------------------------------
// Silver layer
// ---------------------------------------------------------------------------

/// Canonical, validated listing. Absent values stay `None`; nothing is coerced to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub channel: Channel,
    pub title: String,
    /// Asking price (traditional) or current minimum bid (auction), in BRL.
    pub price: Option<f64>,
    /// Auction opening value when the page shows it separately from the current bid.
    pub initial_price: Option<f64>,
    /// Square meters, strictly positive when present.
    pub area: Option<f64>,
    pub property_type: PropertyType,
    pub region: Region,
    pub address: Option<String>,
    pub occupancy_status: Occupancy,
    pub legal_risk_flags: BTreeSet<LegalRisk>,
    pub payment_terms: PaymentTerms,
    /// 1 for first praça, 2 for second. Auction-only.
    pub auction_round: Option<u8>,
    pub auction_date: Option<String>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    pub parking_spaces: Option<u32>,
    pub features: Vec<String>,
    pub captured_from: CaptureRef,
}

impl Listing {
    /// `price / area` only when both are known and `area > 0`.
    pub fn price_per_area(&self) -> Option<f64> {
        match (self.price, self.area) {
            (Some(price), Some(area)) if area > 0.0 => Some(price / area),
            _ => None,
        }
    }
}

impl AsRef<Listing> for Listing {
    fn as_ref(&self) -> &Listing {
        self
    }
}

/// A capture that failed normalization, kept for inspection instead of promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub capture: CaptureRef,
    pub error: ValidationError,
    pub recorded_at: DateTime<Utc>,
}


#[cfg(test)]
mod tests {
    use super::fixtures::listing;
    use super::*;

    #[test]
    fn price_per_area_requires_both_fields() {
        let both = listing(SourceId::VivaReal, "a", Some(500_000.0), Some(100.0));
        assert_eq!(both.price_per_area(), Some(5_000.0));

        let no_price = listing(SourceId::VivaReal, "b", None, Some(100.0));
        assert_eq!(no_price.price_per_area(), None);

        let no_area = listing(SourceId::VivaReal, "c", Some(500_000.0), None);
        assert_eq!(no_area.price_per_area(), None);

        let zero_area = listing(SourceId::VivaReal, "d", Some(500_000.0), Some(0.0));
        assert_eq!(zero_area.price_per_area(), None);
    }

    #[test]
    fn source_determines_channel() {
        assert_eq!(SourceId::LeiloesJudiciais.channel(), Channel::Auction);
        assert_eq!(SourceId::VivaReal.channel(), Channel::Traditional);
        assert_eq!(SourceId::parse("vivareal"), Some(SourceId::VivaReal));
        assert_eq!(SourceId::parse("zap"), None);
    }

    #[test]
    fn unmapped_labels_display_verbatim() {
        assert_eq!(PropertyType::Unmapped("Box".into()).to_string(), "unmapped:Box");
        assert_eq!(Region::Known("goiania".into()).to_string(), "goiania");
    }
}
