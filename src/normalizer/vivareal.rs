use super::parse::{first_integer, parse_area, parse_currency, Locale};
use super::{joined, vocab, Doc};
use crate::error::ValidationError;
use crate::types::{Channel, Listing, PropertyType, RawCapture, Region};

const TITLE: &[&str] = &["h1"];
const PRICE: &[&str] = &[".price", ".valor", r#"[data-testid="price"]"#, ".js-price"];
const ADDRESS: &[&str] = &[".address", ".endereco", r#"[data-testid="address"]"#];
const AREA: &[&str] = &[".area", ".metragem", r#"[data-testid="area"]"#];
const NEIGHBORHOOD: &[&str] = &[".neighborhood"];
const CITY: &[&str] = &[".city"];
const BEDROOMS: &[&str] = &[".bedrooms"];
const BATHROOMS: &[&str] = &[".bathrooms"];
const PARKING: &[&str] = &[".parking"];
const PROPERTY_TYPE: &[&str] = &[".property-type"];
const DESCRIPTION: &[&str] = &[".description"];
const FEATURES: &str = ".feature, .caracteristica, .amenity";

pub fn normalize(capture: &RawCapture) -> Result<Listing, ValidationError> {
    let doc = Doc::parse(&capture.payload);

    let title = doc.text(TITLE).ok_or_else(|| ValidationError::missing("title"))?;
    let price = match doc.text(PRICE) {
        Some(raw) => parse_currency("price", &raw, Locale::PtBr)?,
        None => None,
    };
    let area = match doc.text(AREA) {
        Some(raw) => parse_area("area", &raw, Locale::PtBr)?,
        None => None,
    };

    let property_type = match vocab::property_type(doc.text(PROPERTY_TYPE).as_deref()) {
        PropertyType::Unknown => vocab::property_type_from_title(&title),
        known => known,
    };

    let address = doc.text(ADDRESS);
    let neighborhood = doc.text(NEIGHBORHOOD);
    let city = doc.text(CITY);
    // The city label is authoritative; the street address is only a fallback.
    let region = match vocab::region(city.as_deref()) {
        Region::Unknown => vocab::region(address.as_deref()),
        known => known,
    };
    let address = match (address, neighborhood) {
        (Some(addr), Some(hood)) if !addr.contains(&hood) => Some(format!("{addr}, {hood}")),
        (Some(addr), _) => Some(addr),
        (None, hood) => hood,
    };

    let description = doc.text(DESCRIPTION);
    let notes = joined(&[description.as_deref()]);

    Ok(Listing {
        id: capture.listing_id(),
        channel: Channel::Traditional,
        price,
        initial_price: None,
        area,
        property_type,
        region,
        address,
        occupancy_status: vocab::occupancy(&notes),
        legal_risk_flags: vocab::legal_risks(&notes),
        payment_terms: vocab::payment_terms(&notes),
        auction_round: None,
        auction_date: None,
        bedrooms: doc.text(BEDROOMS).as_deref().and_then(first_integer),
        bathrooms: doc.text(BATHROOMS).as_deref().and_then(first_integer),
        parking_spaces: doc.text(PARKING).as_deref().and_then(first_integer),
        features: doc.texts(FEATURES),
        captured_from: capture.key(),
        title,
    })
}
