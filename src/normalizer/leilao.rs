use super::parse::{parse_area, parse_currency, Locale};
use super::{joined, vocab, Doc};
use crate::error::ValidationError;
use crate::types::{Channel, Listing, PropertyType, RawCapture};

const TITLE: &[&str] = &["h1"];
const CURRENT_PRICE: &[&str] = &[".preco-atual", ".lance-minimo"];
const INITIAL_PRICE: &[&str] = &[".preco-inicial", ".valor-avaliacao"];
const AREA: &[&str] = &[".area", ".metragem"];
const PROPERTY_TYPE: &[&str] = &[".tipo-imovel"];
const ADDRESS: &[&str] = &[".endereco"];
const AUCTION_DATE: &[&str] = &[".data-leilao"];
const STATUS: &[&str] = &[".situacao"];
const DESCRIPTION: &[&str] = &[".descricao"];

/// Auction detail page. The price is the current minimum bid, falling back to
/// the opening value when the lot has no current bid yet.
pub fn normalize(capture: &RawCapture) -> Result<Listing, ValidationError> {
    let doc = Doc::parse(&capture.payload);

    let title = doc.text(TITLE).ok_or_else(|| ValidationError::missing("title"))?;

    let current = match doc.text(CURRENT_PRICE) {
        Some(raw) => parse_currency("price", &raw, Locale::PtBr)?,
        None => None,
    };
    let initial_price = match doc.text(INITIAL_PRICE) {
        Some(raw) => parse_currency("initial_price", &raw, Locale::PtBr)?,
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
    let status = doc.text(STATUS);
    let description = doc.text(DESCRIPTION);
    let notes = joined(&[status.as_deref(), description.as_deref()]);

    let auction_round = [status.as_deref(), Some(title.as_str()), description.as_deref()]
        .into_iter()
        .flatten()
        .find_map(vocab::auction_round);

    Ok(Listing {
        id: capture.listing_id(),
        channel: Channel::Auction,
        price: current.or(initial_price),
        initial_price,
        area,
        property_type,
        region: vocab::region(address.as_deref()),
        occupancy_status: vocab::occupancy(&notes),
        legal_risk_flags: vocab::legal_risks(&notes),
        payment_terms: vocab::payment_terms(&notes),
        auction_round,
        auction_date: doc.text(AUCTION_DATE),
        bedrooms: None,
        bathrooms: None,
        parking_spaces: None,
        features: Vec::new(),
        captured_from: capture.key(),
        title,
        address,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::state::capture_store::fixtures::capture;
    use crate::types::{LegalRisk, Occupancy, PaymentTerms, Region, SourceId};

    const LOT: &str = r#"
        <html><body>
          <h1>Apartamento 2 dormitórios - Vila Mariana</h1>
          <span class="tipo-imovel">Apartamento</span>
          <div class="preco-inicial">R$ 480.000,00</div>
          <div class="preco-atual">R$ 312.500,00</div>
          <span class="area">68,4 m²</span>
          <p class="endereco">Rua Domingos de Morais, 1200 - São Paulo/SP</p>
          <span class="data-leilao">25/11/2025 14:00</span>
          <span class="situacao">2ª Praça - Imóvel ocupado</span>
          <div class="descricao">Consta penhora. Pagamento à vista ou parcelado.</div>
        </body></html>"#;

    fn lot(html: &str) -> RawCapture {
        capture(SourceId::LeiloesJudiciais, "lote-77", 1_760_000_000, html)
    }

    #[test]
    fn full_lot_maps_every_field() {
        let listing = normalize(&lot(LOT)).unwrap();
        assert_eq!(listing.channel, Channel::Auction);
        assert_eq!(listing.title, "Apartamento 2 dormitórios - Vila Mariana");
        assert_eq!(listing.price, Some(312_500.0));
        assert_eq!(listing.initial_price, Some(480_000.0));
        assert_eq!(listing.area, Some(68.4));
        assert_eq!(listing.property_type, PropertyType::Apartment);
        assert_eq!(listing.region, Region::Known("sao_paulo".into()));
        assert_eq!(listing.occupancy_status, Occupancy::Occupied);
        assert_eq!(listing.legal_risk_flags, BTreeSet::from([LegalRisk::Lien]));
        assert_eq!(listing.payment_terms, PaymentTerms::Installments);
        assert_eq!(listing.auction_round, Some(2));
        assert_eq!(listing.auction_date.as_deref(), Some("25/11/2025 14:00"));
        assert_eq!(listing.captured_from, lot(LOT).key());
    }

    #[test]
    fn opening_value_stands_in_for_missing_current_price() {
        let html = r#"<h1>Casa</h1><div class="preco-inicial">R$ 200.000,00</div>"#;
        let listing = normalize(&lot(html)).unwrap();
        assert_eq!(listing.price, Some(200_000.0));
        assert_eq!(listing.property_type, PropertyType::House);
        assert_eq!(listing.area, None);
        assert_eq!(listing.price_per_area(), None);
    }

    #[test]
    fn unpriced_lot_keeps_price_absent() {
        let html = r#"<h1>Terreno</h1><div class="preco-atual">Sob consulta</div><span class="metragem">450 m²</span>"#;
        let listing = normalize(&lot(html)).unwrap();
        assert_eq!(listing.price, None);
        assert_eq!(listing.area, Some(450.0));
    }

    #[test]
    fn missing_title_is_a_validation_error() {
        let err = normalize(&lot(r#"<div class="preco-atual">R$ 1.000,00</div>"#)).unwrap_err();
        assert_eq!(err, ValidationError::missing("title"));
    }

    #[test]
    fn garbled_price_is_unparseable() {
        let err = normalize(&lot(r#"<h1>Casa</h1><div class="preco-atual">R$ 1.00.0</div>"#)).unwrap_err();
        assert_eq!(err.field(), "price");
    }

    #[test]
    fn same_capture_normalizes_identically() {
        let capture = lot(LOT);
        assert_eq!(normalize(&capture), normalize(&capture));
    }
}
