//! Mapping of free-text Portuguese labels onto the canonical vocabulary.

use std::collections::BTreeSet;

use crate::types::{LegalRisk, Occupancy, PaymentTerms, PropertyType, Region};

/// Lowercase and strip Portuguese diacritics; ordinal indicators become letters.
pub fn fold(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' | 'ª' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'º' | '°' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

const PROPERTY_TYPES: &[(&[&str], PropertyType)] = &[
    (&["fazenda", "sitio", "chacara", "rural", "haras"], PropertyType::Rural),
    (&["apartamento", "apto", "cobertura", "flat", "kitnet", "quitinete", "studio", "loft"], PropertyType::Apartment),
    (&["casa", "sobrado", "residencia", "village"], PropertyType::House),
    (&["sala", "loja", "comercial", "galpao", "predio", "escritorio", "ponto", "box"], PropertyType::Commercial),
    (&["terreno", "lote", "area"], PropertyType::Land),
];

fn match_property_type(folded: &str) -> Option<PropertyType> {
    PROPERTY_TYPES
        .iter()
        .find(|(words, _)| words.iter().any(|w| folded.contains(w)))
        .map(|(_, kind)| kind.clone())
}

/// Canonical type of an explicit type label. Unrecognized labels are kept verbatim.
pub fn property_type(label: Option<&str>) -> PropertyType {
    let Some(label) = label.map(str::trim).filter(|l| !l.is_empty()) else {
        return PropertyType::Unknown;
    };
    match_property_type(&fold(label)).unwrap_or_else(|| PropertyType::Unmapped(label.to_string()))
}

/// Type guessed from a listing title, for pages without a type label.
pub fn property_type_from_title(title: &str) -> PropertyType {
    match_property_type(&fold(title)).unwrap_or(PropertyType::Unknown)
}

const CITIES: &[(&str, &str)] = &[
    ("sao paulo", "sao_paulo"),
    ("rio de janeiro", "rio_de_janeiro"),
    ("goiania", "goiania"),
    ("brasilia", "brasilia"),
    ("distrito federal", "brasilia"),
    ("belo horizonte", "belo_horizonte"),
    ("curitiba", "curitiba"),
    ("porto alegre", "porto_alegre"),
    ("salvador", "salvador"),
    ("recife", "recife"),
    ("fortaleza", "fortaleza"),
];

/// Region of a city or address label. When several known cities appear (e.g.
/// "Rua São Paulo, 10 - Curitiba/PR") the last one wins, since addresses end with the city.
pub fn region(label: Option<&str>) -> Region {
    let Some(label) = label.map(str::trim).filter(|l| !l.is_empty()) else {
        return Region::Unknown;
    };
    let folded: String = fold(label)
        .chars()
        .map(|c| if c == '-' || c == '_' { ' ' } else { c })
        .collect();

    let found = CITIES
        .iter()
        .filter_map(|(name, slug)| folded.rfind(name).map(|pos| (pos, *slug)))
        .max_by_key(|(pos, _)| *pos);
    if let Some((_, slug)) = found {
        return Region::Known(slug.to_string());
    }
    Region::Unmapped(unmapped_city(label).to_string())
}

/// City part of an address outside the vocabulary: the state code is
/// dropped, then the last comma or " - " component is kept.
/// "Rua das Flores, 100 - Centro, Anápolis/GO" → "Anápolis".
fn unmapped_city(label: &str) -> &str {
    let without_uf = label
        .rsplit_once(|c: char| c == '-' || c == '/' || c == ',')
        .filter(|(_, uf)| {
            let uf = uf.trim();
            uf.len() == 2 && uf.chars().all(|c| c.is_ascii_alphabetic())
        })
        .map_or(label, |(rest, _)| rest);
    let last = without_uf.rsplit(',').next().unwrap_or(without_uf);
    let city = last.rsplit(" - ").next().unwrap_or(last).trim();
    if city.chars().any(char::is_alphabetic) {
        city
    } else {
        without_uf.trim()
    }
}

pub fn occupancy(text: &str) -> Occupancy {
    let folded = fold(text);
    if ["desocupad", "livre de ocupa", "vago", "imovel livre"].iter().any(|w| folded.contains(w)) {
        Occupancy::Vacant
    } else if folded.contains("ocupad") {
        Occupancy::Occupied
    } else {
        Occupancy::Unknown
    }
}

const LEGAL_RISKS: &[(&[&str], LegalRisk)] = &[
    (&["penhora", "arresto", "hipoteca"], LegalRisk::Lien),
    (&["debito", "divida", "iptu em atraso", "condominio em atraso", "taxas em aberto"], LegalRisk::OutstandingDebts),
    (&["litigio", "embargo", "acao anulatoria", "recurso pendente", "sub judice"], LegalRisk::PendingLitigation),
    (
        &["matricula irregular", "sem matricula", "sem escritura", "nao averbad", "irregularidade registral"],
        LegalRisk::IrregularRegistration,
    ),
];

pub fn legal_risks(text: &str) -> BTreeSet<LegalRisk> {
    let folded = fold(text);
    LEGAL_RISKS
        .iter()
        .filter(|(words, _)| words.iter().any(|w| folded.contains(w)))
        .map(|(_, risk)| *risk)
        .collect()
}

/// Most flexible terms mentioned: installments over financing over cash.
pub fn payment_terms(text: &str) -> PaymentTerms {
    let folded = fold(text);
    if folded.contains("parcela") {
        PaymentTerms::Installments
    } else if folded.contains("financ") {
        PaymentTerms::Financing
    } else if folded.contains("a vista") {
        PaymentTerms::Cash
    } else {
        PaymentTerms::Unknown
    }
}

/// Round of the first "Nª praça" / "Nº leilão" mention in the text.
pub fn auction_round(text: &str) -> Option<u8> {
    let folded = fold(text);
    let words: Vec<&str> = folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    words.windows(2).find_map(|pair| {
        if pair[1] != "praca" && pair[1] != "leilao" {
            return None;
        }
        match pair[0] {
            "1" | "1a" | "1o" | "primeira" | "primeiro" => Some(1),
            "2" | "2a" | "2o" | "segunda" | "segundo" => Some(2),
            "3" | "3a" | "3o" | "terceira" | "terceiro" => Some(3),
            _ => None,
        }
    })
}
