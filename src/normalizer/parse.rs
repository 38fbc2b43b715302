//! Locale-aware number, currency and area parsing.
//!
//! Every parser returns `Ok(None)` when the text carries no number at all
//! ("Sob consulta", "-") and `Err(UnparseableValue)` when it carries digits
//! that do not form a valid number in the given locale. Zero and negative
//! results are reported as absent: a listed price or area is never zero.

use super::vocab::fold;
use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    /// `1.234.567,89`
    PtBr,
    /// `1,234,567.89`
    EnUs,
}

impl Locale {
    fn separators(self) -> (char, char) {
        match self {
            Locale::PtBr => ('.', ','),
            Locale::EnUs => (',', '.'),
        }
    }
}

/// Square meters per unit.
const HECTARE_M2: f64 = 10_000.0;
/// Alqueire paulista.
const ALQUEIRE_M2: f64 = 24_200.0;
const SQUARE_FOOT_M2: f64 = 0.092_903;
const SQUARE_KM_M2: f64 = 1_000_000.0;

fn is_group_space(c: char) -> bool {
    matches!(c, ' ' | '\u{a0}' | '\u{202f}')
}

/// True when `rest` opens with a digit run that could be a thousands group.
/// Runs of any length count so that `12 34` is rejected as bad grouping
/// instead of silently reading `12`.
fn continues_digit_run(rest: &str) -> bool {
    rest.starts_with(|c: char| c.is_ascii_digit())
}

/// Split `text` around its first numeric token (digits plus separators).
/// A space between two digits of the integer part is thousands grouping and
/// comes back as the locale's group separator, so `1 234 567` reads as
/// `1.234.567` in pt-BR.
fn split_number(text: &str, locale: Locale) -> Option<(String, &str)> {
    let (group, decimal) = locale.separators();
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let mut token = String::new();
    let mut end = text.len();
    for (i, c) in text[start..].char_indices() {
        let at = start + i;
        if c.is_ascii_digit() || c == '.' || c == ',' {
            token.push(c);
        } else if is_group_space(c)
            && !token.contains(decimal)
            && token.ends_with(|p: char| p.is_ascii_digit())
            && continues_digit_run(&text[at + c.len_utf8()..])
        {
            token.push(group);
        } else {
            end = at;
            break;
        }
    }
    let token = token.trim_end_matches(['.', ',']).to_string();
    Some((token, &text[end..]))
}

/// Parse one numeric token with strict digit grouping.
pub fn parse_number(token: &str, locale: Locale) -> Option<f64> {
    let (group, decimal) = locale.separators();
    let mut parts = token.split(decimal);
    let integer = parts.next()?;
    let fraction = parts.next();
    if parts.next().is_some() {
        return None;
    }

    let groups: Vec<&str> = integer.split(group).collect();
    let well_grouped = match groups.as_slice() {
        [single] => !single.is_empty() && single.chars().all(|c| c.is_ascii_digit()),
        [first, rest @ ..] => {
            (1..=3).contains(&first.len())
                && first.chars().all(|c| c.is_ascii_digit())
                && rest.iter().all(|g| g.len() == 3 && g.chars().all(|c| c.is_ascii_digit()))
        }
        [] => false,
    };
    if !well_grouped {
        return None;
    }
    if let Some(fraction) = fraction {
        if fraction.is_empty() || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
    }

    let mut normalized: String = groups.concat();
    if let Some(fraction) = fraction {
        normalized.push('.');
        normalized.push_str(fraction);
    }
    normalized.parse::<f64>().ok()
}

fn positive(value: f64) -> Option<f64> {
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Word multiplier following a price, e.g. `R$ 1,2 milhão`, `450 mil`.
fn multiplier(rest: &str) -> f64 {
    let word: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_alphabetic())
        .collect();
    match word.as_str() {
        "milhao" | "milhoes" | "mi" | "mm" => 1_000_000.0,
        "mil" | "k" => 1_000.0,
        _ => 1.0,
    }
}

pub fn parse_currency(field: &str, raw: &str, locale: Locale) -> Result<Option<f64>, ValidationError> {
    let folded = fold(raw);
    let Some((token, rest)) = split_number(&folded, locale) else {
        return Ok(None);
    };
    let value = parse_number(&token, locale).ok_or_else(|| ValidationError::unparseable(field, raw.trim()))?;
    Ok(positive(value * multiplier(rest)))
}

/// Area in square meters. A number without a unit is taken as m².
pub fn parse_area(field: &str, raw: &str, locale: Locale) -> Result<Option<f64>, ValidationError> {
    let folded = fold(raw);
    let Some((token, rest)) = split_number(&folded, locale) else {
        return Ok(None);
    };
    let value = parse_number(&token, locale).ok_or_else(|| ValidationError::unparseable(field, raw.trim()))?;

    let unit = rest.trim_start();
    let factor = if unit.is_empty() || unit.starts_with("m2") || unit.starts_with("m²") || unit.starts_with("metro") {
        1.0
    } else if unit.starts_with("km") {
        SQUARE_KM_M2
    } else if unit.starts_with("ha") || unit.starts_with("hectare") {
        HECTARE_M2
    } else if unit.starts_with("alq") {
        ALQUEIRE_M2
    } else if unit.starts_with("ft") || unit.starts_with("sq ft") || unit.starts_with("pes") {
        SQUARE_FOOT_M2
    } else if unit.starts_with('m') {
        1.0
    } else {
        return Err(ValidationError::unparseable(field, raw.trim()));
    };
    Ok(positive(value * factor))
}

/// First integer in the text, e.g. `3 quartos` → 3.
pub fn first_integer(raw: &str) -> Option<u32> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    let digits: String = raw[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
