use serde::Serialize;
use statrs::statistics::{Data, OrderStatistics, Statistics};

use super::GroupKey;
use crate::types::{Channel, Listing};

/// Descriptive statistics of one channel within one group. Every statistic is
/// computed over its own non-null observations only; `None` means there were none.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStat {
    pub key: GroupKey,
    pub channel: Channel,
    pub count: usize,
    pub priced_count: usize,
    pub area_count: usize,
    pub price_per_area_count: usize,
    pub mean_price: Option<f64>,
    pub mean_price_per_area: Option<f64>,
    pub mean_area: Option<f64>,
    pub median_price: Option<f64>,
    pub median_price_per_area: Option<f64>,
    /// Ratio of means. Not a substitute for `mean_price_per_area`.
    pub mean_price_over_mean_area: Option<f64>,
}

impl AggregateStat {
    pub fn empty(key: GroupKey, channel: Channel) -> Self {
        Self::compute(key, channel, &[])
    }

    pub fn compute(key: GroupKey, channel: Channel, listings: &[&Listing]) -> Self {
        let prices: Vec<f64> = listings.iter().filter_map(|l| l.price).collect();
        let areas: Vec<f64> = listings.iter().filter_map(|l| l.area).filter(|a| *a > 0.0).collect();
        let ppas: Vec<f64> = listings.iter().filter_map(|l| l.price_per_area()).collect();

        let mean_price = mean(&prices);
        let mean_area = mean(&areas);
        Self {
            key,
            channel,
            count: listings.len(),
            priced_count: prices.len(),
            area_count: areas.len(),
            price_per_area_count: ppas.len(),
            mean_price,
            mean_price_per_area: mean(&ppas),
            mean_area,
            median_price: median(&prices),
            median_price_per_area: median(&ppas),
            mean_price_over_mean_area: ratio(mean_price, mean_area),
        }
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().mean())
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(Data::new(values.to_vec()).median())
}

fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
        _ => None,
    }
}

/// `(traditional − auction) / traditional` in percent. Undefined when either
/// mean is undefined or the traditional mean is zero.
pub fn discount_pct(traditional: Option<f64>, auction: Option<f64>) -> Option<f64> {
    match (traditional, auction) {
        (Some(t), Some(a)) if t != 0.0 => Some((t - a) / t * 100.0),
        _ => None,
    }
}

/// Drop listings whose price per area lies outside the `[lower, upper]`
/// quantiles of the set. Listings without a price per area are kept.
pub fn trim_price_per_area<'a>(listings: Vec<&'a Listing>, lower: f64, upper: f64) -> Vec<&'a Listing> {
    let ppas: Vec<f64> = listings.iter().filter_map(|l| l.price_per_area()).collect();
    if ppas.is_empty() {
        return listings;
    }
    let mut data = Data::new(ppas);
    let (low, high) = (data.quantile(lower), data.quantile(upper));
    listings
        .into_iter()
        .filter(|l| l.price_per_area().map_or(true, |p| p >= low && p <= high))
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::types::fixtures::listing;
    use crate::types::SourceId;

    #[test]
    fn each_statistic_uses_its_own_observations() {
        let a = listing(SourceId::VivaReal, "a", Some(300_000.0), Some(100.0));
        let b = listing(SourceId::VivaReal, "b", None, Some(50.0));
        let c = listing(SourceId::VivaReal, "c", Some(500_000.0), None);
        let stat = AggregateStat::compute(GroupKey::all(), Channel::Traditional, &[&a, &b, &c]);

        assert_eq!(stat.count, 3);
        assert_eq!(stat.priced_count, 2);
        assert_eq!(stat.area_count, 2);
        assert_eq!(stat.price_per_area_count, 1);
        assert_relative_eq!(stat.mean_price.unwrap(), 400_000.0, epsilon = 1e-6);
        assert_relative_eq!(stat.mean_area.unwrap(), 75.0, epsilon = 1e-9);
        assert_relative_eq!(stat.mean_price_per_area.unwrap(), 3_000.0, epsilon = 1e-9);
        assert_relative_eq!(stat.median_price.unwrap(), 400_000.0, epsilon = 1e-6);
        assert_relative_eq!(stat.mean_price_over_mean_area.unwrap(), 5_333.333_333, epsilon = 1e-3);
    }

    #[test]
    fn empty_input_has_no_means() {
        let stat = AggregateStat::empty(GroupKey::all(), Channel::Auction);
        assert_eq!(stat.count, 0);
        assert_eq!(stat.mean_price, None);
        assert_eq!(stat.mean_price_per_area, None);
        assert_eq!(stat.mean_area, None);
        assert_eq!(stat.median_price, None);
        assert_eq!(stat.mean_price_over_mean_area, None);
    }

    #[test]
    fn mean_of_samples() {
        assert_relative_eq!(mean(&[1.0, 2.0, 3.0, 4.0]).unwrap(), 2.5, epsilon = 1e-12);
        assert_relative_eq!(mean(&[3_812.13]).unwrap(), 3_812.13, epsilon = 1e-9);
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn median_of_odd_and_even_sets() {
        assert_relative_eq!(median(&[3.0, 1.0, 2.0]).unwrap(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(median(&[4.0, 1.0, 3.0, 2.0]).unwrap(), 2.5, epsilon = 1e-9);
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn discount_requires_both_operands_and_nonzero_base() {
        assert_relative_eq!(discount_pct(Some(200.0), Some(150.0)).unwrap(), 25.0);
        assert_eq!(discount_pct(Some(200.0), None), None);
        assert_eq!(discount_pct(None, Some(150.0)), None);
        assert_eq!(discount_pct(Some(0.0), Some(150.0)), None);
    }

    #[test]
    fn trimming_drops_outliers_but_keeps_unmeasured_listings() {
        let mut owned: Vec<Listing> = (1..=200)
            .map(|i| listing(SourceId::VivaReal, &i.to_string(), Some(5_000.0 * 100.0 + i as f64), Some(100.0)))
            .collect();
        owned.push(listing(SourceId::VivaReal, "cheap", Some(1.0), Some(100.0)));
        owned.push(listing(SourceId::VivaReal, "huge", Some(1e12), Some(100.0)));
        owned.push(listing(SourceId::VivaReal, "no-area", Some(1e12), None));

        let kept = trim_price_per_area(owned.iter().collect(), 0.01, 0.99);
        let ids: Vec<&str> = kept.iter().map(|l| l.id.source_listing_id.as_str()).collect();
        assert!(!ids.contains(&"cheap"));
        assert!(!ids.contains(&"huge"));
        assert!(ids.contains(&"no-area"));
        assert!(kept.len() > 190);
    }
}
