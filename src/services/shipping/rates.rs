//! Tariff rules shared by the mock provider and the live-failure estimate.

use super::{Package, Quote, QuoteSource};

const BASE_RATE: f64 = 1500.0;
const EXTRA_KILO_RATE: f64 = 300.0;
const BULKY_VOLUME_CM3: f64 = 10_000.0;
const BULKY_SURCHARGE: f64 = 500.0;
const HIGH_VALUE_THRESHOLD: f64 = 10_000.0;
const HIGH_VALUE_RATE: f64 = 0.01;
const INTERIOR_FROM_POSTAL_CODE: u32 = 5000;
const INTERIOR_SURCHARGE: f64 = 800.0;
const VAT_FACTOR: f64 = 1.21;

/// Cost used when no quote can be obtained at all.
pub const FALLBACK_COST: f64 = BASE_RATE;
pub const ESTIMATE_DELIVERY_DAYS: u32 = 3;

/// Base rate plus per-package weight, volume and declared value surcharges.
pub fn package_rate(packages: &[Package]) -> f64 {
    packages.iter().fold(BASE_RATE, |rate, package| {
        let mut rate = rate;
        if package.kilos > 1.0 {
            rate += (package.kilos - 1.0) * EXTRA_KILO_RATE;
        }
        if package.volume > BULKY_VOLUME_CM3 {
            rate += BULKY_SURCHARGE;
        }
        if package.declared_value > HIGH_VALUE_THRESHOLD {
            rate += package.declared_value * HIGH_VALUE_RATE;
        }
        rate
    })
}

/// `package_rate` with the interior-of-the-country surcharge, rounded.
pub fn zone_rate(packages: &[Package], destination_postal_code: &str) -> f64 {
    let mut rate = package_rate(packages);
    if leading_number(destination_postal_code).is_some_and(|cp| cp > INTERIOR_FROM_POSTAL_CODE) {
        rate += INTERIOR_SURCHARGE;
    }
    rate.round()
}

pub fn mock_delivery_days(destination_postal_code: &str) -> u32 {
    match leading_number(destination_postal_code) {
        Some(cp) if cp < 2000 => 2,
        Some(cp) if cp < 5000 => 3,
        _ => 5,
    }
}

/// Splits a VAT-inclusive total into the two published figures.
pub fn quote_from_total(total: f64, delivery_days: u32, services: &[&str], source: QuoteSource) -> Quote {
    Quote {
        rate: (total / VAT_FACTOR).round(),
        rate_with_vat: total.round(),
        delivery_days,
        services: services.iter().map(|s| (*s).to_owned()).collect(),
        source,
    }
}

pub fn estimate(packages: &[Package]) -> Quote {
    quote_from_total(
        package_rate(packages),
        ESTIMATE_DELIVERY_DAYS,
        &["Estándar"],
        QuoteSource::Estimate,
    )
}

/// Numeric prefix of a postal code ("1414" -> 1414, "5000abc" -> 5000).
pub fn leading_number(postal_code: &str) -> Option<u32> {
    let trimmed = postal_code.trim_start();
    let digits: &str = match trimmed.find(|c: char| !c.is_ascii_digit()) {
        Some(end) => &trimmed[..end],
        None => trimmed,
    };
    digits.parse().ok()
}
