use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Inclusive range a parsed token must fall in to count as a real price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceBounds {
    pub min: Decimal,
    pub max: Decimal,
}

impl PriceBounds {
    pub fn new(min: Decimal, max: Decimal) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, price: Decimal) -> bool {
        price > Decimal::ZERO && price >= self.min && price <= self.max
    }
}

impl Default for PriceBounds {
    fn default() -> Self {
        Self {
            min: Decimal::new(1, 2),
            max: Decimal::from(10_000_000),
        }
    }
}

/// Digits with `.`/`,` separators, narrow or non-breaking spaces, and plain
/// spaces only where they split off a three-digit group (`1 299,00`).
const NUMBER_PATTERN: &str = r"\d(?:[\d.,\x{a0}\x{202f}]| \d{3}\b)*";

/// Parses the first number in `token`, stripping currency symbols, codes,
/// whitespace and thousands separators. Returns `None` for negative values or
/// anything that does not parse.
pub fn parse_price_token(token: &str) -> Option<Decimal> {
    let number_regex = Regex::new(NUMBER_PATTERN).ok()?;
    let found = number_regex.find(token)?;

    // A minus sign right before the digits (ignoring symbols) means a negative amount
    let prefix = token[..found.start()].trim_end_matches(|c: char| {
        c.is_whitespace() || matches!(c, '$' | '£' | '€' | '¥' | '₹')
    });
    if prefix.ends_with('-') || prefix.ends_with('−') {
        return None;
    }

    let digits: String = found
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let digits = digits.trim_matches(|c| c == '.' || c == ',');
    if digits.is_empty() {
        return None;
    }

    Decimal::from_str(&resolve_separators(digits)).ok()
}

fn resolve_separators(digits: &str) -> String {
    let last_comma = digits.rfind(',');
    let last_dot = digits.rfind('.');

    match (last_comma, last_dot) {
        (Some(comma), Some(dot)) => {
            if comma > dot {
                // 1.299,00
                digits.replace('.', "").replace(',', ".")
            } else {
                // 1,299.00
                digits.replace(',', "")
            }
        }
        (Some(comma), None) => {
            let decimals = digits.len() - comma - 1;
            if digits.matches(',').count() == 1 && decimals != 3 {
                // 49,99
                digits.replace(',', ".")
            } else {
                digits.replace(',', "")
            }
        }
        (None, Some(dot)) => {
            let decimals = digits.len() - dot - 1;
            if digits.matches('.').count() > 1 || (decimals == 3 && !digits.starts_with('0')) {
                // 1.234.567 or 1.299
                digits.replace('.', "")
            } else {
                digits.to_string()
            }
        }
        (None, None) => digits.to_string(),
    }
}
