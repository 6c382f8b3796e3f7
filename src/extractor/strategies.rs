//! Price-extraction heuristics, tried in the order of [`DEFAULT_STRATEGIES`]:
//!
//! 1. `structured_meta`: microdata and Open Graph price tags
//! 2. `json_ld`: schema.org `offers` blocks
//! 3. `known_ids`: well-known price block element ids
//! 4. `price_classes`: common price-block classes and `data-price` attributes
//! 5. `currency_text`: a currency symbol or code next to digits in visible text
//!
//! Each strategy only returns candidate tokens. Normalisation and the
//! plausibility check are applied by the extractor.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type StrategyFn = fn(&Html) -> Result<Vec<String>, StrategyError>;

#[derive(Clone, Copy)]
pub struct Strategy {
    pub name: &'static str,
    pub find: StrategyFn,
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy").field("name", &self.name).finish()
    }
}

pub const DEFAULT_STRATEGIES: [Strategy; 5] = [
    Strategy { name: "structured_meta", find: structured_meta },
    Strategy { name: "json_ld", find: json_ld },
    Strategy { name: "known_ids", find: known_ids },
    Strategy { name: "price_classes", find: price_classes },
    Strategy { name: "currency_text", find: currency_text },
];

const META_SELECTORS: [&str; 4] = [
    r#"meta[itemprop="price"]"#,
    r#"meta[property="product:price:amount"]"#,
    r#"meta[property="og:price:amount"]"#,
    r#"[itemprop="price"]"#,
];

const KNOWN_IDS: [&str; 3] = [
    "#priceblock_ourprice",
    "#priceblock_dealprice",
    "#priceblock_saleprice",
];

const PRICE_CLASS_SELECTORS: [&str; 8] = [
    ".a-price .a-offscreen",
    ".price-current",
    ".current-price",
    ".sale-price",
    ".product-price",
    ".price",
    "[data-price]",
    r#"[class*="price"]"#,
];

const CURRENCY_PATTERN: &str = r"(?:(?:US\$|[$£€¥₹]|\b(?:USD|EUR|GBP|AUD|CAD|JPY|INR))\s*(\d(?:[\d.,]| \d{3}\b)*))|(?:(\d(?:[\d.,]| \d{3}\b)*)\s*(?:[$£€¥₹]|(?:USD|EUR|GBP|AUD|CAD|JPY|INR)\b))";

const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

fn selector(css: &str) -> Result<Selector, StrategyError> {
    Selector::parse(css).map_err(|e| StrategyError::Selector {
        selector: css.to_string(),
        message: format!("{:?}", e),
    })
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// `content` attribute first, falling back to the element's text.
fn content_or_text(element: &ElementRef) -> Option<String> {
    element
        .value()
        .attr("content")
        .map(|c| c.trim().to_string())
        .or_else(|| Some(element_text(element)))
        .filter(|s| !s.is_empty())
}

pub fn structured_meta(document: &Html) -> Result<Vec<String>, StrategyError> {
    let mut candidates = Vec::new();
    for css in META_SELECTORS {
        let sel = selector(css)?;
        candidates.extend(document.select(&sel).filter_map(|e| content_or_text(&e)));
    }
    Ok(candidates)
}

pub fn json_ld(document: &Html) -> Result<Vec<String>, StrategyError> {
    let sel = selector(r#"script[type="application/ld+json"]"#)?;
    let mut candidates = Vec::new();

    for script in document.select(&sel) {
        let raw = script.text().collect::<String>();
        // One malformed block must not hide the others
        let Ok(value) = serde_json::from_str::<Value>(&raw) else {
            tracing::trace!("skipping malformed JSON-LD block");
            continue;
        };
        collect_offer_prices(&value, &mut candidates);
    }

    Ok(candidates)
}

fn collect_offer_prices(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_offer_prices(item, out);
            }
        }
        Value::Object(map) => {
            if let Some(offers) = map.get("offers") {
                push_offer_prices(offers, out);
            }
            for (key, nested) in map {
                if key != "offers" && (nested.is_object() || nested.is_array()) {
                    collect_offer_prices(nested, out);
                }
            }
        }
        _ => {}
    }
}

fn push_offer_prices(offers: &Value, out: &mut Vec<String>) {
    match offers {
        Value::Array(items) => {
            for item in items {
                push_offer_prices(item, out);
            }
        }
        Value::Object(offer) => {
            for field in ["price", "lowPrice"] {
                if let Some(price) = offer.get(field).and_then(json_scalar) {
                    out.push(price);
                }
            }
            if let Some(spec) = offer.get("priceSpecification") {
                push_offer_prices(spec, out);
            }
        }
        _ => {}
    }
}

fn json_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn known_ids(document: &Html) -> Result<Vec<String>, StrategyError> {
    let mut candidates = Vec::new();
    for css in KNOWN_IDS {
        let sel = selector(css)?;
        candidates.extend(
            document
                .select(&sel)
                .map(|e| element_text(&e))
                .filter(|t| !t.is_empty()),
        );
    }
    Ok(candidates)
}

pub fn price_classes(document: &Html) -> Result<Vec<String>, StrategyError> {
    let mut candidates = Vec::new();
    for css in PRICE_CLASS_SELECTORS {
        let sel = selector(css)?;
        for element in document.select(&sel) {
            if let Some(attr) = element.value().attr("data-price") {
                candidates.push(attr.trim().to_string());
            }
            let text = element_text(&element);
            if !text.is_empty() {
                candidates.push(text);
            }
        }
    }
    Ok(candidates)
}

pub fn currency_text(document: &Html) -> Result<Vec<String>, StrategyError> {
    let pattern = Regex::new(CURRENCY_PATTERN)?;
    let text = visible_text(document);

    Ok(pattern
        .captures_iter(&text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .collect())
}

/// Text content of the document, skipping script-like elements.
pub fn visible_text(document: &Html) -> String {
    let mut parts = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|e| HIDDEN_ELEMENTS.contains(&e.name()))
                .unwrap_or(false)
        });
        let trimmed = text.trim();
        if !hidden && !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }

    parts.join(" ")
}
