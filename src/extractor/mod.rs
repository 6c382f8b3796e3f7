pub mod normalize;
pub mod strategies;

use rust_decimal::Decimal;
use scraper::Html;
use serde::{Deserialize, Serialize};

use crate::models::FailureKind;

pub use normalize::{parse_price_token, PriceBounds};
pub use strategies::{Strategy, StrategyError, DEFAULT_STRATEGIES};

/// A successfully extracted price and the strategy that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Extraction {
    pub price: Decimal,
    pub strategy: String,
    pub raw: String,
}

pub type ExtractionResult = Result<Extraction, FailureKind>;

/// Turns raw HTML into a price by trying each strategy in order. Pure: the
/// output depends only on the document and the configured bounds.
#[derive(Debug, Clone)]
pub struct PriceExtractor {
    bounds: PriceBounds,
    strategies: Vec<Strategy>,
}

impl PriceExtractor {
    pub fn new(bounds: PriceBounds) -> Self {
        Self::with_strategies(bounds, DEFAULT_STRATEGIES.to_vec())
    }

    pub fn with_strategies(bounds: PriceBounds, strategies: Vec<Strategy>) -> Self {
        Self { bounds, strategies }
    }

    pub fn extract(&self, html: &str) -> ExtractionResult {
        if html.trim().is_empty() {
            return Err(FailureKind::NoPriceFound);
        }

        let document = Html::parse_document(html);

        for strategy in &self.strategies {
            let candidates = match (strategy.find)(&document) {
                Ok(candidates) => candidates,
                Err(e) => {
                    tracing::debug!(strategy = strategy.name, error = %e, "strategy failed, trying next");
                    continue;
                }
            };

            for raw in candidates {
                match parse_price_token(&raw) {
                    Some(price) if self.bounds.contains(price) => {
                        tracing::debug!(strategy = strategy.name, %price, "price extracted");
                        return Ok(Extraction {
                            price,
                            strategy: strategy.name.to_string(),
                            raw,
                        });
                    }
                    Some(price) => {
                        tracing::trace!(strategy = strategy.name, %price, "implausible price rejected");
                    }
                    None => {}
                }
            }
        }

        Err(FailureKind::NoPriceFound)
    }
}

impl Default for PriceExtractor {
    fn default() -> Self {
        Self::new(PriceBounds::default())
    }
}
