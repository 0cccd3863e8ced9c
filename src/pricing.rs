//! Per-model token pricing.
//!
//! Rates are USD per million tokens. Lookup is by exact model identifier;
//! `o4-mini-2025-04-16` is the dated alias of `o4-mini` and shares its rates.

use serde::Serialize;

pub const CURRENCY: &str = "USD";

/// (input, output) USD per million tokens.
const PRICE_TABLE: &[(&str, f64, f64)] = &[
    ("o3", 2.0, 8.0),
    ("o4-mini", 0.55, 2.20),
    ("o4-mini-2025-04-16", 0.55, 2.20),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub currency: &'static str,
}

impl CostBreakdown {
    pub fn zero() -> Self {
        Self {
            input_cost: 0.0,
            output_cost: 0.0,
            total_cost: 0.0,
            currency: CURRENCY,
        }
    }
}

pub fn pricing_for(model: &str) -> Option<ModelPricing> {
    PRICE_TABLE
        .iter()
        .find(|(id, _, _)| *id == model)
        .map(|&(_, input, output)| ModelPricing {
            input_per_mtok: input,
            output_per_mtok: output,
        })
}

/// Identifiers with a known price, in table order.
pub fn priced_models() -> impl Iterator<Item = &'static str> {
    PRICE_TABLE.iter().map(|(id, _, _)| *id)
}

/// Cost of one call. Unknown models cost nothing rather than failing.
pub fn price(model: &str, input_tokens: i64, output_tokens: i64) -> CostBreakdown {
    let Some(pricing) = pricing_for(model) else {
        return CostBreakdown::zero();
    };

    let input_cost = round6(input_tokens as f64 / 1_000_000.0 * pricing.input_per_mtok);
    let output_cost = round6(output_tokens as f64 / 1_000_000.0 * pricing.output_per_mtok);

    CostBreakdown {
        input_cost,
        output_cost,
        // Re-round: the sum of two 6-place values can pick up float noise.
        total_cost: round6(input_cost + output_cost),
        currency: CURRENCY,
    }
}

fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}
