//! Token pricing for cost estimates.

use crate::models::{CostEstimate, TokenUsage};

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

pub const FLASH_PRICING: ModelPricing = ModelPricing {
    input_per_million: 0.075,
    output_per_million: 0.30,
};

pub const PRO_PRICING: ModelPricing = ModelPricing {
    input_per_million: 1.25,
    output_per_million: 5.00,
};

/// Tokens assumed per inline section when estimating before a run.
pub const SECTION_INPUT_TOKENS: u64 = 1_000;
pub const SECTION_OUTPUT_TOKENS: u64 = 32_000;

/// Pricing by model family; anything not recognized as "pro" is billed as flash.
pub fn pricing_for(model: &str) -> ModelPricing {
    if model.to_lowercase().contains("pro") {
        PRO_PRICING
    } else {
        FLASH_PRICING
    }
}

impl ModelPricing {
    pub fn cost_usd(&self, usage: TokenUsage) -> f64 {
        usage.input_tokens as f64 / 1_000_000.0 * self.input_per_million
            + usage.output_tokens as f64 / 1_000_000.0 * self.output_per_million
    }
}

/// Cost of a finished LLM call (or sum of calls) on `model`.
pub fn llm_cost(model: &str, usage: TokenUsage) -> CostEstimate {
    CostEstimate::llm(usage, pricing_for(model).cost_usd(usage))
}

/// Up-front estimate for `sections` inline calls on `model`.
pub fn estimate_sections_cost(model: &str, sections: usize) -> f64 {
    let usage = TokenUsage::new(
        SECTION_INPUT_TOKENS * sections as u64,
        SECTION_OUTPUT_TOKENS * sections as u64,
    );
    pricing_for(model).cost_usd(usage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pricing_family() {
        assert_eq!(pricing_for("gemini-2.5-pro"), PRO_PRICING);
        assert_eq!(pricing_for("gemini-2.5-flash"), FLASH_PRICING);
        assert_eq!(pricing_for("something-else"), FLASH_PRICING);
    }

    #[test]
    fn test_llm_cost() {
        let cost = llm_cost("gemini-2.5-flash", TokenUsage::new(1_000_000, 1_000_000));
        assert!((cost.usd - 0.375).abs() < 1e-9);
        assert_eq!(cost.input_tokens, 1_000_000);
    }

    #[test]
    fn test_estimate_sections_cost() {
        // 1000 in + 32000 out on pro: 0.00125 + 0.16
        let usd = estimate_sections_cost("gemini-2.5-pro", 1);
        assert!((usd - 0.16125).abs() < 1e-9);
    }
}
