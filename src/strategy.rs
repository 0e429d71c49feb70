//! Strategy selection: maps a document size to an ordered list of extraction strategies.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SizeLimits;
use crate::error::ExtractError;

/// A named method of turning document bytes into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Whole document in one OCR call.
    DirectOcr,
    /// Page-range chunks, one OCR call each.
    ChunkedOcr,
    /// Upload once to the LLM file store, extract by reference.
    ManagedFileLlm,
    /// Page-range chunks inlined into individual LLM calls.
    ChunkedLlm,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::DirectOcr => "direct-ocr",
            Strategy::ChunkedOcr => "chunked-ocr",
            Strategy::ManagedFileLlm => "managed-file-llm",
            Strategy::ChunkedLlm => "chunked-llm",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "direct-ocr" => Some(Strategy::DirectOcr),
            "chunked-ocr" => Some(Strategy::ChunkedOcr),
            "managed-file-llm" => Some(Strategy::ManagedFileLlm),
            "chunked-llm" => Some(Strategy::ChunkedLlm),
            _ => None,
        }
    }

    /// Whether this strategy splits the document into page-range chunks.
    pub fn requires_chunking(&self) -> bool {
        matches!(self, Strategy::ChunkedOcr | Strategy::ChunkedLlm)
    }

    pub fn uses_llm(&self) -> bool {
        matches!(self, Strategy::ManagedFileLlm | Strategy::ChunkedLlm)
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordered strategies for one document. Computed once, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyPlan {
    strategies: Vec<Strategy>,
    /// The document is past the managed-file threshold and was admitted only
    /// because the caller confirmed it.
    pub requires_confirmation: bool,
}

impl StrategyPlan {
    pub fn new(strategies: Vec<Strategy>) -> Self {
        Self {
            strategies,
            requires_confirmation: false,
        }
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn first(&self) -> Option<Strategy> {
        self.strategies.first().copied()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn contains(&self, strategy: Strategy) -> bool {
        self.strategies.contains(&strategy)
    }

    /// A copy of this plan with `strategy` removed (e.g. when a service is disabled).
    pub fn without(&self, strategy: Strategy) -> Self {
        Self {
            strategies: self
                .strategies
                .iter()
                .copied()
                .filter(|s| *s != strategy)
                .collect(),
            requires_confirmation: self.requires_confirmation,
        }
    }

    pub fn describe(&self) -> String {
        self.strategies
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// Choose the strategy order for a document of `size` bytes.
///
/// Fails with `OversizedDocument` before anything touches the network when
/// the size is past the recommended maximum without an override, or past the
/// absolute maximum at all.
pub fn select(
    size: u64,
    allow_oversized: bool,
    limits: &SizeLimits,
) -> Result<StrategyPlan, ExtractError> {
    if size > limits.absolute_max_bytes {
        return Err(ExtractError::OversizedDocument {
            size,
            limit: limits.absolute_max_bytes,
            overridable: false,
        });
    }
    if size > limits.recommended_max_bytes && !allow_oversized {
        return Err(ExtractError::OversizedDocument {
            size,
            limit: limits.recommended_max_bytes,
            overridable: true,
        });
    }

    let strategies = if size <= limits.comfortable_bytes {
        vec![Strategy::DirectOcr]
    } else if size <= limits.chunk_bytes {
        vec![Strategy::ChunkedOcr]
    } else {
        vec![Strategy::ManagedFileLlm, Strategy::ChunkedLlm]
    };

    let plan = StrategyPlan {
        strategies,
        requires_confirmation: size > limits.managed_file_bytes,
    };
    debug!(size, plan = %plan.describe(), "Selected strategy plan");
    Ok(plan)
}
