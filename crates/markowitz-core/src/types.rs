use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::MarkowitzError;
use crate::MarkowitzResult;

/// Cleaned portfolio weight, exact at the reporting precision.
pub type Weight = Decimal;

/// Per-asset box constraint `[0, max_weight]`, identical for every asset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightBounds {
    pub max_weight: f64,
}

impl WeightBounds {
    pub fn new(max_weight: f64) -> MarkowitzResult<Self> {
        if !max_weight.is_finite() || max_weight <= 0.0 || max_weight > 1.0 {
            return Err(MarkowitzError::InvalidInput {
                field: "max_weight".into(),
                reason: format!("must lie in (0, 1], got {}", max_weight),
            });
        }
        Ok(Self { max_weight })
    }

    /// True when `n` assets capped at `max_weight` can hold the full budget.
    pub fn admits_budget(&self, n: usize) -> bool {
        self.max_weight * n as f64 >= 1.0 - 1e-12
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "ieee754_f64 solver, rust_decimal weights".to_string(),
        },
    }
}
