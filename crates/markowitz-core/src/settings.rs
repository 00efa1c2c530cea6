use serde::{Deserialize, Serialize};

use crate::error::MarkowitzError;
use crate::MarkowitzResult;

/// Engine-wide tunables. Every field has a default so partial settings files
/// only need to name what they override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    /// Periods per year used to annualize daily statistics.
    pub trading_days: u32,
    /// Annual risk-free rate for the Sharpe ratio.
    pub risk_free_rate: f64,
    /// Eigenvalues at or below this are treated as non-positive.
    pub eigenvalue_floor: f64,
    /// Weights below this after rounding are set to zero.
    pub weight_floor: f64,
    /// Decimal places kept in cleaned weights.
    pub weight_decimals: u32,
    /// Weights above this count as active positions.
    pub active_position_threshold: f64,
    /// Decimal places kept in reported metrics.
    pub metric_decimals: u32,
    pub solver: SolverSettings,
    pub cleaning: CleaningSettings,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            trading_days: 252,
            risk_free_rate: 0.0,
            eigenvalue_floor: 1e-10,
            weight_floor: 1e-4,
            weight_decimals: 6,
            active_position_threshold: 1e-3,
            metric_decimals: 6,
            solver: SolverSettings::default(),
            cleaning: CleaningSettings::default(),
        }
    }
}

/// Interior-point and bisection controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Relative tolerance on residuals and duality gap.
    pub tolerance: f64,
    /// Interior-point iteration cap per QP.
    pub max_iterations: u32,
    /// Absolute volatility tolerance for the efficient-risk search.
    pub bisection_tolerance: f64,
    /// Cap on QP solves spent bracketing and bisecting the risk tolerance.
    pub max_bisection_steps: u32,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 100,
            bisection_tolerance: 1e-9,
            max_bisection_steps: 200,
        }
    }
}

/// Thresholds applied while turning a raw return table into a matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningSettings {
    pub min_observations: usize,
    pub min_assets: usize,
    /// Columns missing more than this fraction of cells are dropped.
    pub max_missing_ratio: f64,
    /// A maximum cell above this suggests prices rather than returns.
    pub price_detection_threshold: f64,
}

impl Default for CleaningSettings {
    fn default() -> Self {
        Self {
            min_observations: 30,
            min_assets: 2,
            max_missing_ratio: 0.10,
            price_detection_threshold: 100.0,
        }
    }
}

impl OptimizerSettings {
    pub fn validate(&self) -> MarkowitzResult<()> {
        let positive = [
            ("eigenvalue_floor", self.eigenvalue_floor),
            ("weight_floor", self.weight_floor),
            ("active_position_threshold", self.active_position_threshold),
            ("solver.tolerance", self.solver.tolerance),
            ("solver.bisection_tolerance", self.solver.bisection_tolerance),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(MarkowitzError::InvalidInput {
                    field: field.into(),
                    reason: format!("must be positive and finite, got {}", value),
                });
            }
        }
        if self.trading_days == 0 {
            return Err(MarkowitzError::InvalidInput {
                field: "trading_days".into(),
                reason: "must be at least 1".into(),
            });
        }
        if !self.risk_free_rate.is_finite() {
            return Err(MarkowitzError::InvalidInput {
                field: "risk_free_rate".into(),
                reason: "must be finite".into(),
            });
        }
        if self.weight_decimals > 12 || self.metric_decimals > 12 {
            return Err(MarkowitzError::InvalidInput {
                field: "weight_decimals".into(),
                reason: "at most 12 decimal places are supported".into(),
            });
        }
        if self.solver.max_iterations == 0 {
            return Err(MarkowitzError::InvalidInput {
                field: "solver.max_iterations".into(),
                reason: "must be at least 1".into(),
            });
        }
        let ratio = self.cleaning.max_missing_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(MarkowitzError::InvalidInput {
                field: "cleaning.max_missing_ratio".into(),
                reason: format!("must lie in [0, 1], got {}", ratio),
            });
        }
        Ok(())
    }
}
