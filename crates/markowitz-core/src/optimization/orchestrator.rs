use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::covariance::{validate_covariance, CovarianceDiagnostics};
use super::frontier::{
    compute_sharpe, portfolio_return, portfolio_volatility, solve_efficient_risk,
    solve_max_sharpe, Objective,
};
use super::statistics::estimate_statistics;
use super::weights::clean_weights;
use crate::data::returns::ReturnMatrix;
use crate::error::MarkowitzError;
use crate::settings::OptimizerSettings;
use crate::types::{with_metadata, ComputationOutput, Weight, WeightBounds};
use crate::MarkowitzResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A single cleaned asset weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetWeight {
    pub name: String,
    pub weight: Weight,
}

/// Cleaned weights in the column order of the input matrix.
///
/// Serializes as a JSON object `{label: weight}` with numeric weights.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortfolioWeights(Vec<AssetWeight>);

impl PortfolioWeights {
    pub fn new(entries: Vec<AssetWeight>) -> Self {
        Self(entries)
    }

    pub fn get(&self, name: &str) -> Option<Weight> {
        self.0.iter().find(|a| a.name == name).map(|a| a.weight)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetWeight> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> Weight {
        self.0.iter().map(|a| a.weight).sum()
    }

    pub fn as_f64(&self) -> Vec<f64> {
        self.0
            .iter()
            .map(|a| a.weight.to_f64().unwrap_or(0.0))
            .collect()
    }
}

impl Serialize for PortfolioWeights {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for a in &self.0 {
            map.serialize_entry(&a.name, &a.weight.to_f64().unwrap_or(0.0))?;
        }
        map.end()
    }
}

/// Performance of the cleaned portfolio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioMetrics {
    #[serde(with = "rust_decimal::serde::float")]
    pub expected_return: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub expected_volatility: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub sharpe_ratio: Decimal,
    pub active_positions: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_weight: Decimal,
}

/// Result of one optimization run.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationOutput {
    pub optimal_portfolio: PortfolioWeights,
    pub portfolio_metrics: PortfolioMetrics,
    /// Problem whose solution was reported.
    pub objective: Objective,
    pub risk_ceiling: f64,
    pub max_weight: f64,
    /// The ceiling was exceeded but the constrained re-solve failed, so the
    /// max-Sharpe portfolio is reported.
    pub risk_ceiling_fallback: bool,
    pub covariance_diagnostics: CovarianceDiagnostics,
}

/// `{"optimal_portfolio": {...}}`
#[derive(Debug, Serialize)]
pub struct MinimalResponse<'a> {
    pub optimal_portfolio: &'a PortfolioWeights,
}

/// `{"optimal_portfolio": {...}, "portfolio_metrics": {...}}`
#[derive(Debug, Serialize)]
pub struct DetailedResponse<'a> {
    pub optimal_portfolio: &'a PortfolioWeights,
    pub portfolio_metrics: &'a PortfolioMetrics,
}

impl OptimizationOutput {
    pub fn minimal(&self) -> MinimalResponse<'_> {
        MinimalResponse {
            optimal_portfolio: &self.optimal_portfolio,
        }
    }

    pub fn detailed(&self) -> DetailedResponse<'_> {
        DetailedResponse {
            optimal_portfolio: &self.optimal_portfolio,
            portfolio_metrics: &self.portfolio_metrics,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Optimize with default settings. See [`optimize_with_settings`].
pub fn optimize(
    returns: &ReturnMatrix,
    risk_ceiling: f64,
    max_weight: f64,
) -> MarkowitzResult<ComputationOutput<OptimizationOutput>> {
    optimize_with_settings(returns, risk_ceiling, max_weight, &OptimizerSettings::default())
}

/// Maximum-Sharpe allocation, refined to the risk ceiling when it is exceeded.
///
/// Estimation, covariance validation and the max-Sharpe solve abort the run
/// on failure. If the max-Sharpe volatility exceeds `risk_ceiling` the
/// efficient-risk problem is solved at the ceiling; when that fails the
/// max-Sharpe portfolio is kept and a warning is recorded instead of an error.
pub fn optimize_with_settings(
    returns: &ReturnMatrix,
    risk_ceiling: f64,
    max_weight: f64,
    settings: &OptimizerSettings,
) -> MarkowitzResult<ComputationOutput<OptimizationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    settings.validate()?;
    if !risk_ceiling.is_finite() || risk_ceiling <= 0.0 {
        return Err(MarkowitzError::InvalidInput {
            field: "risk_ceiling".into(),
            reason: format!("must be positive and finite, got {}", risk_ceiling),
        });
    }
    let bounds = WeightBounds::new(max_weight)?;
    returns.ensure_min_shape(
        settings.cleaning.min_observations,
        settings.cleaning.min_assets,
    )?;

    // --- Estimate ---
    info!(
        assets = returns.num_assets(),
        observations = returns.num_observations(),
        "estimating annualized statistics"
    );
    let stats = estimate_statistics(returns, settings.trading_days)?;
    let mu = &stats.expected_returns;
    let sigma = stats.covariance_matrix();

    // --- Validate ---
    let diagnostics = validate_covariance(&sigma, settings.eigenvalue_floor)?;
    debug!(
        condition_number = diagnostics.condition_number,
        "covariance accepted"
    );

    // --- Max Sharpe ---
    let rf = settings.risk_free_rate;
    let mut point = solve_max_sharpe(mu, &sigma, bounds, rf, &settings.solver)?;
    info!(
        expected_return = point.expected_return,
        volatility = point.volatility,
        sharpe = point.sharpe_ratio,
        "max-Sharpe portfolio found"
    );

    // --- Risk check ---
    let mut risk_ceiling_fallback = false;
    if point.volatility > risk_ceiling {
        warn!(
            volatility = point.volatility,
            risk_ceiling, "risk ceiling exceeded, attempting constrained re-solve"
        );
        match solve_efficient_risk(mu, &sigma, bounds, risk_ceiling, rf, &settings.solver) {
            Ok(constrained) => {
                info!(
                    expected_return = constrained.expected_return,
                    volatility = constrained.volatility,
                    "risk ceiling applied"
                );
                point = constrained;
            }
            Err(e) => {
                warn!(error = %e, "constrained solve failed, using max-Sharpe fallback");
                warnings.push(format!(
                    "Max-Sharpe volatility {:.4} exceeds risk ceiling {:.4} but the constrained \
                     solve failed ({}); max-Sharpe portfolio retained",
                    point.volatility, risk_ceiling, e
                ));
                risk_ceiling_fallback = true;
            }
        }
    }

    // --- Clean & report ---
    let cleaned = clean_weights(
        &point.weights,
        bounds.max_weight,
        settings.weight_floor,
        settings.weight_decimals,
    )?;
    let optimal_portfolio = PortfolioWeights::new(
        stats
            .asset_names
            .iter()
            .cloned()
            .zip(cleaned)
            .map(|(name, weight)| AssetWeight { name, weight })
            .collect(),
    );
    let portfolio_metrics = compute_metrics(&optimal_portfolio, &stats.expected_returns, &sigma, settings)?;

    if portfolio_metrics.active_positions == 1 {
        warnings.push("Portfolio is concentrated in a single asset".into());
    }

    let output = OptimizationOutput {
        optimal_portfolio,
        portfolio_metrics,
        objective: point.objective,
        risk_ceiling,
        max_weight,
        risk_ceiling_fallback,
        covariance_diagnostics: diagnostics,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Markowitz mean-variance optimization (max Sharpe, efficient-risk refinement)",
        &serde_json::json!({
            "n_assets": stats.num_assets(),
            "n_observations": stats.num_observations,
            "trading_days": settings.trading_days,
            "risk_free_rate": rf,
            "max_weight": max_weight,
            "risk_ceiling": risk_ceiling,
            "eigenvalue_floor": settings.eigenvalue_floor,
            "weight_floor": settings.weight_floor,
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Metrics of the cleaned weights, rounded for reporting.
fn compute_metrics(
    weights: &PortfolioWeights,
    mu: &[f64],
    sigma: &nalgebra::DMatrix<f64>,
    settings: &OptimizerSettings,
) -> MarkowitzResult<PortfolioMetrics> {
    let w = weights.as_f64();
    let ret = portfolio_return(&w, mu);
    let vol = portfolio_volatility(&w, sigma);
    let sharpe = compute_sharpe(ret, settings.risk_free_rate, vol);

    let threshold = Decimal::from_f64(settings.active_position_threshold).unwrap_or(Decimal::ZERO);
    let active_positions = weights.iter().filter(|a| a.weight > threshold).count();

    Ok(PortfolioMetrics {
        expected_return: round_metric(ret, settings.metric_decimals)?,
        expected_volatility: round_metric(vol, settings.metric_decimals)?,
        sharpe_ratio: round_metric(sharpe, settings.metric_decimals)?,
        active_positions,
        total_weight: weights.total().round_dp(settings.metric_decimals),
    })
}

fn round_metric(value: f64, decimals: u32) -> MarkowitzResult<Decimal> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(decimals))
        .ok_or_else(|| {
            MarkowitzError::numerical("portfolio metrics", format!("metric {} is not representable", value))
        })
}
