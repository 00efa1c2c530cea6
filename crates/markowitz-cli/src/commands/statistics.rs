use clap::Args;
use serde::Serialize;
use serde_json::Value;

use markowitz_core::optimization::covariance::{validate_covariance, CovarianceDiagnostics};
use markowitz_core::optimization::statistics::estimate_statistics;

use super::optimize::{clean, load_settings, load_table};

/// Arguments for annualized return statistics
#[derive(Args)]
pub struct StatisticsArgs {
    /// Path to a CSV of daily returns; read from stdin if omitted
    #[arg(long)]
    pub returns: Option<String>,

    /// Optimizer settings file (.json, .yaml, .yml)
    #[arg(long)]
    pub settings: Option<String>,
}

#[derive(Debug, Serialize)]
struct AssetSummary {
    name: String,
    expected_return: f64,
    volatility: f64,
}

#[derive(Debug, Serialize)]
struct StatisticsOutput {
    assets: Vec<AssetSummary>,
    covariance: Vec<Vec<f64>>,
    num_observations: usize,
    trading_days: u32,
    covariance_diagnostics: Option<CovarianceDiagnostics>,
    covariance_error: Option<String>,
}

pub fn run_statistics(args: StatisticsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let settings = load_settings(&args.settings)?;
    let table = load_table(&args.returns)?;
    let cleaned = clean(&table, &settings)?;

    let stats = estimate_statistics(&cleaned.matrix, settings.trading_days)?;
    // An unusable covariance is reported, not fatal: this command is for inspection.
    let (covariance_diagnostics, covariance_error) =
        match validate_covariance(&stats.covariance_matrix(), settings.eigenvalue_floor) {
            Ok(d) => (Some(d), None),
            Err(e) => (None, Some(e.to_string())),
        };

    let assets = stats
        .asset_names
        .iter()
        .zip(stats.expected_returns.iter())
        .zip(stats.volatilities())
        .map(|((name, mu), vol)| AssetSummary {
            name: name.clone(),
            expected_return: *mu,
            volatility: vol,
        })
        .collect();

    let output = StatisticsOutput {
        assets,
        covariance: stats.covariance.clone(),
        num_observations: stats.num_observations,
        trading_days: stats.trading_days,
        covariance_diagnostics,
        covariance_error,
    };
    Ok(serde_json::to_value(output)?)
}
