use clap::Args;
use serde_json::Value;
use tracing::{info, warn};

use markowitz_core::data::cleaning::{clean_returns, CleanedReturns, RawReturnTable};
use markowitz_core::{optimize_with_settings, OptimizerSettings};

use crate::input;

/// Arguments for portfolio optimization
#[derive(Args)]
pub struct OptimizeArgs {
    /// Path to a CSV of daily returns (first column is the date); read from stdin if omitted
    #[arg(long)]
    pub returns: Option<String>,

    /// Maximum annualized volatility (0.01 to 2.0)
    #[arg(long)]
    pub risk_level: f64,

    /// Maximum weight per asset (0.01 to 1.0)
    #[arg(long)]
    pub max_weight: f64,

    /// Include portfolio metrics alongside the weights
    #[arg(long, conflicts_with = "envelope")]
    pub detailed: bool,

    /// Print the full result envelope (metrics, cleaning report, warnings, metadata)
    #[arg(long)]
    pub envelope: bool,

    /// Optimizer settings file (.json, .yaml, .yml)
    #[arg(long)]
    pub settings: Option<String>,
}

pub const RISK_LEVEL_RANGE: (f64, f64) = (0.01, 2.0);
pub const MAX_WEIGHT_RANGE: (f64, f64) = (0.01, 1.0);

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    check_range("risk-level", args.risk_level, RISK_LEVEL_RANGE)?;
    check_range("max-weight", args.max_weight, MAX_WEIGHT_RANGE)?;

    let settings = load_settings(&args.settings)?;
    let table = load_table(&args.returns)?;
    let cleaned = clean(&table, &settings)?;

    let mut output = optimize_with_settings(
        &cleaned.matrix,
        args.risk_level,
        args.max_weight,
        &settings,
    )?;
    info!(
        objective = output.result.objective.label(),
        active_positions = output.result.portfolio_metrics.active_positions,
        "optimization finished"
    );

    if args.envelope {
        let mut warnings = cleaned.report.warnings.clone();
        warnings.append(&mut output.warnings);
        output.warnings = warnings;
        let mut value = serde_json::to_value(&output)?;
        if let Value::Object(ref mut map) = value {
            map.insert("data_cleaning".into(), serde_json::to_value(&cleaned.report)?);
        }
        Ok(value)
    } else if args.detailed {
        Ok(serde_json::to_value(output.result.detailed())?)
    } else {
        Ok(serde_json::to_value(output.result.minimal())?)
    }
}

/// Reject a parameter outside `[lo, hi]`.
pub fn check_range(name: &str, value: f64, (lo, hi): (f64, f64)) -> Result<(), String> {
    if value.is_finite() && value >= lo && value <= hi {
        Ok(())
    } else {
        Err(format!("--{} must be between {} and {}, got {}", name, lo, hi, value))
    }
}

pub fn load_settings(
    path: &Option<String>,
) -> Result<OptimizerSettings, Box<dyn std::error::Error>> {
    match path {
        Some(p) => input::file::read_settings(p),
        None => Ok(OptimizerSettings::default()),
    }
}

/// Read the return table from `--returns` or piped stdin.
pub fn load_table(path: &Option<String>) -> Result<RawReturnTable, Box<dyn std::error::Error>> {
    if let Some(p) = path {
        return input::csv_returns::read_returns_csv(p);
    }
    match input::stdin::read_stdin()? {
        Some(text) => Ok(input::csv_returns::parse_returns_csv(text.as_bytes())?),
        None => Err("Provide --returns <file.csv> or pipe a CSV on stdin".into()),
    }
}

pub fn clean(
    table: &RawReturnTable,
    settings: &OptimizerSettings,
) -> Result<CleanedReturns, Box<dyn std::error::Error>> {
    let cleaned = clean_returns(table, &settings.cleaning)?;
    for w in &cleaned.report.warnings {
        warn!("{}", w);
    }
    Ok(cleaned)
}
