use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use tracing::debug;

use crate::data::returns::ReturnMatrix;
use crate::error::MarkowitzError;
use crate::MarkowitzResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Annualized parameters of one simulated asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticAsset {
    pub name: String,
    pub annual_mean: f64,
    pub annual_volatility: f64,
}

/// Input for generating a synthetic daily-return matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticReturnsInput {
    pub assets: Vec<SyntheticAsset>,
    /// Number of daily observations.
    #[serde(default = "default_num_days")]
    pub num_days: usize,
    #[serde(default = "default_trading_days")]
    pub trading_days: u32,
    /// Optional seed for reproducibility.
    pub seed: Option<u64>,
    /// First business day of the index; defaults to 2020-01-01.
    pub start_date: Option<NaiveDate>,
}

fn default_num_days() -> usize {
    252
}

fn default_trading_days() -> u32 {
    252
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Independent normal daily returns for each asset.
///
/// Daily mean is `annual_mean / trading_days` and daily standard deviation
/// `annual_volatility / sqrt(trading_days)`. The index holds consecutive
/// weekdays formatted as `YYYY-MM-DD`.
pub fn generate_returns(input: &SyntheticReturnsInput) -> MarkowitzResult<ReturnMatrix> {
    if input.assets.is_empty() {
        return Err(MarkowitzError::InvalidInput {
            field: "assets".into(),
            reason: "At least one asset is required".into(),
        });
    }
    if input.num_days == 0 {
        return Err(MarkowitzError::InvalidInput {
            field: "num_days".into(),
            reason: "must be positive".into(),
        });
    }
    if input.trading_days == 0 {
        return Err(MarkowitzError::InvalidInput {
            field: "trading_days".into(),
            reason: "must be positive".into(),
        });
    }

    let periods = input.trading_days as f64;
    let mut dists = Vec::with_capacity(input.assets.len());
    for asset in &input.assets {
        if !asset.annual_mean.is_finite() {
            return Err(MarkowitzError::InvalidInput {
                field: format!("{}.annual_mean", asset.name),
                reason: "must be finite".into(),
            });
        }
        let daily_sd = asset.annual_volatility / periods.sqrt();
        let normal = Normal::new(asset.annual_mean / periods, daily_sd).map_err(|e| {
            MarkowitzError::InvalidInput {
                field: format!("{}.annual_volatility", asset.name),
                reason: format!("Invalid normal distribution: {e}"),
            }
        })?;
        dists.push(normal);
    }

    let mut rng = match input.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let rows: Vec<Vec<f64>> = (0..input.num_days)
        .map(|_| dists.iter().map(|d| rng.sample(d)).collect())
        .collect();

    let start = input
        .start_date
        .or_else(|| NaiveDate::from_ymd_opt(2020, 1, 1))
        .ok_or_else(|| MarkowitzError::InvalidInput {
            field: "start_date".into(),
            reason: "invalid date".into(),
        })?;
    let index = business_days(start, input.num_days)
        .into_iter()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect();

    debug!(
        assets = input.assets.len(),
        days = input.num_days,
        seeded = input.seed.is_some(),
        "generated synthetic returns"
    );

    ReturnMatrix::new(
        index,
        input.assets.iter().map(|a| a.name.clone()).collect(),
        rows,
    )
}

/// `count` consecutive weekdays starting at `start` (rolled forward if it
/// falls on a weekend).
fn business_days(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(count);
    let mut day = start;
    while out.len() < count {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            out.push(day);
        }
        day += Duration::days(1);
    }
    out
}
