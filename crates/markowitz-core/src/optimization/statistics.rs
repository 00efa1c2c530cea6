use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::returns::ReturnMatrix;
use crate::error::MarkowitzError;
use crate::MarkowitzResult;

/// Annualized first and second moments of a return matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetStatistics {
    pub asset_names: Vec<String>,
    /// Daily mean x trading days.
    pub expected_returns: Vec<f64>,
    /// Unbiased daily sample covariance x trading days.
    pub covariance: Vec<Vec<f64>>,
    pub num_observations: usize,
    pub trading_days: u32,
}

impl AssetStatistics {
    pub fn num_assets(&self) -> usize {
        self.asset_names.len()
    }

    pub fn covariance_matrix(&self) -> DMatrix<f64> {
        let n = self.num_assets();
        DMatrix::from_fn(n, n, |i, j| self.covariance[i][j])
    }

    /// Annualized volatility of each asset on its own.
    pub fn volatilities(&self) -> Vec<f64> {
        (0..self.num_assets())
            .map(|i| self.covariance[i][i].max(0.0).sqrt())
            .collect()
    }
}

/// Estimate annualized expected returns and covariance.
///
/// Fails if any resulting entry is not finite, which only happens when a
/// degenerate column slipped through cleaning.
pub fn estimate_statistics(
    returns: &ReturnMatrix,
    trading_days: u32,
) -> MarkowitzResult<AssetStatistics> {
    let t = returns.num_observations();
    let n = returns.num_assets();
    if t < 2 {
        return Err(MarkowitzError::InsufficientData(format!(
            "sample covariance needs at least 2 observations, found {}",
            t
        )));
    }

    let annualization = trading_days as f64;
    let x = returns.to_dmatrix();

    let means: Vec<f64> = (0..n).map(|c| x.column(c).mean()).collect();
    let mut centered = x;
    for (c, m) in means.iter().enumerate() {
        centered.column_mut(c).add_scalar_mut(-m);
    }
    let daily_cov = (centered.transpose() * &centered) / (t as f64 - 1.0);

    let expected_returns: Vec<f64> = means.iter().map(|m| m * annualization).collect();
    let covariance: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            (0..n)
                .map(|j| 0.5 * (daily_cov[(i, j)] + daily_cov[(j, i)]) * annualization)
                .collect()
        })
        .collect();

    let names = returns.assets();
    if let Some(i) = expected_returns.iter().position(|v| !v.is_finite()) {
        return Err(MarkowitzError::Statistics(format!(
            "expected return for '{}' is undefined ({})",
            names[i], expected_returns[i]
        )));
    }
    for i in 0..n {
        if let Some(j) = covariance[i].iter().position(|v| !v.is_finite()) {
            return Err(MarkowitzError::Statistics(format!(
                "covariance between '{}' and '{}' is undefined ({})",
                names[i], names[j], covariance[i][j]
            )));
        }
    }

    debug!(
        assets = n,
        observations = t,
        ?expected_returns,
        "annualized statistics estimated"
    );

    Ok(AssetStatistics {
        asset_names: names.to_vec(),
        expected_returns,
        covariance,
        num_observations: t,
        trading_days,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> ReturnMatrix {
        ReturnMatrix::from_rows(
            vec!["A".into(), "B".into()],
            vec![
                vec![0.01, 0.02],
                vec![0.03, -0.01],
                vec![-0.02, 0.00],
                vec![0.02, 0.03],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_annualized_mean() {
        let s = estimate_statistics(&matrix(), 252).unwrap();
        assert!((s.expected_returns[0] - 0.01 * 252.0).abs() < 1e-12);
        assert!((s.expected_returns[1] - 0.01 * 252.0).abs() < 1e-12);
    }

    #[test]
    fn test_unbiased_covariance() {
        let s = estimate_statistics(&matrix(), 252).unwrap();
        // A deviations: 0, 0.02, -0.03, 0.01 -> sum sq 0.0014 / 3
        let var_a = 0.0014 / 3.0 * 252.0;
        assert!((s.covariance[0][0] - var_a).abs() < 1e-12);
        // A.B deviations: 0*0.01 + 0.02*-0.02 + -0.03*-0.01 + 0.01*0.02 = 0.0001
        let cov_ab = 0.0001 / 3.0 * 252.0;
        assert!((s.covariance[0][1] - cov_ab).abs() < 1e-12);
        assert_eq!(s.covariance[0][1], s.covariance[1][0]);
    }

    #[test]
    fn test_volatilities() {
        let s = estimate_statistics(&matrix(), 252).unwrap();
        let v = s.volatilities();
        assert!((v[0] - s.covariance[0][0].sqrt()).abs() < 1e-15);
    }

    #[test]
    fn test_single_observation_rejected() {
        let m = ReturnMatrix::from_rows(vec!["A".into(), "B".into()], vec![vec![0.01, 0.02]])
            .unwrap();
        assert!(estimate_statistics(&m, 252).is_err());
    }
}
