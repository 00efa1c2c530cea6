use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MarkowitzError;
use crate::MarkowitzResult;

/// Spectrum summary of an accepted covariance matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovarianceDiagnostics {
    pub min_eigenvalue: f64,
    pub max_eigenvalue: f64,
    /// max / min eigenvalue.
    pub condition_number: f64,
}

/// Accept a covariance matrix only if it is symmetric positive-definite.
///
/// Every eigenvalue must exceed `eigenvalue_floor`; a smaller one means some
/// assets are (nearly) linear combinations of others. The matrix is never
/// repaired here.
pub fn validate_covariance(
    cov: &DMatrix<f64>,
    eigenvalue_floor: f64,
) -> MarkowitzResult<CovarianceDiagnostics> {
    let n = cov.nrows();
    if n == 0 || cov.ncols() != n {
        return Err(MarkowitzError::InvalidInput {
            field: "covariance_matrix".into(),
            reason: format!("expected a non-empty square matrix, got {}x{}", n, cov.ncols()),
        });
    }
    if let Some(v) = cov.iter().find(|v| !v.is_finite()) {
        return Err(MarkowitzError::Statistics(format!(
            "covariance matrix contains a non-finite entry ({})",
            v
        )));
    }

    let scale = cov.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
    let tolerance = 1e-9 * scale;
    for i in 0..n {
        for j in (i + 1)..n {
            if (cov[(i, j)] - cov[(j, i)]).abs() > tolerance {
                return Err(MarkowitzError::InvalidInput {
                    field: "covariance_matrix".into(),
                    reason: format!(
                        "not symmetric: [{},{}]={} != [{},{}]={}",
                        i,
                        j,
                        cov[(i, j)],
                        j,
                        i,
                        cov[(j, i)]
                    ),
                });
            }
        }
    }

    let eigenvalues = SymmetricEigen::new(cov.clone()).eigenvalues;
    let min_eigenvalue = eigenvalues.min();
    let max_eigenvalue = eigenvalues.max();
    debug!(min_eigenvalue, max_eigenvalue, "covariance spectrum");

    if min_eigenvalue.is_nan() || min_eigenvalue <= eigenvalue_floor {
        return Err(MarkowitzError::IllConditionedCovariance {
            min_eigenvalue,
            floor: eigenvalue_floor,
        });
    }

    Ok(CovarianceDiagnostics {
        min_eigenvalue,
        max_eigenvalue,
        condition_number: max_eigenvalue / min_eigenvalue,
    })
}
