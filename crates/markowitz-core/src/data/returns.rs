use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::MarkowitzError;
use crate::MarkowitzResult;

/// Dated daily return observations for a set of named assets.
///
/// Rows are observations, columns are assets. Construction rejects ragged
/// rows, non-finite cells and repeated asset labels, so every matrix that
/// exists is numerically usable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnMatrix {
    index: Vec<String>,
    assets: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl ReturnMatrix {
    pub fn new(index: Vec<String>, assets: Vec<String>, rows: Vec<Vec<f64>>) -> MarkowitzResult<Self> {
        if assets.is_empty() || rows.is_empty() {
            return Err(MarkowitzError::InsufficientData(format!(
                "return matrix is empty ({} rows, {} assets)",
                rows.len(),
                assets.len()
            )));
        }
        if index.len() != rows.len() {
            return Err(MarkowitzError::InvalidInput {
                field: "index".into(),
                reason: format!("{} labels for {} rows", index.len(), rows.len()),
            });
        }

        let mut seen = HashSet::with_capacity(assets.len());
        for name in &assets {
            if !seen.insert(name.as_str()) {
                return Err(MarkowitzError::InvalidInput {
                    field: "assets".into(),
                    reason: format!("duplicate asset label '{}'", name),
                });
            }
        }

        let n = assets.len();
        for (r, row) in rows.iter().enumerate() {
            if row.len() != n {
                return Err(MarkowitzError::InvalidInput {
                    field: "rows".into(),
                    reason: format!("row {} has {} cells, expected {}", r, row.len(), n),
                });
            }
            if let Some(c) = row.iter().position(|v| !v.is_finite()) {
                return Err(MarkowitzError::InvalidInput {
                    field: "rows".into(),
                    reason: format!(
                        "non-finite return {} at row '{}', asset '{}'",
                        row[c], index[r], assets[c]
                    ),
                });
            }
        }

        Ok(Self { index, assets, rows })
    }

    /// Build a matrix with generated row labels ("0", "1", ...).
    pub fn from_rows(assets: Vec<String>, rows: Vec<Vec<f64>>) -> MarkowitzResult<Self> {
        let index = (0..rows.len()).map(|i| i.to_string()).collect();
        Self::new(index, assets, rows)
    }

    /// Re-check the minimum shape the estimator needs.
    pub fn ensure_min_shape(&self, min_observations: usize, min_assets: usize) -> MarkowitzResult<()> {
        if self.num_observations() < min_observations {
            return Err(MarkowitzError::InsufficientData(format!(
                "at least {} observations required, found {}",
                min_observations,
                self.num_observations()
            )));
        }
        if self.num_assets() < min_assets {
            return Err(MarkowitzError::InsufficientData(format!(
                "at least {} assets required, found {}",
                min_assets,
                self.num_assets()
            )));
        }
        Ok(())
    }

    pub fn num_observations(&self) -> usize {
        self.rows.len()
    }

    pub fn num_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn column(&self, c: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[c]).collect()
    }

    /// Observations x assets as a dense matrix.
    pub fn to_dmatrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.num_observations(), self.num_assets(), |r, c| self.rows[r][c])
    }
}
