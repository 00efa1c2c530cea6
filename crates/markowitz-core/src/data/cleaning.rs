use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

use super::returns::ReturnMatrix;
use crate::error::MarkowitzError;
use crate::settings::CleaningSettings;
use crate::MarkowitzResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One cell of an uploaded return table before type coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawCell {
    Number(f64),
    Missing,
    Text(String),
}

impl RawCell {
    /// Parse a delimited-text field. Blank and NaN-like fields are missing.
    pub fn parse(field: &str) -> Self {
        let trimmed = field.trim();
        if trimmed.is_empty() {
            return RawCell::Missing;
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "nan" | "na" | "n/a" | "null" | "none" | "#n/a" => return RawCell::Missing,
            "inf" | "+inf" | "infinity" => return RawCell::Number(f64::INFINITY),
            "-inf" | "-infinity" => return RawCell::Number(f64::NEG_INFINITY),
            _ => {}
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_nan() => RawCell::Missing,
            Ok(v) => RawCell::Number(v),
            Err(_) => RawCell::Text(trimmed.to_string()),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            RawCell::Number(v) => Some(*v),
            _ => None,
        }
    }
}

/// Return table exactly as read from a file: one index label per row,
/// one label per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReturnTable {
    pub index: Vec<String>,
    pub columns: Vec<String>,
    pub cells: Vec<Vec<RawCell>>,
}

/// What cleaning changed, for logs and detailed responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    /// (rows, columns) before cleaning.
    pub original_shape: (usize, usize),
    /// (rows, columns) after cleaning.
    pub cleaned_shape: (usize, usize),
    pub duplicate_rows_removed: usize,
    pub duplicate_index_removed: usize,
    pub rows_with_missing_removed: usize,
    pub dropped_columns: Vec<String>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub warnings: Vec<String>,
}

/// Output of [`clean_returns`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedReturns {
    pub matrix: ReturnMatrix,
    pub report: CleaningReport,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Check that a raw table looks like daily returns.
///
/// Returns the non-fatal warnings (extreme but plausible returns).
pub fn validate_format(
    table: &RawReturnTable,
    settings: &CleaningSettings,
) -> MarkowitzResult<Vec<String>> {
    let rows = table.cells.len();
    let cols = table.columns.len();

    if rows == 0 || cols == 0 {
        return Err(MarkowitzError::DataFormat("the return table is empty".into()));
    }
    if table.index.len() != rows {
        return Err(MarkowitzError::DataFormat(format!(
            "{} index labels for {} rows",
            table.index.len(),
            rows
        )));
    }
    if let Some(r) = table.cells.iter().position(|row| row.len() != cols) {
        return Err(MarkowitzError::DataFormat(format!(
            "row {} has {} cells, expected {}",
            r,
            table.cells[r].len(),
            cols
        )));
    }
    if rows < settings.min_observations {
        return Err(MarkowitzError::InsufficientData(format!(
            "at least {} observations required, found {}",
            settings.min_observations, rows
        )));
    }
    if cols < settings.min_assets {
        return Err(MarkowitzError::InsufficientData(format!(
            "at least {} assets required, found {}",
            settings.min_assets, cols
        )));
    }

    let non_numeric: Vec<&str> = (0..cols)
        .filter(|&c| {
            table
                .cells
                .iter()
                .any(|row| matches!(row[c], RawCell::Text(_)))
        })
        .map(|c| table.columns[c].as_str())
        .collect();
    if !non_numeric.is_empty() {
        return Err(MarkowitzError::DataFormat(format!(
            "non-numeric columns: {:?}",
            non_numeric
        )));
    }

    let finite = table
        .cells
        .iter()
        .flatten()
        .filter_map(RawCell::as_number)
        .filter(|v| v.is_finite());
    let (min_val, max_val) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });

    let mut warnings = Vec::new();
    if max_val > 1.0 || min_val < -1.0 {
        if max_val > settings.price_detection_threshold {
            return Err(MarkowitzError::DataFormat(
                "the table appears to contain prices; daily returns between -1 and 1 are expected"
                    .into(),
            ));
        }
        let msg = format!(
            "extreme returns found (min: {:.4}, max: {:.4})",
            min_val, max_val
        );
        warn!(min = min_val, max = max_val, "extreme daily returns in input");
        warnings.push(msg);
    }
    Ok(warnings)
}

/// Turn a raw table into a [`ReturnMatrix`] the optimizer accepts.
///
/// Validates the format, removes duplicate rows and repeated index labels,
/// treats infinities as missing, drops columns missing too many cells and
/// then every row that still has a gap.
pub fn clean_returns(
    table: &RawReturnTable,
    settings: &CleaningSettings,
) -> MarkowitzResult<CleanedReturns> {
    let mut warnings = validate_format(table, settings)?;
    let original_shape = (table.cells.len(), table.columns.len());

    // Cells as Option<f64>: missing and infinite both become None.
    let numeric: Vec<Vec<Option<f64>>> = table
        .cells
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| cell.as_number().filter(|v| v.is_finite()))
                .collect()
        })
        .collect();

    // --- Duplicate rows (by value, original cells) ---
    let mut seen_rows: HashSet<Vec<u64>> = HashSet::new();
    let mut keep: Vec<usize> = Vec::with_capacity(numeric.len());
    for (r, row) in table.cells.iter().enumerate() {
        if seen_rows.insert(row_key(row)) {
            keep.push(r);
        }
    }
    let duplicate_rows_removed = numeric.len() - keep.len();

    // --- Repeated index labels, first occurrence wins ---
    let mut seen_labels: HashSet<&str> = HashSet::new();
    let before_index = keep.len();
    keep.retain(|&r| seen_labels.insert(table.index[r].as_str()));
    let duplicate_index_removed = before_index - keep.len();

    // --- Columns with too many gaps ---
    let n_rows = keep.len();
    let mut kept_cols: Vec<usize> = Vec::with_capacity(table.columns.len());
    let mut dropped_columns: Vec<String> = Vec::new();
    for c in 0..table.columns.len() {
        let missing = keep.iter().filter(|&&r| numeric[r][c].is_none()).count();
        let ratio = if n_rows == 0 {
            1.0
        } else {
            missing as f64 / n_rows as f64
        };
        if ratio > settings.max_missing_ratio {
            dropped_columns.push(table.columns[c].clone());
        } else {
            kept_cols.push(c);
        }
    }
    if !dropped_columns.is_empty() {
        warn!(columns = ?dropped_columns, "dropping columns with too many missing values");
        warnings.push(format!(
            "dropped columns with more than {:.0}% missing values: {:?}",
            settings.max_missing_ratio * 100.0,
            dropped_columns
        ));
    }

    // --- Rows with any remaining gap ---
    let mut index = Vec::with_capacity(n_rows);
    let mut rows = Vec::with_capacity(n_rows);
    let mut rows_with_missing_removed = 0usize;
    for &r in &keep {
        let row: Option<Vec<f64>> = kept_cols.iter().map(|&c| numeric[r][c]).collect();
        match row {
            Some(values) => {
                index.push(table.index[r].clone());
                rows.push(values);
            }
            None => rows_with_missing_removed += 1,
        }
    }

    let cleaned_shape = (rows.len(), kept_cols.len());
    info!(
        original_rows = original_shape.0,
        original_cols = original_shape.1,
        rows = cleaned_shape.0,
        cols = cleaned_shape.1,
        "return table cleaned"
    );

    if cleaned_shape.0 < settings.min_observations {
        return Err(MarkowitzError::InsufficientData(format!(
            "after cleaning only {} observations remain, at least {} required",
            cleaned_shape.0, settings.min_observations
        )));
    }
    if cleaned_shape.1 < settings.min_assets {
        return Err(MarkowitzError::InsufficientData(format!(
            "after cleaning only {} assets remain, at least {} required",
            cleaned_shape.1, settings.min_assets
        )));
    }

    let (period_start, period_end) = date_span(&index);
    let assets = kept_cols.iter().map(|&c| table.columns[c].clone()).collect();
    let matrix = ReturnMatrix::new(index, assets, rows)?;

    Ok(CleanedReturns {
        matrix,
        report: CleaningReport {
            original_shape,
            cleaned_shape,
            duplicate_rows_removed,
            duplicate_index_removed,
            rows_with_missing_removed,
            dropped_columns,
            period_start,
            period_end,
            warnings,
        },
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Hashable identity of a row's values; all missing cells compare equal.
fn row_key(row: &[RawCell]) -> Vec<u64> {
    row.iter()
        .map(|cell| match cell {
            RawCell::Number(v) => {
                // Normalise -0.0 so it matches 0.0.
                if *v == 0.0 {
                    0u64
                } else {
                    v.to_bits()
                }
            }
            RawCell::Missing => u64::MAX,
            RawCell::Text(_) => u64::MAX - 1,
        })
        .collect()
}

/// Parse an index label as a calendar date.
pub fn parse_date_label(label: &str) -> Option<NaiveDate> {
    let s = label.trim();
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%Y%m%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// First and last date when every label parses as a date.
fn date_span(index: &[String]) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let dates: Option<Vec<NaiveDate>> = index.iter().map(|l| parse_date_label(l)).collect();
    match dates {
        Some(d) if !d.is_empty() => (d.iter().min().copied(), d.iter().max().copied()),
        _ => (None, None),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: usize, cols: usize) -> RawReturnTable {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        RawReturnTable {
            index: (0..rows)
                .map(|r| (start + chrono::Duration::days(r as i64)).to_string())
                .collect(),
            columns: (0..cols).map(|c| format!("A{}", c)).collect(),
            cells: (0..rows)
                .map(|r| {
                    (0..cols)
                        .map(|c| {
                            let base = ((r * 37 + c * 11) % 97) as f64 * 0.0002 - 0.01;
                            RawCell::Number(base + r as f64 * 1e-6)
                        })
                        .collect()
                })
                .collect(),
        }
    }

    #[test]
    fn test_raw_cell_parse() {
        assert_eq!(RawCell::parse(" 0.5 "), RawCell::Number(0.5));
        assert_eq!(RawCell::parse(""), RawCell::Missing);
        assert_eq!(RawCell::parse("NaN"), RawCell::Missing);
        assert_eq!(RawCell::parse("inf"), RawCell::Number(f64::INFINITY));
        assert_eq!(RawCell::parse("abc"), RawCell::Text("abc".into()));
    }

    #[test]
    fn test_clean_passthrough() {
        let t = table(40, 3);
        let out = clean_returns(&t, &CleaningSettings::default()).unwrap();
        assert_eq!(out.report.cleaned_shape.1, 3);
        assert!(out.report.dropped_columns.is_empty());
        assert_eq!(
            out.report.period_start,
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
    }

    #[test]
    fn test_too_few_rows() {
        let t = table(10, 3);
        let err = clean_returns(&t, &CleaningSettings::default()).unwrap_err();
        assert!(matches!(err, MarkowitzError::InsufficientData(_)));
    }

    #[test]
    fn test_non_numeric_column_rejected() {
        let mut t = table(40, 3);
        t.cells[5][1] = RawCell::Text("oops".into());
        let err = clean_returns(&t, &CleaningSettings::default()).unwrap_err();
        assert!(err.to_string().contains("A1"));
    }

    #[test]
    fn test_prices_rejected() {
        let mut t = table(40, 3);
        t.cells[0][0] = RawCell::Number(150.0);
        let err = clean_returns(&t, &CleaningSettings::default()).unwrap_err();
        assert!(matches!(err, MarkowitzError::DataFormat(_)));
    }

    #[test]
    fn test_extreme_returns_warn() {
        let mut t = table(40, 3);
        t.cells[0][0] = RawCell::Number(1.5);
        let out = clean_returns(&t, &CleaningSettings::default()).unwrap();
        assert!(out.report.warnings.iter().any(|w| w.contains("extreme")));
    }

    #[test]
    fn test_sparse_column_dropped_and_gappy_rows_removed() {
        let mut t = table(50, 3);
        for r in 0..10 {
            t.cells[r][2] = RawCell::Missing;
        }
        t.cells[20][0] = RawCell::Missing;
        t.cells[21][1] = RawCell::Number(f64::INFINITY);
        let out = clean_returns(&t, &CleaningSettings::default()).unwrap();
        assert_eq!(out.report.dropped_columns, vec!["A2".to_string()]);
        assert_eq!(out.report.rows_with_missing_removed, 2);
        assert_eq!(out.matrix.num_assets(), 2);
    }

    #[test]
    fn test_duplicates_removed() {
        let mut t = table(40, 2);
        t.cells[1] = t.cells[0].clone();
        t.index[3] = t.index[2].clone();
        let out = clean_returns(&t, &CleaningSettings::default()).unwrap();
        assert_eq!(out.report.duplicate_index_removed, 1);
        assert!(out.report.duplicate_rows_removed >= 1);
    }

    #[test]
    fn test_parse_date_label() {
        assert_eq!(
            parse_date_label("2024-03-01"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(
            parse_date_label("2024-03-01 00:00:00"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(parse_date_label("day-1"), None);
    }
}
