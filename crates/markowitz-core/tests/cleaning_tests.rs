use markowitz_core::data::cleaning::{clean_returns, RawCell, RawReturnTable};
use markowitz_core::settings::CleaningSettings;
use markowitz_core::{optimize, ErrorKind};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;

/// Build a table from CSV-like lines: first field is the date label.
fn table(header: &[&str], lines: &[String]) -> RawReturnTable {
    let mut index = Vec::new();
    let mut cells = Vec::new();
    for line in lines {
        let mut fields = line.split(',');
        index.push(fields.next().unwrap_or_default().to_string());
        cells.push(fields.map(RawCell::parse).collect());
    }
    RawReturnTable {
        index,
        columns: header.iter().map(|s| s.to_string()).collect(),
        cells,
    }
}

fn daily_lines(n: usize) -> Vec<String> {
    (0..n)
        .map(|t| {
            let x = t as f64;
            format!(
                "2023-{:02}-{:02},{:.6},{:.6},{:.6}",
                1 + t / 28,
                1 + t % 28,
                0.0020 + 0.010 * (x * 0.7).sin(),
                0.0015 + 0.012 * (x * 1.3 + 0.5).cos(),
                0.0010 + 0.006 * (x * 2.1 + 1.0).sin(),
            )
        })
        .collect()
}

#[test]
fn test_clean_then_optimize() {
    let mut lines = daily_lines(60);
    // A duplicated row and a NaN marker.
    lines.push(lines[10].clone());
    lines[3] = format!("{},NaN,0.001,0.002", "2023-01-04");
    let raw = table(&["AAA", "BBB", "CCC"], &lines);

    let cleaned = clean_returns(&raw, &CleaningSettings::default()).unwrap();
    assert_eq!(cleaned.report.original_shape, (61, 3));
    assert_eq!(cleaned.report.duplicate_rows_removed, 1);
    assert_eq!(cleaned.report.rows_with_missing_removed, 1);
    assert_eq!(cleaned.matrix.num_observations(), 59);
    assert_eq!(
        cleaned.report.period_start.map(|d| d.to_string()),
        Some("2023-01-01".to_string())
    );

    let out = optimize(&cleaned.matrix, 1.0, 0.6).unwrap();
    assert_eq!(out.result.optimal_portfolio.total(), Decimal::ONE);
}

#[test]
fn test_prices_are_rejected() {
    let lines: Vec<String> = (0..40)
        .map(|t| format!("d{},{},{}", t, 100.0 + t as f64, 50.0 + t as f64))
        .collect();
    let raw = table(&["X", "Y"], &lines);
    let err = clean_returns(&raw, &CleaningSettings::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataFormat);
}

#[test]
fn test_text_column_is_rejected() {
    let mut lines = daily_lines(40);
    lines[7] = "2023-01-08,abc,0.01,0.02".to_string();
    let raw = table(&["AAA", "BBB", "CCC"], &lines);
    let err = clean_returns(&raw, &CleaningSettings::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataFormat);
}

#[test]
fn test_sparse_column_dropped() {
    let lines: Vec<String> = daily_lines(50)
        .into_iter()
        .enumerate()
        .map(|(t, l)| if t % 4 == 0 { format!("{},", l) } else { format!("{},0.00{}", l, t % 7 + 1) })
        .collect();
    let raw = table(&["AAA", "BBB", "CCC", "SPARSE"], &lines);
    let cleaned = clean_returns(&raw, &CleaningSettings::default()).unwrap();
    assert_eq!(cleaned.report.dropped_columns, vec!["SPARSE".to_string()]);
    assert_eq!(cleaned.matrix.num_assets(), 3);
    assert_eq!(cleaned.matrix.num_observations(), 50);
}

#[test]
fn test_too_few_rows_after_cleaning() {
    let mut lines = daily_lines(31);
    lines[0] = "2023-01-01,,0.01,0.02".to_string();
    lines[1] = "2023-01-02,,0.01,0.03".to_string();
    let raw = table(&["AAA", "BBB", "CCC"], &lines);
    let err = clean_returns(&raw, &CleaningSettings::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientData);
}
