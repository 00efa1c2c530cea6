use markowitz_core::data::cleaning::{RawCell, RawReturnTable};
use std::fs;
use std::io::Read;

use super::file::{extension, resolve_path};

/// Read a daily-return CSV file. The first column is the date index and the
/// header row names the assets.
pub fn read_returns_csv(path: &str) -> Result<RawReturnTable, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    if extension(&canonical) != "csv" {
        return Err(format!("The returns file must be a CSV: {}", canonical.display()).into());
    }
    let bytes = fs::read(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    parse_returns_csv(bytes.as_slice())
        .map_err(|e| format!("Failed to read CSV '{}': {}", canonical.display(), e).into())
}

/// Parse CSV text into a raw table. Cells are typed but not validated.
pub fn parse_returns_csv<R: Read>(reader: R) -> Result<RawReturnTable, String> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().map_err(describe)?.clone();
    if headers.len() < 2 {
        return Err("expected a date column followed by at least one asset column".into());
    }
    let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut index = Vec::new();
    let mut cells = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(describe)?;
        let mut fields = record.iter();
        index.push(fields.next().unwrap_or_default().to_string());
        cells.push(fields.map(RawCell::parse).collect::<Vec<_>>());
    }
    Ok(RawReturnTable {
        index,
        columns,
        cells,
    })
}

fn describe(e: csv::Error) -> String {
    match e.kind() {
        csv::ErrorKind::Utf8 { .. } => "file encoding error; make sure it is UTF-8".to_string(),
        _ => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_basic() {
        let text = "Date,AAPL,MSFT\n2023-01-02,0.01,-0.002\n2023-01-03,,NaN\n2023-01-04,abc,0.003\n";
        let t = parse_returns_csv(text.as_bytes()).unwrap();
        assert_eq!(t.columns, vec!["AAPL".to_string(), "MSFT".to_string()]);
        assert_eq!(t.index.len(), 3);
        assert_eq!(t.cells[0], vec![RawCell::Number(0.01), RawCell::Number(-0.002)]);
        assert_eq!(t.cells[1], vec![RawCell::Missing, RawCell::Missing]);
        assert_eq!(t.cells[2][0], RawCell::Text("abc".into()));
    }

    #[test]
    fn test_short_rows_are_kept_for_validation() {
        let text = "Date,A,B\n2023-01-02,0.01\n";
        let t = parse_returns_csv(text.as_bytes()).unwrap();
        assert_eq!(t.cells[0].len(), 1);
    }

    #[test]
    fn test_invalid_utf8() {
        let bytes: &[u8] = b"Date,A\n2023-01-02,\xff\xfe\n";
        let err = parse_returns_csv(bytes).unwrap_err();
        assert!(err.contains("UTF-8"));
    }

    #[test]
    fn test_header_only_date() {
        assert!(parse_returns_csv("Date\n2023-01-02\n".as_bytes()).is_err());
    }
}
