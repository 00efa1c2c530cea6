use serde_json::Value;
use std::io;

use super::flatten::{flatten, format_value};

/// Write output as CSV to stdout.
///
/// Weight maps become `asset,weight` rows; any other result is written as
/// `field,value` pairs with dotted keys.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if let Some(Value::Object(weights)) = result.get("optimal_portfolio") {
        if result.as_object().map(|m| m.len()) == Some(1) {
            let _ = wtr.write_record(["asset", "weight"]);
            for (name, w) in weights {
                let _ = wtr.write_record([name.as_str(), &format_value(w)]);
            }
            let _ = wtr.flush();
            return;
        }
    }

    let _ = wtr.write_record(["field", "value"]);
    for (key, val) in flatten(result) {
        let _ = wtr.write_record([key.as_str(), &format_value(&val)]);
    }
    let _ = wtr.flush();
}
