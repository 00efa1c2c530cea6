use serde_json::Value;

use super::flatten::{flatten, format_value};

/// Print just the key answer: one `name=weight` line per asset when weights
/// are present, otherwise the first priority field found.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if let Some(Value::Object(weights)) = result_obj.get("optimal_portfolio") {
        for (name, w) in weights {
            println!("{}={}", name, format_value(w));
        }
        return;
    }

    let priority_keys = ["assets", "covariance_diagnostics"];
    if let Value::Object(map) = result_obj {
        for key in &priority_keys {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    for (k, v) in flatten(val) {
                        if k.is_empty() {
                            println!("{}", format_value(&v));
                        } else {
                            println!("{}={}", k, format_value(&v));
                        }
                    }
                    return;
                }
            }
        }
    }

    println!("{}", format_value(result_obj));
}
