use colored::Colorize;
use serde_json::Value;
use tabled::{builder::Builder, Table};

use super::flatten::{flatten, format_value};

/// Format output as tables using the tabled crate.
///
/// Weight maps get their own Asset/Weight table; everything else is listed
/// as dotted Field/Value rows.
pub fn print_table(value: &Value) {
    let (result, envelope) = match value {
        Value::Object(map) if map.contains_key("result") => (&map["result"], Some(map)),
        _ => (value, None),
    };

    if let Some(Value::Object(weights)) = result.get("optimal_portfolio") {
        let mut builder = Builder::default();
        builder.push_record(["Asset", "Weight"]);
        for (name, w) in weights {
            builder.push_record([name.as_str(), &format_value(w)]);
        }
        println!("{}", Table::from(builder));
    }

    if let Some(Value::Array(assets)) = result.get("assets") {
        print_array_table(assets);
    }

    let rest: Vec<(String, Value)> = flatten(result)
        .into_iter()
        .filter(|(k, _)| !k.starts_with("optimal_portfolio.") && k != "assets")
        .collect();
    if !rest.is_empty() {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        for (key, val) in &rest {
            builder.push_record([key.as_str(), &format_value(val)]);
        }
        println!("{}", Table::from(builder));
    }

    let Some(envelope) = envelope else {
        return;
    };
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\n{}", "Warnings:".yellow().bold());
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }
    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_array_table(arr: &[Value]) {
    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);
        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }
        println!("{}", Table::from(builder));
    }
}
