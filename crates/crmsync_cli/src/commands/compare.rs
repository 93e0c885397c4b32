//! Compare command implementation.

use crmsync_compare::{cleanup, coerce, equals, FieldValue};
use serde::Serialize;

/// Comparison result.
#[derive(Debug, Serialize)]
pub struct CompareResult {
    /// Left value as given.
    pub left: FieldValue,
    /// Right value as given.
    pub right: FieldValue,
    /// Left value after cleanup and coercion.
    pub left_normalized: FieldValue,
    /// Right value after cleanup and coercion.
    pub right_normalized: FieldValue,
    /// Whether the values are semantically equal.
    pub equal: bool,
}

/// Parses a command-line value. Anything that is not JSON is text.
pub fn parse_value(raw: &str) -> FieldValue {
    serde_json::from_str(raw).unwrap_or_else(|_| FieldValue::Text(raw.to_string()))
}

/// Compares two parsed values.
pub fn compare(left: FieldValue, right: FieldValue) -> CompareResult {
    let left_normalized = coerce(cleanup(&left)).into_owned();
    let right_normalized = coerce(cleanup(&right)).into_owned();
    let equal = equals(&left, &right);
    CompareResult {
        left,
        right,
        left_normalized,
        right_normalized,
        equal,
    }
}

/// Runs the compare command.
pub fn run(left: &str, right: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = compare(parse_value(left), parse_value(right));

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            println!("Left:   {} -> {}", result.left, result.left_normalized);
            println!("Right:  {} -> {}", result.right, result.right_normalized);
            println!(
                "Result: {}",
                if result.equal { "equal" } else { "different" }
            );
        }
    }

    Ok(())
}
