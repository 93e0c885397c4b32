//! Normalization and semantic equality.

use crate::value::FieldValue;
use chrono::{DateTime, SubsecRound, Utc};
use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

/// Absolute tolerance for numeric comparison.
pub const EPSILON: f64 = 1e-10;

/// ISO-8601 date-time with an explicit zone designator.
const TIMESTAMP_PATTERN: &str =
    r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+\-]\d{2}:?\d{2})$";

fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TIMESTAMP_PATTERN).expect("valid timestamp pattern"))
}

/// Returns true if two values are semantically equal.
///
/// Both values go through the same pipeline, in this order:
/// 1. cleanup (raw text is decoded as UTF-8, invalid sequences replaced)
/// 2. coercion (timestamp-like values become a UTC instant at whole-second
///    precision)
/// 3. comparison by kind: numeric values within [`EPSILON`], text after
///    [`normalize_text`], everything else by direct equality. Values of
///    different kinds are never equal, so `Null` and `""` differ.
///
/// # Example
///
/// ```
/// use crmsync_compare::{equals, FieldValue};
///
/// assert!(equals(&"a  b\r\n".into(), &"a b\n".into()));
/// assert!(equals(&FieldValue::Integer(1), &FieldValue::Float(1.0)));
/// assert!(!equals(&FieldValue::Null, &"".into()));
/// ```
pub fn equals(a: &FieldValue, b: &FieldValue) -> bool {
    let a = coerce(cleanup(a));
    let b = coerce(cleanup(b));

    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return (x - y).abs() <= EPSILON;
    }

    if a.kind() != b.kind() {
        return false;
    }

    match (a.as_ref(), b.as_ref()) {
        (FieldValue::Text(x), FieldValue::Text(y)) => normalize_text(x) == normalize_text(y),
        (x, y) => x == y,
    }
}

/// Returns true if going from `old` to `new` is a real change.
pub fn is_real_change(old: &FieldValue, new: &FieldValue) -> bool {
    !equals(old, new)
}

/// Decodes raw transport text into UTF-8. Other values pass through.
pub fn cleanup(value: &FieldValue) -> Cow<'_, FieldValue> {
    match value {
        FieldValue::RawText(bytes) => Cow::Owned(FieldValue::Text(
            String::from_utf8_lossy(bytes).into_owned(),
        )),
        other => Cow::Borrowed(other),
    }
}

/// Converts timestamp-like values into a UTC instant truncated to seconds.
///
/// Text that looks like a timestamp but does not parse is left as text.
pub fn coerce(value: Cow<'_, FieldValue>) -> Cow<'_, FieldValue> {
    let instant = match value.as_ref() {
        FieldValue::Timestamp(ts) => Some(*ts),
        FieldValue::Date(date) => date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
        FieldValue::Text(text) => parse_timestamp(text),
        _ => None,
    };

    match instant {
        Some(ts) => Cow::Owned(FieldValue::Timestamp(ts.trunc_subsecs(0))),
        None => value,
    }
}

/// Parses an ISO-8601 timestamp with a zone designator.
///
/// Accepts `Z`, `+HH:MM` and `+HHMM` offsets. Returns `None` for anything
/// else, including strings that match the shape but name an impossible
/// date.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if !timestamp_regex().is_match(text) {
        return None;
    }

    let rfc3339: Cow<'_, str> = match text.as_bytes() {
        [.., b'Z'] => Cow::Borrowed(text),
        // +HHMM: insert the colon RFC 3339 wants.
        [.., sign @ (b'+' | b'-'), h1, h2, m1, m2] => {
            let prefix = &text[..text.len() - 5];
            Cow::Owned(format!(
                "{prefix}{}{}{}:{}{}",
                *sign as char, *h1 as char, *h2 as char, *m1 as char, *m2 as char
            ))
        }
        _ => Cow::Borrowed(text),
    };

    DateTime::parse_from_rfc3339(&rfc3339)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Normalizes text for comparison.
///
/// - `\r\n` and lone `\r` become `\n`
/// - runs of horizontal whitespace collapse to a single space
/// - characters outside the Basic Multilingual Plane are dropped
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_space = false;

    while let Some(c) = chars.next() {
        let c = match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                '\n'
            }
            other => other,
        };

        if u32::from(c) > 0xFFFF {
            continue;
        }

        if is_horizontal_space(c) {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
            continue;
        }

        in_space = false;
        out.push(c);
    }

    out
}

/// Whitespace that stays on the current line. Line and paragraph separators
/// are content and never fold into a space run.
fn is_horizontal_space(c: char) -> bool {
    c.is_whitespace() && !matches!(c, '\n' | '\x0B' | '\x0C' | '\u{85}' | '\u{2028}' | '\u{2029}')
}
