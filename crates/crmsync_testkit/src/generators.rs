//! Property-based test generators using proptest.

use crate::fixtures::at;
use chrono::{DateTime, Utc};
use crmsync_compare::{AttributeMap, FieldValue};
use crmsync_protocol::RemoteId;
use proptest::prelude::*;

/// Strategy for remote identifiers shaped like CRM ids.
pub fn remote_id_strategy() -> impl Strategy<Value = RemoteId> {
    prop::string::string_regex("00Q[A-Za-z0-9]{12}")
        .expect("Invalid regex")
        .prop_map(RemoteId::new)
}

/// Strategy for instants within a few days of the fixture epoch, at
/// whole-second precision.
pub fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..300_000).prop_map(at)
}

/// Strategy for short human-ish text.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9 .'-]{0,20}").expect("Invalid regex")
}

/// Strategy for a text value and a variant that differs only in
/// representation: CRLF line endings and widened space runs.
pub fn equivalent_text_strategy() -> impl Strategy<Value = (String, String)> {
    (
        prop::collection::vec("[A-Za-z0-9]{1,8}", 1..6),
        prop::collection::vec(1usize..4, 6),
        any::<bool>(),
    )
        .prop_map(|(words, widths, multiline)| {
            let separator = if multiline { "\n" } else { " " };
            let plain = words.join(separator);
            let mut noisy = String::new();
            for (i, word) in words.iter().enumerate() {
                if i > 0 {
                    if multiline {
                        noisy.push_str("\r\n");
                    } else {
                        noisy.push_str(&" ".repeat(widths[i]));
                    }
                }
                noisy.push_str(word);
            }
            (plain, noisy)
        })
}

/// Strategy for scalar field values.
pub fn field_value_strategy() -> impl Strategy<Value = FieldValue> {
    prop_oneof![
        Just(FieldValue::Null),
        any::<bool>().prop_map(FieldValue::Bool),
        any::<i64>().prop_map(FieldValue::Integer),
        (-1e9f64..1e9).prop_map(FieldValue::Float),
        text_strategy().prop_map(FieldValue::Text),
        timestamp_strategy().prop_map(FieldValue::Timestamp),
    ]
}

/// Strategy for inbound lead payloads. Each synced attribute may be absent.
pub fn lead_payload_strategy() -> impl Strategy<Value = AttributeMap> {
    (
        prop::option::of(text_strategy()),
        prop::option::of(text_strategy()),
        prop::option::of(text_strategy()),
    )
        .prop_map(|(first, last, custom)| {
            let mut payload = AttributeMap::new();
            for (name, value) in [
                ("FirstName", first),
                ("LastName", last),
                ("CustomAttribute__c", custom),
            ] {
                if let Some(value) = value {
                    payload.insert(name.to_string(), FieldValue::Text(value));
                }
            }
            payload
        })
}
