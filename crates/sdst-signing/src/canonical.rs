//! Canonical JSON: object keys sorted recursively, no insignificant
//! whitespace.
//!
//! Keys are ordered by UTF-16 code units as in RFC 8785, and integral
//! floating point numbers print without a fraction (`1.0` becomes `1`).

use std::fmt::Write as _;

use serde_json::Number;
use serde_json::Value;

/// Serialize `value` canonically.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// Bytes a JSON sign request's `data` is signed over: a string as is,
/// anything else in canonical form.
pub fn payload_bytes(data: &Value) -> Vec<u8> {
    match data {
        Value::String(text) => text.as_bytes().to_vec(),
        other => canonical_json(other).into_bytes(),
    }
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.encode_utf16().cmp(b.encode_utf16()));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Number(number) => write_number(number, out),
        Value::String(text) => write_string(text, out),
        Value::Bool(_) | Value::Null => out.push_str(&value.to_string()),
    }
}

fn write_string(text: &str, out: &mut String) {
    out.push_str(&Value::String(text.to_string()).to_string());
}

fn write_number(number: &Number, out: &mut String) {
    match number.as_f64() {
        Some(float) if number.is_f64() && float.fract() == 0.0 && float.abs() < 1e15 => {
            let _ = write!(out, "{}", float as i64);
        }
        _ => out.push_str(&number.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn sorts_keys_recursively() {
        let value = json!({"b": 2, "a": {"d": [3, {"z": 1, "y": 2}], "c": null}});
        assert_eq!(canonical_json(&value), r#"{"a":{"c":null,"d":[3,{"y":2,"z":1}]},"b":2}"#);
    }

    #[test]
    fn field_order_does_not_matter() {
        let first: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let second: Value = serde_json::from_str(r#"{ "b" : 2, "a" : 1 }"#).unwrap();
        assert_eq!(canonical_json(&first), canonical_json(&second));
    }

    #[test]
    fn utf16_key_order() {
        // U+1F600 is a surrogate pair, so it sorts before U+FB01 in UTF-16
        // but after it in UTF-8.
        let value = json!({"\u{FB01}": 2, "\u{1F600}": 1});
        assert_eq!(canonical_json(&value), "{\"\u{1F600}\":1,\"\u{FB01}\":2}");
    }

    #[test]
    fn numbers_and_escapes() {
        let value: Value = serde_json::from_str(r#"[1.0, -0.0, 2.5, 1e300, "line\nbreak \"q\""]"#).unwrap();
        assert_eq!(canonical_json(&value), r#"[1,0,2.5,1e300,"line\nbreak \"q\""]"#);
    }

    #[test]
    fn payload_of_string_is_raw_text() {
        assert_eq!(payload_bytes(&json!("hello")), b"hello");
        assert_eq!(payload_bytes(&json!({"b": true, "a": "x"})), br#"{"a":"x","b":true}"#);
    }
}
