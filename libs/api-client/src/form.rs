//! `application/x-www-form-urlencoded` encoding of JSON values.
//!
//! Nested objects and lists are flattened with bracket notation
//! (`user[name]=x`, `ids[0]=1`), `null` entries are dropped and booleans are
//! written as `1`/`0`, matching what most form-handling servers expect.

use serde_json::Value;

/// Encodes `value` as a form/query string. Scalars at the top level have no
/// key to hang off and produce an empty string.
#[must_use]
pub fn encode(value: &Value) -> String {
    let mut pairs = Vec::new();
    match value {
        Value::Object(map) => {
            for (key, item) in map {
                flatten(key.clone(), item, &mut pairs);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten(index.to_string(), item, &mut pairs);
            }
        }
        _ => {}
    }

    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

fn flatten(key: String, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Bool(flag) => pairs.push((key, if *flag { "1" } else { "0" }.to_owned())),
        Value::Number(number) => pairs.push((key, number.to_string())),
        Value::String(text) => pairs.push((key, text.clone())),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten(format!("{key}[{index}]"), item, pairs);
            }
        }
        Value::Object(map) => {
            for (name, item) in map {
                flatten(format!("{key}[{name}]"), item, pairs);
            }
        }
    }
}
