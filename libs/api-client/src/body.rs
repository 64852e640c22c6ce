use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::form;
use crate::headers::HeaderBag;

const CONTENT_TYPE: &str = "content-type";
const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART: &str = "multipart/form-data";

/// How a response body should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BodyType {
    /// JSON decoded into a structured value, raw text when decoding fails.
    #[default]
    Array,
    /// Body kept as text.
    String,
    /// Same decoding as [`BodyType::Array`].
    Object,
    /// Body kept as raw bytes.
    FileStream,
}

impl BodyType {
    pub const ALL: [BodyType; 4] = [
        BodyType::Array,
        BodyType::String,
        BodyType::Object,
        BodyType::FileStream,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BodyType::Array => "array",
            BodyType::String => "string",
            BodyType::Object => "object",
            BodyType::FileStream => "file-stream",
        }
    }

    /// Whether JSON decoding is attempted for this type.
    #[must_use]
    pub fn is_structured(self) -> bool {
        matches!(self, BodyType::Array | BodyType::Object)
    }
}

impl fmt::Display for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("response type must be one of: array, string, object or file-stream (got `{0}`)")]
pub struct UnknownBodyType(pub String);

impl FromStr for BodyType {
    type Err = UnknownBodyType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BodyType::ALL
            .into_iter()
            .find(|ty| ty.as_str().eq_ignore_ascii_case(s))
            .or_else(|| s.eq_ignore_ascii_case("file").then_some(BodyType::FileStream))
            .ok_or_else(|| UnknownBodyType(s.to_owned()))
    }
}

impl TryFrom<&str> for BodyType {
    type Error = UnknownBodyType;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Encodes a request body according to the effective `Content-Type`.
///
/// Form content types win over JSON, JSON wins over the plain string
/// rendering. Multipart bodies are passed through unchanged.
#[must_use]
pub fn encode_request_body(headers: &HeaderBag, data: Option<&Value>) -> String {
    let Some(data) = data else {
        return String::new();
    };

    if is_truthy(data) && headers.is(CONTENT_TYPE, FORM_URLENCODED) {
        return match data {
            Value::String(text) => text.clone(),
            Value::Object(_) | Value::Array(_) => form::encode(data),
            other => stringify(other),
        };
    }

    if (data.is_object() || data.is_array()) && !headers.is(CONTENT_TYPE, MULTIPART) {
        return data.to_string();
    }

    stringify(data)
}

/// Empty strings, empty collections, `null`, `false` and zero are "empty"
/// bodies and are never form-encoded.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n.abs() > f64::EPSILON),
        Value::String(text) => !text.is_empty() && text != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_owned(),
        Value::Bool(false) => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// A decoded (or deliberately raw) response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Bytes(Bytes),
}

impl ResponseBody {
    /// Interprets `raw` for the requested body type. Structured types fall
    /// back to the raw text when the body is not valid JSON.
    #[must_use]
    pub fn decode(raw: Bytes, body_type: BodyType) -> Self {
        match body_type {
            BodyType::Array | BodyType::Object => match serde_json::from_slice::<Value>(&raw) {
                Ok(value) => ResponseBody::Json(value),
                Err(_) => ResponseBody::Text(String::from_utf8_lossy(&raw).into_owned()),
            },
            BodyType::String => ResponseBody::Text(String::from_utf8_lossy(&raw).into_owned()),
            BodyType::FileStream => ResponseBody::Bytes(raw),
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Deserializes the body into `T`, parsing text and bytes as JSON.
    ///
    /// # Errors
    /// Returns the `serde_json` error when the body does not match `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self {
            ResponseBody::Json(value) => T::deserialize(value),
            ResponseBody::Text(text) => serde_json::from_str(text),
            ResponseBody::Bytes(bytes) => serde_json::from_slice(bytes),
        }
    }
}

impl fmt::Display for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Json(value) => write!(f, "{value}"),
            ResponseBody::Text(text) => f.write_str(text),
            ResponseBody::Bytes(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
        }
    }
}
