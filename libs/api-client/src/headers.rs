//! Case-insensitive, multi-value header collection.
//!
//! Header names are folded to lower case on the way in, values are kept as an
//! ordered list so repeated headers (`Set-Cookie`, `Vary`, ...) survive a round
//! trip through [`HeaderBag::parse`] and [`HeaderBag::to_wire_lines`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Errors raised while mutating a [`HeaderBag`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("header `{name}` content is expecting a string or a non-empty list of strings")]
    MalformedContent { name: String },
}

/// Content accepted by [`HeaderBag::add`] and [`HeaderBag::append`].
///
/// Anything that is not a string or a list of strings ends up in
/// [`HeaderContent::Unsupported`] and is rejected when applied.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HeaderContent {
    Text(String),
    List(Vec<String>),
    Unsupported(Value),
}

impl HeaderContent {
    /// Turns the content into the value list stored for a header.
    ///
    /// A string that looks like JSON and parses as JSON is kept whole, any
    /// other string is split on commas and trimmed.
    fn into_values(self, name: &str) -> Result<Vec<String>, HeaderError> {
        match self {
            Self::List(values) if !values.is_empty() => Ok(values),
            Self::Text(text) => Ok(split_text(text)),
            Self::List(_) | Self::Unsupported(_) => Err(HeaderError::MalformedContent {
                name: name.to_owned(),
            }),
        }
    }
}

fn split_text(text: String) -> Vec<String> {
    if looks_like_json(&text) {
        return vec![text];
    }
    text.split(',').map(|piece| piece.trim().to_owned()).collect()
}

fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim_start();
    (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<Value>(trimmed).is_ok()
}

impl From<String> for HeaderContent {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for HeaderContent {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<&String> for HeaderContent {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<Vec<String>> for HeaderContent {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

impl From<Vec<&str>> for HeaderContent {
    fn from(values: Vec<&str>) -> Self {
        Self::List(values.into_iter().map(str::to_owned).collect())
    }
}

impl<const N: usize> From<[&str; N]> for HeaderContent {
    fn from(values: [&str; N]) -> Self {
        Self::List(values.into_iter().map(str::to_owned).collect())
    }
}

impl From<Value> for HeaderContent {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            Value::Array(items) if items.iter().all(Value::is_string) => Self::List(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(text) => Some(text),
                        _ => None,
                    })
                    .collect(),
            ),
            other => Self::Unsupported(other),
        }
    }
}

/// Anything [`HeaderBag::apply`] knows how to fold into a bag.
#[derive(Debug, Clone)]
pub enum HeaderInput {
    /// Merged with [`HeaderBag::merge_with`]: incoming names win.
    Bag(HeaderBag),
    /// Each entry is appended in order.
    Entries(Vec<(String, HeaderContent)>),
    /// A raw header block, parsed line by line.
    Block(String),
}

impl From<HeaderBag> for HeaderInput {
    fn from(bag: HeaderBag) -> Self {
        Self::Bag(bag)
    }
}

impl From<&HeaderBag> for HeaderInput {
    fn from(bag: &HeaderBag) -> Self {
        Self::Bag(bag.clone())
    }
}

impl From<&str> for HeaderInput {
    fn from(block: &str) -> Self {
        Self::Block(block.to_owned())
    }
}

impl From<String> for HeaderInput {
    fn from(block: String) -> Self {
        Self::Block(block)
    }
}

impl<K, V> From<Vec<(K, V)>> for HeaderInput
where
    K: Into<String>,
    V: Into<HeaderContent>,
{
    fn from(entries: Vec<(K, V)>) -> Self {
        Self::Entries(
            entries
                .into_iter()
                .map(|(name, content)| (name.into(), content.into()))
                .collect(),
        )
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for HeaderInput
where
    K: Into<String>,
    V: Into<HeaderContent>,
{
    fn from(entries: [(K, V); N]) -> Self {
        Self::from(Vec::from(entries))
    }
}

impl<K, V> From<BTreeMap<K, V>> for HeaderInput
where
    K: Into<String>,
    V: Into<HeaderContent>,
{
    fn from(entries: BTreeMap<K, V>) -> Self {
        Self::from(entries.into_iter().collect::<Vec<_>>())
    }
}

impl<K, V, S> From<HashMap<K, V, S>> for HeaderInput
where
    K: Into<String>,
    V: Into<HeaderContent>,
{
    fn from(entries: HashMap<K, V, S>) -> Self {
        Self::from(entries.into_iter().collect::<Vec<_>>())
    }
}

/// Ordered, case-insensitive multi-value header collection.
///
/// Structured headers are stored under their lower-cased name; raw lines added
/// through [`HeaderBag::raw`] are opaque and only show up on serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBag {
    entries: Vec<(String, Vec<String>)>,
    raws: Vec<String>,
}

impl HeaderBag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a bag from a raw header block such as the one returned by a
    /// transport. Repeated lines accumulate.
    #[must_use]
    pub fn parse(block: &str) -> Self {
        let mut bag = Self::new();
        bag.parse_into(block);
        bag
    }

    /// Appends every `Name: value` line of `block`; lines without a colon
    /// (status lines, blank lines) are skipped.
    pub fn parse_into(&mut self, block: &str) -> &mut Self {
        for line in block.lines() {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let values = split_text(value.trim().to_owned());
            self.extend_values(name, values);
        }
        self
    }

    /// Replaces `name` with the values parsed from `content`.
    ///
    /// # Errors
    /// Returns [`HeaderError::MalformedContent`] when `content` is neither a
    /// string nor a non-empty list of strings; the bag is left untouched.
    pub fn add(
        &mut self,
        name: &str,
        content: impl Into<HeaderContent>,
    ) -> Result<&mut Self, HeaderError> {
        let values = content.into().into_values(name)?;
        self.replace_values(name, values);
        Ok(self)
    }

    /// Replaces `name` with exactly one value, without comma splitting.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.replace_values(name, vec![value.into()]);
        self
    }

    /// Adds the values parsed from `content` after the existing ones.
    ///
    /// # Errors
    /// Returns [`HeaderError::MalformedContent`] for unsupported content.
    pub fn append(
        &mut self,
        name: &str,
        content: impl Into<HeaderContent>,
    ) -> Result<&mut Self, HeaderError> {
        let values = content.into().into_values(name)?;
        self.extend_values(name, values);
        Ok(self)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[String]> {
        let key = name.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(existing, _)| *existing == key)
            .map(|(_, values)| values.as_slice())
    }

    /// Like [`HeaderBag::get`], falling back to `default` when absent.
    #[must_use]
    pub fn get_or<'a>(&'a self, name: &str, default: &'a [String]) -> &'a [String] {
        self.get(name).unwrap_or(default)
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        let key = name.to_ascii_lowercase();
        let index = self.entries.iter().position(|(existing, _)| *existing == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Case-insensitive substring search over the `, `-joined values of
    /// `name`. Missing headers never match.
    ///
    /// `is("content-type", "application/json")` therefore matches
    /// `application/json; charset=UTF-8` as well.
    #[must_use]
    pub fn is(&self, name: &str, token: &str) -> bool {
        self.get(name).is_some_and(|values| {
            values
                .join(", ")
                .to_ascii_lowercase()
                .contains(&token.to_ascii_lowercase())
        })
    }

    /// Exact, case-insensitive membership of `value` in the list for `name`.
    #[must_use]
    pub fn contains(&self, name: &str, value: &str) -> bool {
        self.get(name)
            .is_some_and(|values| values.iter().any(|v| v.eq_ignore_ascii_case(value)))
    }

    /// Overlays `other` on top of this bag: names present in both take
    /// `other`'s values, names only present here are kept. Raw lines of
    /// `other` are carried over after the existing ones.
    pub fn merge_with(&mut self, other: &HeaderBag) -> &mut Self {
        for (name, values) in &other.entries {
            self.replace_values(name, values.clone());
        }
        self.raws.extend(other.raws.iter().cloned());
        self
    }

    /// Folds a bag, a list of entries or a raw header block into this bag.
    ///
    /// # Errors
    /// Returns [`HeaderError::MalformedContent`] when an entry carries
    /// unsupported content. Entries before the faulty one are kept.
    pub fn apply(&mut self, input: impl Into<HeaderInput>) -> Result<&mut Self, HeaderError> {
        match input.into() {
            HeaderInput::Bag(bag) => {
                self.merge_with(&bag);
            }
            HeaderInput::Entries(entries) => {
                for (name, content) in entries {
                    self.append(&name, content)?;
                }
            }
            HeaderInput::Block(block) => {
                self.parse_into(&block);
            }
        }
        Ok(self)
    }

    /// Stores a pre-formatted `Name: value` line, emitted verbatim.
    pub fn raw(&mut self, line: impl Into<String>) -> &mut Self {
        self.raws.push(line.into());
        self
    }

    #[must_use]
    pub fn raw_lines(&self) -> &[String] {
        &self.raws
    }

    /// Structured headers as `name: v1, v2` lines in insertion order,
    /// followed by the raw lines.
    #[must_use]
    pub fn to_wire_lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(name, values)| format!("{name}: {}", values.join(", ")))
            .chain(self.raws.iter().cloned())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Number of structured header names; raw lines are not counted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.raws.is_empty()
    }

    fn replace_values(&mut self, name: &str, values: Vec<String>) {
        let key = name.to_ascii_lowercase();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, existing)) => *existing = values,
            None => self.entries.push((key, values)),
        }
    }

    fn extend_values(&mut self, name: &str, values: Vec<String>) {
        let key = name.to_ascii_lowercase();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, existing)) => existing.extend(values),
            None => self.entries.push((key, values)),
        }
    }
}

impl fmt::Display for HeaderBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.to_wire_lines() {
            write!(f, "{line}\r\n")?;
        }
        Ok(())
    }
}
