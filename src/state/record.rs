//! Listing records and their identity
//!
//! A `RecordStub` is what a listing page tells us about an entry: enough to
//! identify it and to schedule its detail fetch. A `Record` is a stub after
//! enrichment, carrying whatever fields the detail page provided.

use crate::url::canonicalize_url;
use crate::UrlResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable identifier of a listing: its canonical link
///
/// Two stubs with the same key are the same listing, whatever their titles say.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    /// Builds a key from an absolute link, canonicalizing it first
    pub fn from_link(link: &str) -> UrlResult<Self> {
        canonicalize_url(link).map(|url| Self(url.to_string()))
    }

    /// Wraps an already canonical key string, e.g. one read back from a checkpoint
    pub fn from_canonical(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Minimal identity of a listing as found on a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordStub {
    pub key: RecordKey,
    /// Listing title (e.g. the programme name)
    pub title: String,
    /// Owning entity shown next to the title (e.g. the university)
    pub parent: String,
    /// Absolute link to the detail page
    pub link: String,
}

impl RecordStub {
    /// Creates a stub, deriving its key from the link
    pub fn new(
        title: impl Into<String>,
        parent: impl Into<String>,
        link: impl Into<String>,
    ) -> UrlResult<Self> {
        let link = link.into();
        let key = RecordKey::from_link(&link)?;
        Ok(Self {
            key,
            title: title.into(),
            parent: parent.into(),
            link,
        })
    }
}

/// A value extracted from a detail page
///
/// Detail pages hold plain strings, lists of strings, and small nested
/// structures such as start dates with their application deadlines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    /// Returns true for empty text, lists and maps
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Map(map) => map.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(values: Vec<String>) -> Self {
        Self::List(values.into_iter().map(Self::Text).collect())
    }
}

/// A fully enriched listing
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub stub: RecordStub,
    /// Enrichment fields in extraction order
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    /// Creates a record with no enrichment fields yet
    pub fn new(stub: RecordStub) -> Self {
        Self {
            stub,
            fields: Vec::new(),
        }
    }

    pub fn key(&self) -> &RecordKey {
        &self.stub.key
    }

    /// Sets a field, replacing any previous value under the same name
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }
}
