//! Flattened multi-value maps.
//!
//! HTTP headers and request arguments may repeat a key. Callers mostly want
//! the single value, so a key maps to one string unless it occurs more than
//! once, in which case it maps to every value in arrival order.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// A single value, or every value of a repeated key.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum FlatValue {
    Single(String),
    Multiple(Vec<String>),
}

impl FlatValue {
    /// The first (or only) value.
    pub fn first(&self) -> &str {
        match self {
            FlatValue::Single(v) => v,
            FlatValue::Multiple(vs) => vs.first().map(String::as_str).unwrap_or(""),
        }
    }

    /// All values in arrival order.
    pub fn all(&self) -> Vec<&str> {
        match self {
            FlatValue::Single(v) => vec![v.as_str()],
            FlatValue::Multiple(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            FlatValue::Single(first) => {
                let first = std::mem::take(first);
                *self = FlatValue::Multiple(vec![first, value]);
            }
            FlatValue::Multiple(vs) => vs.push(value),
        }
    }
}

/// Insertion-ordered map of flattened values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatMap {
    entries: Vec<(String, FlatValue)>,
}

impl FlatMap {
    /// Group `pairs` by key, keeping the order in which keys first appear.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = FlatMap::default();
        for (key, value) in pairs {
            map.insert(key.into(), value.into());
        }
        map
    }

    /// Flatten a header map. Header names are lowercase.
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        Self::from_pairs(headers.iter().map(|(name, value)| {
            let value = match value.to_str() {
                Ok(v) => v.to_string(),
                Err(_) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
            };
            (name.as_str().to_string(), value)
        }))
    }

    fn insert(&mut self, key: String, value: String) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => existing.push(value),
            None => self.entries.push((key, FlatValue::Single(value))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FlatValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// First value for `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).map(FlatValue::first)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FlatValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as a JSON object, repeated keys becoming arrays.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| {
                    let v = match v {
                        FlatValue::Single(s) => serde_json::Value::String(s.clone()),
                        FlatValue::Multiple(vs) => vs.clone().into(),
                    };
                    (k.clone(), v)
                })
                .collect(),
        )
    }
}

impl Serialize for FlatMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
