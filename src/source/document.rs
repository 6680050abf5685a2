use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

/// Structured configuration document.
///
/// Maps are ordered so an encoded document is byte-stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Document {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Seq(Vec<Document>),
    Map(BTreeMap<String, Document>),
}

impl Document {
    /// Empty map, the root of every configuration document
    pub fn empty() -> Self {
        Document::Map(BTreeMap::new())
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Document::Map(_))
    }

    /// Value at `path`, descending through maps only.
    pub fn get(
        &self,
        path: &[&str],
    ) -> Option<&Document> {
        let mut node = self;
        for segment in path {
            match node {
                Document::Map(map) => node = map.get(*segment)?,
                _ => return None,
            }
        }
        Some(node)
    }

    /// Applies one key change at `path`; `None` removes the key.
    ///
    /// A single-segment path addresses the whole document: a removal clears
    /// it and a map value replaces it (other values are ignored). Longer
    /// paths create or overwrite the intermediate maps they go through.
    pub fn patch(
        &mut self,
        path: &[&str],
        value: Option<Document>,
    ) {
        match path {
            [] => {}
            [_] => match value {
                None => *self = Document::empty(),
                Some(map @ Document::Map(_)) => *self = map,
                Some(_) => {}
            },
            _ => {
                let current = std::mem::take(self);
                *self = current.nested(path, value);
            }
        }
    }

    fn nested(
        self,
        path: &[&str],
        value: Option<Document>,
    ) -> Document {
        let mut map = match self {
            Document::Map(map) => map,
            _ => BTreeMap::new(),
        };

        match path {
            [] => {}
            [last] => match value {
                Some(value) => {
                    map.insert(last.to_string(), value);
                }
                None => {
                    map.remove(*last);
                }
            },
            [first, rest @ ..] => {
                let child = map.remove(*first).unwrap_or_default();
                map.insert(first.to_string(), child.nested(rest, value));
            }
        }
        Document::Map(map)
    }
}
