use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;

use crate::constants::KEY_ESCAPE;

/// A logical service, identified by `(name, version)`.
///
/// Each stored record carries exactly one node. Records sharing a name and
/// version are merged when read back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub endpoints: Vec<Endpoint>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nodes: Vec<Node>,
}

/// One running instance of a service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub request: Option<Value>,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: BTreeMap<String, String>,
}

/// Recursive description of an endpoint payload type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub value_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub values: Vec<Value>,
}

/// Records written by other clients encode empty collections as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Service {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    pub fn with_node(
        mut self,
        node: Node,
    ) -> Self {
        self.nodes.push(node);
        self
    }

    /// Copy of this service carrying only `node`.
    pub(crate) fn single_node(
        &self,
        node: &Node,
    ) -> Self {
        Self {
            name: self.name.clone(),
            version: self.version.clone(),
            metadata: self.metadata.clone(),
            endpoints: self.endpoints.clone(),
            nodes: vec![node.clone()],
        }
    }
}

impl Node {
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Replaces `/` so names and ids stay single key segments.
pub(crate) fn escape(segment: &str) -> String {
    segment.replace('/', KEY_ESCAPE)
}

/// `<prefix><escaped name>/` without a trailing node id.
pub(crate) fn service_path(
    prefix: &str,
    name: &str,
) -> String {
    format!("{}/{}/", prefix.trim_end_matches('/'), escape(name))
}

pub(crate) fn node_path(
    prefix: &str,
    name: &str,
    node_id: &str,
) -> String {
    format!("{}{}", service_path(prefix, name), escape(node_id))
}
