// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Node types that own other nodes.
pub const CONTAINER_TYPES: &[&str] = &["tab", "subflow", "group"];

/// Container types that map to a directory of their own at explode time.
/// Groups live inside their parent tab and do not partition the tree.
pub const PARTITION_TYPES: &[&str] = &["tab", "subflow"];

/// Fields that describe placement and wiring rather than content. These go to
/// the skeleton; everything else is content and lives in per-node files.
/// `id`, `type`, and `z` are handled separately.
pub const STRUCTURAL_FIELDS: &[&str] = &["x", "y", "wires", "links", "scope", "nodes", "in", "out"];

#[must_use]
pub fn is_structural_field(name: &str) -> bool {
    STRUCTURAL_FIELDS.contains(&name)
}

/// One element of a flow document: a JSON object carrying at least `id` and
/// `type`, an optional parent container id `z`, and arbitrary type-specific
/// fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Node(Map<String, Value>);

impl Node {
    #[must_use]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    fn str_field(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.str_field("id")
    }

    #[must_use]
    pub fn node_type(&self) -> Option<&str> {
        self.str_field("type")
    }

    #[must_use]
    pub fn z(&self) -> Option<&str> {
        self.str_field("z").filter(|z| !z.is_empty())
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    #[must_use]
    pub fn is_container(&self) -> bool {
        self.node_type()
            .is_some_and(|t| CONTAINER_TYPES.contains(&t))
    }

    #[must_use]
    pub fn is_partition_container(&self) -> bool {
        self.node_type()
            .is_some_and(|t| PARTITION_TYPES.contains(&t))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    #[must_use]
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for Node {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}
