use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Insertion-ordered attribute map used for reporting columns.
pub type Attributes = IndexMap<String, Value>;

/// Identifier of an isolation group. Jobs whose data conditions share a key
/// may share merged and cached components; different keys never do.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(String);

impl GroupKey {
    /// Name of the group conditions fall into when none is configured.
    pub const DEFAULT: &'static str = "default";

    /// Creates a key from its textual form.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the textual form of the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for GroupKey {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for GroupKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for GroupKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One train/test data condition an algorithm is evaluated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataCondition {
    id: String,
    #[serde(default)]
    attributes: Attributes,
    #[serde(default)]
    group: GroupKey,
}

impl DataCondition {
    /// Creates a condition in the default isolation group with no attributes.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Attributes::new(),
            group: GroupKey::default(),
        }
    }

    /// Adds a reporting attribute, keeping insertion order.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Places the condition into the given isolation group.
    pub fn in_group(mut self, group: impl Into<GroupKey>) -> Self {
        self.group = group.into();
        self
    }

    /// Condition identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Reporting attributes in insertion order.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Isolation group the condition belongs to.
    pub fn group(&self) -> &GroupKey {
        &self.group
    }
}

/// A configured algorithm variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmVariant {
    name: String,
    #[serde(default)]
    attributes: Attributes,
    /// Opaque descriptor handed to the configuration resolver.
    #[serde(default)]
    config: Value,
}

impl AlgorithmVariant {
    /// Creates a variant with an empty descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Attributes::new(),
            config: Value::Null,
        }
    }

    /// Adds a reporting attribute, keeping insertion order.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Sets the configuration descriptor.
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Variant name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reporting attributes in insertion order.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Configuration descriptor.
    pub fn config(&self) -> &Value {
        &self.config
    }
}

/// One output row keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultRow(IndexMap<String, Value>);

impl ResultRow {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column value, replacing any previous value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    /// Copies every attribute into the row.
    pub fn extend_from(&mut self, attributes: &Attributes) {
        for (key, value) in attributes {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Looks up a column value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Returns true when the row carries the column.
    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    /// Iterates the column names present in the row.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterates `(column, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Number of populated columns.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when no column is populated.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for ResultRow {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
