//! The weakly-typed resource record.
//!
//! A [`Record`] is one decoded document: `apiVersion`, `kind`, a `metadata`
//! block holding name/namespace, and an open tree of root attributes
//! (`spec`, `rules`, `subjects`, ...). Values are `serde_json::Value`, a
//! tagged variant over null/bool/number/string/list/ordered map.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::owner::OwnerReference;

/// Identity of a record in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectRef {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: Option<&str>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.filter(|ns| !ns.is_empty()).map(String::from),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// A structured document with a kind, a name, an optional namespace and
/// arbitrary attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    object: Map<String, Value>,
}

impl Record {
    /// Create a record with the given type and name.
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        let mut object = Map::new();
        object.insert("apiVersion".to_string(), Value::String(api_version.into()));
        object.insert("kind".to_string(), Value::String(kind.into()));
        let mut metadata = Map::new();
        metadata.insert("name".to_string(), Value::String(name.into()));
        object.insert("metadata".to_string(), Value::Object(metadata));
        Self { object }
    }

    /// Wrap an already-built attribute map.
    pub fn from_map(object: Map<String, Value>) -> Self {
        Self { object }
    }

    /// Build a record from a decoded value, which must be a mapping.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Object(object) => Ok(Self { object }),
            _ => Err(DecodeError::NotAMapping { index: 0 }),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.set_namespace(Some(namespace.into()));
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set_attribute(key, value);
        self
    }

    pub fn api_version(&self) -> &str {
        self.str_field("apiVersion")
    }

    pub fn kind(&self) -> &str {
        self.str_field("kind")
    }

    pub fn name(&self) -> &str {
        self.metadata_str("name").unwrap_or_default()
    }

    /// The namespace, or `None` when unset or empty.
    pub fn namespace(&self) -> Option<&str> {
        self.metadata_str("namespace").filter(|ns| !ns.is_empty())
    }

    pub fn set_namespace(&mut self, namespace: Option<String>) {
        match namespace {
            Some(ns) => {
                self.metadata_mut()
                    .insert("namespace".to_string(), Value::String(ns));
            }
            None => {
                self.metadata_mut().remove("namespace");
            }
        }
    }

    pub fn uid(&self) -> Option<&str> {
        self.metadata_str("uid")
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata_str("resourceVersion")
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.object
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.object.get(key)
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.object.contains_key(key)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.object.insert(key.into(), value);
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<Value> {
        self.object.remove(key)
    }

    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.object.get("metadata").and_then(Value::as_object)
    }

    /// Mutable access to `metadata`, created (or replaced if not a map) on demand.
    pub fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        let entry = self
            .object
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        match entry {
            Value::Object(map) => map,
            _ => unreachable!("metadata was just replaced by an object"),
        }
    }

    pub fn finalizers(&self) -> Vec<String> {
        self.metadata()
            .and_then(|m| m.get("finalizers"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|f| f.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_finalizers(&mut self, finalizers: Vec<String>) {
        let values = finalizers.into_iter().map(Value::String).collect();
        self.metadata_mut()
            .insert("finalizers".to_string(), Value::Array(values));
    }

    pub fn is_terminating(&self) -> bool {
        self.metadata()
            .is_some_and(|m| m.get("deletionTimestamp").is_some_and(|v| !v.is_null()))
    }

    /// Owner references currently set on the record; malformed entries are skipped.
    pub fn owner_references(&self) -> Vec<OwnerReference> {
        self.metadata()
            .and_then(|m| m.get("ownerReferences"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_owner_references(&mut self, references: &[OwnerReference]) {
        let values = references
            .iter()
            .filter_map(|r| serde_json::to_value(r).ok())
            .collect();
        self.metadata_mut()
            .insert("ownerReferences".to_string(), Value::Array(values));
    }

    /// The store address of this record.
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(self.api_version(), self.kind(), self.namespace(), self.name())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.object)
    }

    /// Serialize the record as a YAML document.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.object)
    }

    fn str_field(&self, key: &str) -> &str {
        self.object
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata().and_then(|m| m.get(key)).and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(object: Map<String, Value>) -> Self {
        Self::from_map(object)
    }
}
