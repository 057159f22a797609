//! Argument and parameter values.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::reference::Reference;

/// Placeholder for "every service tagged `tag`", expanded by
/// `ResolveTaggedCollectionsPass` into a priority-ordered list of references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedCollection {
    pub tag: String,
    #[serde(default)]
    pub require_non_empty: bool,
}

impl TaggedCollection {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            require_non_empty: false,
        }
    }

    /// Compilation fails when no service carries the tag.
    pub fn non_empty(mut self) -> Self {
        self.require_non_empty = true;
        self
    }
}

/// A value stored in the parameter bag or passed to a constructor, method
/// call or property.
///
/// Parameters only ever hold the scalar, list and map variants. Definition
/// slots may additionally hold references and tagged collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Reference(Reference),
    Tagged(TaggedCollection),
}

impl Value {
    /// Name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Reference(_) => "reference",
            Value::Tagged(_) => "tagged collection",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Value::Reference(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text form of a scalar when embedded into a larger string.
    /// Returns `None` for values that cannot be embedded.
    pub(crate) fn to_embedded_string(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Bool(true) => Some("1".to_string()),
            Value::Bool(false) => Some(String::new()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Calls `f` for every reference nested in this value, depth first.
    pub fn for_each_reference<'a>(&'a self, f: &mut impl FnMut(&'a Reference)) {
        match self {
            Value::Reference(r) => f(r),
            Value::List(items) => items.iter().for_each(|v| v.for_each_reference(&mut *f)),
            Value::Map(map) => map.values().for_each(|v| v.for_each_reference(&mut *f)),
            _ => {}
        }
    }

    /// Mutable variant of [`Value::for_each_reference`].
    pub fn for_each_reference_mut(&mut self, f: &mut impl FnMut(&mut Reference)) {
        match self {
            Value::Reference(r) => f(r),
            Value::List(items) => items.iter_mut().for_each(|v| v.for_each_reference_mut(&mut *f)),
            Value::Map(map) => map.values_mut().for_each(|v| v.for_each_reference_mut(&mut *f)),
            _ => {}
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Reference> for Value {
    fn from(v: Reference) -> Self {
        Value::Reference(v)
    }
}

impl From<TaggedCollection> for Value {
    fn from(v: TaggedCollection) -> Self {
        Value::Tagged(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(v: IndexMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

/// Converts a plain JSON document into a [`Value`]; JSON objects keep their
/// key order.
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_are_visited_in_nested_collections() {
        let mut map = IndexMap::new();
        map.insert("x".to_string(), Value::from(Reference::new("b")));
        let value = Value::List(vec![Value::from(Reference::new("a")), Value::Map(map), Value::from(3)]);

        let mut seen = Vec::new();
        value.for_each_reference(&mut |r| seen.push(r.id.clone()));
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn only_scalars_embed_into_strings() {
        assert_eq!(Value::from(true).to_embedded_string().as_deref(), Some("1"));
        assert_eq!(Value::from(12).to_embedded_string().as_deref(), Some("12"));
        assert_eq!(Value::List(vec![]).to_embedded_string(), None);
    }
}
