//! Class catalog consulted when checking declared parameter types.
//!
//! The compiler never instantiates anything, so it learns about classes from
//! declarations: parents, interfaces, constructor and method signatures.
//! Classes missing from the catalog are not checked.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Declared type of a parameter or property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Class(String),
    Int,
    Float,
    Bool,
    String,
    List,
    Map,
    Mixed,
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamType::Class(name) => f.write_str(name),
            ParamType::Int => f.write_str("int"),
            ParamType::Float => f.write_str("float"),
            ParamType::Bool => f.write_str("bool"),
            ParamType::String => f.write_str("string"),
            ParamType::List => f.write_str("list"),
            ParamType::Map => f.write_str("map"),
            ParamType::Mixed => f.write_str("mixed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    pub ty: ParamType,
    #[serde(default)]
    pub nullable: bool,
    /// Has a default value and may be omitted.
    #[serde(default)]
    pub optional: bool,
}

impl ParamDecl {
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
            optional: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Whether a scalar or container value satisfies the declaration.
    /// References are checked against the catalog by the caller.
    pub fn accepts_value(&self, value: &Value) -> bool {
        match (value, &self.ty) {
            (_, ParamType::Mixed) => true,
            (Value::Null, _) => self.nullable,
            (Value::Bool(_), ParamType::Bool) => true,
            (Value::Int(_), ParamType::Int | ParamType::Float) => true,
            (Value::Float(_), ParamType::Float) => true,
            (Value::String(_), ParamType::String) => true,
            (Value::List(_), ParamType::List) => true,
            (Value::Map(_), ParamType::Map) => true,
            _ => false,
        }
    }
}

/// Declared shape of one class or interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub constructor: Vec<ParamDecl>,
    #[serde(default)]
    pub methods: IndexMap<String, Vec<ParamDecl>>,
    #[serde(default)]
    pub properties: IndexMap<String, ParamDecl>,
}

impl ClassInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn constructor(mut self, params: Vec<ParamDecl>) -> Self {
        self.constructor = params;
        self
    }

    pub fn method(mut self, name: impl Into<String>, params: Vec<ParamDecl>) -> Self {
        self.methods.insert(name.into(), params);
        self
    }

    pub fn property(mut self, decl: ParamDecl) -> Self {
        self.properties.insert(decl.name.clone(), decl);
        self
    }
}

/// Registry of declared classes.
///
/// # Examples
///
/// ```rust
/// use di_compiler::{ClassCatalog, ClassInfo};
///
/// let mut catalog = ClassCatalog::new();
/// catalog.declare(ClassInfo::new("LoggerInterface"));
/// catalog.declare(ClassInfo::new("FileLogger").implements("LoggerInterface"));
/// catalog.declare(ClassInfo::new("RotatingLogger").extends("FileLogger"));
///
/// assert!(catalog.is_subtype("RotatingLogger", "LoggerInterface"));
/// assert!(!catalog.is_subtype("FileLogger", "RotatingLogger"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCatalog {
    classes: IndexMap<String, ClassInfo>,
}

impl ClassCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, info: ClassInfo) -> &mut Self {
        self.classes.insert(info.name.clone(), info);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn merge(&mut self, other: ClassCatalog) {
        self.classes.extend(other.classes);
    }

    /// Every parent class and interface of `name`, without duplicates.
    pub fn ancestors(&self, name: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut queue: Vec<&str> = vec![name];
        while let Some(current) = queue.pop() {
            let Some(info) = self.classes.get(current) else {
                continue;
            };
            for next in info.interfaces.iter().rev().chain(info.parent.iter()).map(String::as_str) {
                if next != name && !out.iter().any(|seen| seen == next) {
                    out.push(next.to_string());
                    queue.push(next);
                }
            }
        }
        out
    }

    /// Whether `class` is `target` or extends/implements it.
    pub fn is_subtype(&self, class: &str, target: &str) -> bool {
        class == target || self.ancestors(class).iter().any(|a| a == target)
    }

    /// The signature of `method` on `class` or its nearest ancestor declaring it.
    pub fn method(&self, class: &str, method: &str) -> Option<&[ParamDecl]> {
        std::iter::once(class.to_string())
            .chain(self.ancestors(class))
            .find_map(|name| self.classes.get(&name)?.methods.get(method).map(Vec::as_slice))
    }

    /// The declared property on `class` or its nearest ancestor declaring it.
    pub fn property(&self, class: &str, property: &str) -> Option<&ParamDecl> {
        std::iter::once(class.to_string())
            .chain(self.ancestors(class))
            .find_map(|name| self.classes.get(&name)?.properties.get(property))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestors_follow_parents_and_interfaces() {
        let mut catalog = ClassCatalog::new();
        catalog
            .declare(ClassInfo::new("C").extends("B").implements("I"))
            .declare(ClassInfo::new("B").extends("A").implements("J"))
            .declare(ClassInfo::new("A"));

        let ancestors = catalog.ancestors("C");
        assert!(ancestors.contains(&"A".to_string()));
        assert!(ancestors.contains(&"J".to_string()));
        assert!(catalog.is_subtype("C", "J"));
    }

    #[test]
    fn methods_are_inherited() {
        let mut catalog = ClassCatalog::new();
        catalog
            .declare(ClassInfo::new("Base").method("setLogger", vec![ParamDecl::new("l", ParamType::Mixed)]))
            .declare(ClassInfo::new("Child").extends("Base"));

        assert_eq!(catalog.method("Child", "setLogger").map(<[ParamDecl]>::len), Some(1));
        assert!(catalog.method("Child", "missing").is_none());
    }

    #[test]
    fn int_is_accepted_for_float() {
        assert!(ParamDecl::new("ratio", ParamType::Float).accepts_value(&Value::Int(1)));
        assert!(!ParamDecl::new("ratio", ParamType::Int).accepts_value(&Value::Float(1.5)));
        assert!(ParamDecl::new("x", ParamType::Int).nullable().accepts_value(&Value::Null));
    }
}
