//! Service definitions: the declarative description of how to build one service.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::reference::{InvalidBehavior, Reference};
use crate::value::Value;

/// Attributes attached to one occurrence of a tag (`priority`, `event`, ...).
pub type TagAttributes = IndexMap<String, Value>;

/// A method invoked on the instance right after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

/// How an instance is produced when it is not built by the class constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Factory {
    /// A static constructor registered as `Class::method`.
    Class { class: String, method: String },
    /// A method called on another service.
    Service { service: Reference, method: String },
}

/// Marks a definition as a decorator of another service id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decoration {
    /// The decorated service.
    pub id: String,
    /// Id the decorated definition is renamed to; defaults to `<decorator>.inner`.
    #[serde(default)]
    pub inner_id: Option<String>,
    /// Higher priorities are applied first, closest to the original service.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub behavior: InvalidBehavior,
}

/// Declarative description of one service.
///
/// Definitions are owned by the registry until compilation freezes them.
///
/// # Examples
///
/// ```rust
/// use di_compiler::{Definition, Reference};
///
/// let mailer = Definition::new("Mailer")
///     .arg(Reference::new("transport"))
///     .arg("%mailer.sender%")
///     .call("setLogger", vec![Reference::null_on_invalid("logger").into()])
///     .tag("app.notifier")
///     .public();
///
/// assert_eq!(mailer.class.as_deref(), Some("Mailer"));
/// assert_eq!(mailer.arguments.len(), 2);
/// assert!(mailer.has_tag("app.notifier"));
/// assert!(mailer.shared);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub factory: Option<Factory>,
    #[serde(default)]
    pub arguments: Vec<Value>,
    #[serde(default)]
    pub calls: Vec<MethodCall>,
    #[serde(default)]
    pub properties: IndexMap<String, Value>,
    #[serde(default)]
    pub tags: IndexMap<String, Vec<TagAttributes>>,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub lazy: bool,
    #[serde(default = "default_shared")]
    pub shared: bool,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub synthetic: bool,
    #[serde(default)]
    pub decorates: Option<Decoration>,
}

fn default_shared() -> bool {
    true
}

impl Default for Definition {
    fn default() -> Self {
        Self {
            class: None,
            factory: None,
            arguments: Vec::new(),
            calls: Vec::new(),
            properties: IndexMap::new(),
            tags: IndexMap::new(),
            public: false,
            lazy: false,
            shared: true,
            is_abstract: false,
            synthetic: false,
            decorates: None,
        }
    }
}

impl Definition {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: Some(class.into()),
            ..Self::default()
        }
    }

    /// A definition built by a factory instead of a class constructor.
    pub fn from_factory(factory: Factory) -> Self {
        Self {
            factory: Some(factory),
            ..Self::default()
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.arguments.push(value.into());
        self
    }

    pub fn args(mut self, values: Vec<Value>) -> Self {
        self.arguments = values;
        self
    }

    pub fn call(mut self, method: impl Into<String>, arguments: Vec<Value>) -> Self {
        self.calls.push(MethodCall::new(method, arguments));
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn tag(self, name: impl Into<String>) -> Self {
        self.tag_with(name, TagAttributes::new())
    }

    pub fn tag_with(mut self, name: impl Into<String>, attributes: TagAttributes) -> Self {
        self.tags.entry(name.into()).or_default().push(attributes);
        self
    }

    /// Tags the definition with a single `priority` attribute.
    pub fn tag_priority(self, name: impl Into<String>, priority: i64) -> Self {
        let mut attributes = TagAttributes::new();
        attributes.insert("priority".to_string(), Value::Int(priority));
        self.tag_with(name, attributes)
    }

    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    pub fn set_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn not_shared(mut self) -> Self {
        self.shared = false;
        self
    }

    pub fn abstract_(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }

    pub fn factory(mut self, factory: Factory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Decorates `id`; the decorated definition becomes `inner_id`
    /// (or `<this id>.inner`) and stays reachable through that id.
    pub fn decorate(mut self, id: impl Into<String>, inner_id: Option<String>, priority: i32) -> Self {
        self.decorates = Some(Decoration {
            id: id.into(),
            inner_id,
            priority,
            behavior: InvalidBehavior::ExceptionOnInvalid,
        });
        self
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    pub fn clear_tag(&mut self, name: &str) {
        self.tags.shift_remove(name);
    }

    pub fn has_method_call(&self, method: &str) -> bool {
        self.calls.iter().any(|c| c.method == method)
    }

    /// Display name used in logs: the class, or the factory for factory-built services.
    pub fn display_class(&self) -> String {
        match (&self.class, &self.factory) {
            (Some(class), _) => class.clone(),
            (None, Some(Factory::Class { class, method })) => format!("{class}::{method}"),
            (None, Some(Factory::Service { service, method })) => format!("{service}->{method}"),
            (None, None) => "<undefined>".to_string(),
        }
    }

    /// Calls `f` on every value slot of the definition: factory service,
    /// constructor arguments, method call arguments and properties.
    pub fn for_each_value_mut(&mut self, f: &mut impl FnMut(&mut Value)) {
        self.arguments.iter_mut().for_each(&mut *f);
        for call in &mut self.calls {
            call.arguments.iter_mut().for_each(&mut *f);
        }
        self.properties.values_mut().for_each(&mut *f);
    }

    /// Calls `f` on every reference of the definition, including the factory service.
    pub fn for_each_reference_mut(&mut self, f: &mut impl FnMut(&mut Reference)) {
        if let Some(Factory::Service { service, .. }) = &mut self.factory {
            f(service);
        }
        self.for_each_value_mut(&mut |value| value.for_each_reference_mut(&mut *f));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_tags_keep_each_occurrence() {
        let def = Definition::new("Listener")
            .tag_priority("kernel.listener", 10)
            .tag_priority("kernel.listener", -5);

        assert_eq!(def.tags["kernel.listener"].len(), 2);
        assert_eq!(def.tags["kernel.listener"][1]["priority"], Value::Int(-5));
    }

    #[test]
    fn references_include_the_factory_service() {
        let mut def = Definition::from_factory(Factory::Service {
            service: Reference::new("factory"),
            method: "create".into(),
        })
        .arg(Reference::new("a"))
        .property("b", Reference::new("b"));

        let mut ids = Vec::new();
        def.for_each_reference_mut(&mut |r| ids.push(r.id.clone()));
        assert_eq!(ids, vec!["factory", "a", "b"]);
    }

    #[test]
    fn defaults_match_a_private_shared_service() {
        let def: Definition = serde_json::from_str(r#"{"class":"Foo"}"#).unwrap();
        assert!(def.shared);
        assert!(!def.public);
        assert!(!def.lazy);
    }
}
