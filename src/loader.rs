//! YAML and JSON service files.
//!
//! ```yaml
//! imports:
//!   - { resource: common.yaml }
//!
//! parameters:
//!   mailer.sender: noreply@example.com
//!
//! services:
//!   mailer:
//!     class: Mailer
//!     public: true
//!     arguments: ['@transport', '%mailer.sender%', '@?logger']
//!     calls:
//!       - [setListeners, [!tagged mailer.listener]]
//!     tags:
//!       - { name: app.notifier, priority: 10 }
//!   transport:
//!     factory: [TransportFactory, create]
//!   app.mailer: '@mailer'
//! ```
//!
//! Argument strings starting with `@` are references (`@?id` becomes null
//! when `id` is missing, `@!id` is dropped, `@@` escapes a literal `@`).
//! JSON files spell tagged collections `{"!tagged": "name"}`. Every file read
//! is tracked as a file resource on the builder.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::alias::Alias;
use crate::builder::ContainerBuilder;
use crate::definition::{Definition, Factory, TagAttributes};
use crate::error::{DiError, DiResult};
use crate::reference::{InvalidBehavior, Reference};
use crate::resource::Resource;
use crate::value::{TaggedCollection, Value};

const TAGGED_KEY: &str = "!tagged";

const SERVICE_KEYS: &[&str] = &[
    "class",
    "arguments",
    "calls",
    "properties",
    "tags",
    "public",
    "lazy",
    "shared",
    "abstract",
    "synthetic",
    "factory",
    "decorates",
    "decoration_inner_name",
    "decoration_priority",
    "decoration_on_invalid",
];

const ALIAS_KEYS: &[&str] = &["alias", "public", "deprecated"];

/// Source format of a service file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    #[cfg(feature = "yaml")]
    Yaml,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Some(FileFormat::Json),
            #[cfg(feature = "yaml")]
            Some("yaml" | "yml") => Some(FileFormat::Yaml),
            _ => None,
        }
    }
}

/// Loads service files into a [`ContainerBuilder`].
///
/// # Examples
///
/// ```rust
/// use di_compiler::loader::{FileFormat, FileLoader};
/// use di_compiler::{ContainerBuilder, Value};
///
/// let mut builder = ContainerBuilder::new();
/// FileLoader::new(&mut builder)
///     .load_str(
///         r#"{
///             "parameters": { "locale": "en" },
///             "services": {
///                 "translator": { "class": "Translator", "arguments": ["%locale%", "@?cache"], "public": true }
///             }
///         }"#,
///         FileFormat::Json,
///     )
///     .unwrap();
///
/// let frozen = builder.compile().unwrap();
/// let translator = frozen.registry().definition("translator").unwrap();
/// assert_eq!(translator.arguments, vec![Value::from("en"), Value::Null]);
/// ```
#[derive(Debug)]
pub struct FileLoader<'a> {
    builder: &'a mut ContainerBuilder,
    loading: Vec<PathBuf>,
}

impl<'a> FileLoader<'a> {
    pub fn new(builder: &'a mut ContainerBuilder) -> Self {
        Self {
            builder,
            loading: Vec::new(),
        }
    }

    /// Loads `path` and its imports; the format follows the extension.
    pub fn load(&mut self, path: impl AsRef<Path>) -> DiResult<()> {
        let path = path.as_ref();
        let format = FileFormat::from_path(path)
            .ok_or_else(|| invalid_file(path, "unsupported file extension"))?;
        let path = fs::canonicalize(path).map_err(|e| DiError::io(path, e))?;

        if self.loading.contains(&path) {
            let chain: Vec<String> = self
                .loading
                .iter()
                .chain(std::iter::once(&path))
                .map(|p| p.display().to_string())
                .collect();
            return Err(invalid_file(&path, format!("circular import: {}", chain.join(" -> "))));
        }

        let content = fs::read_to_string(&path).map_err(|e| DiError::io(&path, e))?;
        tracing::debug!(path = %path.display(), "loading service file");
        self.builder.add_resource(Resource::file(&path));

        self.loading.push(path.clone());
        let result = parse(&path, &content, format).and_then(|document| self.apply(&path, document));
        self.loading.pop();
        result
    }

    /// Loads a document that does not come from a file. Imports are
    /// resolved against the working directory and nothing is tracked.
    pub fn load_str(&mut self, content: &str, format: FileFormat) -> DiResult<()> {
        let document = parse(Path::new("."), content, format)?;
        self.apply(Path::new("."), document)
    }

    fn apply(&mut self, path: &Path, document: Json) -> DiResult<()> {
        let mut root = match document {
            Json::Null => return Ok(()),
            Json::Object(root) => root,
            _ => return Err(invalid_file(path, "the root must be a map")),
        };
        if let Some(key) = root
            .keys()
            .find(|k| !matches!(k.as_str(), "imports" | "parameters" | "services"))
        {
            return Err(invalid_file(
                path,
                format!("unsupported key \"{key}\"; expected \"imports\", \"parameters\" or \"services\""),
            ));
        }

        if let Some(imports) = root.remove("imports") {
            self.import_all(path, imports)?;
        }

        match root.remove("parameters") {
            None | Some(Json::Null) => {}
            Some(Json::Object(parameters)) => {
                for (name, value) in parameters {
                    self.builder.set_parameter(name, Value::from(value));
                }
            }
            Some(_) => return Err(invalid_file(path, "\"parameters\" must be a map")),
        }

        match root.remove("services") {
            None | Some(Json::Null) => {}
            Some(Json::Object(services)) => {
                for (id, entry) in services {
                    self.service(path, id, entry)?;
                }
            }
            Some(_) => return Err(invalid_file(path, "\"services\" must be a map")),
        }
        Ok(())
    }

    fn import_all(&mut self, path: &Path, imports: Json) -> DiResult<()> {
        let Json::Array(imports) = imports else {
            return Err(invalid_file(path, "\"imports\" must be a list"));
        };
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for import in imports {
            let (resource, ignore_errors) = match &import {
                Json::String(resource) => (resource.clone(), false),
                Json::Object(map) => match map.get("resource") {
                    Some(Json::String(resource)) => (
                        resource.clone(),
                        map.get("ignore_errors").and_then(Json::as_bool).unwrap_or(false),
                    ),
                    _ => return Err(invalid_file(path, "an import needs a \"resource\" string")),
                },
                _ => return Err(invalid_file(path, "an import must be a string or a map")),
            };

            let target = base.join(&resource);
            if ignore_errors && !target.exists() {
                tracing::debug!(resource = %target.display(), "skipping missing optional import");
                continue;
            }
            self.load(&target)?;
        }
        Ok(())
    }

    fn service(&mut self, path: &Path, id: String, entry: Json) -> DiResult<()> {
        let entry = match entry {
            Json::Null => {
                self.builder.register(id.clone(), Definition::new(id));
                return Ok(());
            }
            Json::String(target) => match target.strip_prefix('@') {
                Some(target) => {
                    self.builder.set_alias(id, Alias::new(target));
                    return Ok(());
                }
                None => return Err(invalid_service(path, &id, "a string entry must be an \"@alias\"")),
            },
            Json::Object(entry) => entry,
            _ => return Err(invalid_service(path, &id, "expected a map, an \"@alias\" or null")),
        };

        if entry.contains_key("alias") {
            return self.alias(path, id, entry);
        }
        if let Some(key) = entry.keys().find(|k| !SERVICE_KEYS.contains(&k.as_str())) {
            return Err(invalid_service(
                path,
                &id,
                format!("unsupported key \"{key}\"; expected one of \"{}\"", SERVICE_KEYS.join("\", \"")),
            ));
        }

        let mut def = Definition::default();
        def.class = optional_string(path, &id, &entry, "class")?;

        if let Some(factory) = entry.get("factory") {
            def.factory = Some(parse_factory(path, &id, factory)?);
        }
        if def.class.is_none() && def.factory.is_none() && !flag(path, &id, &entry, "synthetic")? {
            def.class = Some(id.clone());
        }

        match entry.get("arguments") {
            None | Some(Json::Null) => {}
            Some(Json::Array(args)) => def.arguments = args.iter().map(parse_value).collect::<DiResult<_>>()?,
            Some(_) => return Err(invalid_service(path, &id, "\"arguments\" must be a list")),
        }

        match entry.get("calls") {
            None | Some(Json::Null) => {}
            Some(Json::Array(calls)) => {
                for call in calls {
                    let (method, args) = parse_call(path, &id, call)?;
                    def = def.call(method, args);
                }
            }
            Some(_) => return Err(invalid_service(path, &id, "\"calls\" must be a list")),
        }

        match entry.get("properties") {
            None | Some(Json::Null) => {}
            Some(Json::Object(properties)) => {
                for (name, value) in properties {
                    def.properties.insert(name.clone(), parse_value(value)?);
                }
            }
            Some(_) => return Err(invalid_service(path, &id, "\"properties\" must be a map")),
        }

        match entry.get("tags") {
            None | Some(Json::Null) => {}
            Some(Json::Array(tags)) => {
                for tag in tags {
                    let (name, attributes) = parse_tag(path, &id, tag)?;
                    def = def.tag_with(name, attributes);
                }
            }
            Some(_) => return Err(invalid_service(path, &id, "\"tags\" must be a list")),
        }

        def.public = flag(path, &id, &entry, "public")?;
        def.lazy = flag(path, &id, &entry, "lazy")?;
        def.is_abstract = flag(path, &id, &entry, "abstract")?;
        def.synthetic = flag(path, &id, &entry, "synthetic")?;
        if entry.contains_key("shared") {
            def.shared = flag(path, &id, &entry, "shared")?;
        }

        if let Some(decorated) = optional_string(path, &id, &entry, "decorates")? {
            let inner = optional_string(path, &id, &entry, "decoration_inner_name")?;
            let priority = match entry.get("decoration_priority") {
                None | Some(Json::Null) => 0,
                Some(p) => p
                    .as_i64()
                    .and_then(|p| i32::try_from(p).ok())
                    .ok_or_else(|| invalid_service(path, &id, "\"decoration_priority\" must be an integer"))?,
            };
            def = def.decorate(decorated, inner, priority);
            if let Some(behavior) = optional_string(path, &id, &entry, "decoration_on_invalid")? {
                let behavior = match behavior.as_str() {
                    "exception" => InvalidBehavior::ExceptionOnInvalid,
                    "ignore" => InvalidBehavior::IgnoreOnInvalid,
                    "null" => InvalidBehavior::NullOnInvalid,
                    other => {
                        return Err(invalid_service(
                            path,
                            &id,
                            format!("invalid \"decoration_on_invalid\" value \"{other}\"; expected \"exception\", \"ignore\" or \"null\""),
                        ))
                    }
                };
                if let Some(decoration) = def.decorates.as_mut() {
                    decoration.behavior = behavior;
                }
            }
        } else if entry.contains_key("decoration_inner_name") || entry.contains_key("decoration_priority") {
            return Err(invalid_service(path, &id, "decoration options require \"decorates\""));
        }

        self.builder.register(id, def);
        Ok(())
    }

    fn alias(&mut self, path: &Path, id: String, entry: serde_json::Map<String, Json>) -> DiResult<()> {
        if let Some(key) = entry.keys().find(|k| !ALIAS_KEYS.contains(&k.as_str())) {
            return Err(invalid_service(
                path,
                &id,
                format!("unsupported key \"{key}\" for an alias; expected \"alias\", \"public\" or \"deprecated\""),
            ));
        }
        let target = optional_string(path, &id, &entry, "alias")?
            .ok_or_else(|| invalid_service(path, &id, "\"alias\" must be a string"))?;

        let mut alias = Alias::new(target);
        if entry.contains_key("public") && !flag(path, &id, &entry, "public")? {
            alias = alias.private();
        }
        match entry.get("deprecated") {
            None | Some(Json::Null) | Some(Json::Bool(false)) => {}
            Some(Json::Bool(true)) => {
                alias = alias.deprecate("The \"%alias_id%\" service alias is deprecated.");
            }
            Some(Json::String(message)) => alias = alias.deprecate(message.clone()),
            Some(_) => return Err(invalid_service(path, &id, "\"deprecated\" must be a boolean or a message")),
        }
        self.builder.set_alias(id, alias);
        Ok(())
    }
}

fn parse(path: &Path, content: &str, format: FileFormat) -> DiResult<Json> {
    #[cfg(not(feature = "yaml"))]
    let _ = path;
    match format {
        FileFormat::Json => Ok(serde_json::from_str(content)?),
        #[cfg(feature = "yaml")]
        FileFormat::Yaml => yaml_to_json(path, "", serde_yaml::from_str(content)?),
    }
}

/// `!tagged name` becomes `{"!tagged": "name"}`; other YAML tags are rejected.
/// `key` is the dotted position of `value` in the document.
#[cfg(feature = "yaml")]
fn yaml_to_json(path: &Path, key: &str, value: serde_yaml::Value) -> DiResult<Json> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Json::Null,
        Yaml::Bool(b) => Json::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Json::from(i)
            } else if let Some(u) = n.as_u64() {
                Json::from(u)
            } else {
                let number = n
                    .as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .ok_or_else(|| invalid_file(path, format!("\"{key}\" must be a finite number, got {n}")))?;
                Json::Number(number)
            }
        }
        Yaml::String(s) => Json::String(s),
        Yaml::Sequence(items) => Json::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| yaml_to_json(path, &child_key(key, &i.to_string()), item))
                .collect::<DiResult<_>>()?,
        ),
        Yaml::Mapping(map) => {
            let mut object = serde_json::Map::with_capacity(map.len());
            for (name, value) in map {
                let name = match name {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    other => {
                        return Err(DiError::Serialization(format!("unsupported map key {other:?}")));
                    }
                };
                let value = yaml_to_json(path, &child_key(key, &name), value)?;
                object.insert(name, value);
            }
            Json::Object(object)
        }
        Yaml::Tagged(tagged) => {
            if tagged.tag == "tagged" || tagged.tag == "tagged_iterator" {
                let Yaml::String(name) = tagged.value else {
                    return Err(DiError::Serialization("\"!tagged\" expects a tag name".to_string()));
                };
                let mut object = serde_json::Map::new();
                object.insert(TAGGED_KEY.to_string(), Json::String(name));
                Json::Object(object)
            } else {
                return Err(DiError::Serialization(format!("unsupported YAML tag \"{}\"", tagged.tag)));
            }
        }
    })
}

#[cfg(feature = "yaml")]
fn child_key(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

/// Converts an argument, resolving `@` references and tagged collections.
fn parse_value(value: &Json) -> DiResult<Value> {
    Ok(match value {
        Json::String(s) => parse_string(s),
        Json::Array(items) => Value::List(items.iter().map(parse_value).collect::<DiResult<_>>()?),
        Json::Object(map) => match (map.len(), map.get(TAGGED_KEY)) {
            (1, Some(Json::String(tag))) => Value::Tagged(TaggedCollection::new(tag.clone())),
            (1, Some(_)) => {
                return Err(DiError::Serialization(format!("\"{TAGGED_KEY}\" expects a tag name")));
            }
            _ => {
                let mut entries = IndexMap::with_capacity(map.len());
                for (key, value) in map {
                    entries.insert(key.clone(), parse_value(value)?);
                }
                Value::Map(entries)
            }
        },
        other => Value::from(other.clone()),
    })
}

fn parse_string(s: &str) -> Value {
    if let Some(literal) = s.strip_prefix("@@") {
        return Value::String(format!("@{literal}"));
    }
    if let Some(id) = s.strip_prefix("@?") {
        return Reference::null_on_invalid(id).into();
    }
    if let Some(id) = s.strip_prefix("@!") {
        return Reference::ignore_on_invalid(id).into();
    }
    if let Some(id) = s.strip_prefix('@') {
        return Reference::new(id).into();
    }
    Value::String(s.to_string())
}

/// `[Class, method]`, `['@service', method]` or `"Class::method"`.
fn parse_factory(path: &Path, id: &str, factory: &Json) -> DiResult<Factory> {
    let (target, method) = match factory {
        Json::Array(parts) => match parts.as_slice() {
            [Json::String(target), Json::String(method)] => (target.clone(), method.clone()),
            _ => return Err(invalid_service(path, id, "\"factory\" must be [class or @service, method]")),
        },
        Json::String(callable) => match callable.split_once("::") {
            Some((class, method)) => (class.to_string(), method.to_string()),
            None => return Err(invalid_service(path, id, "a string \"factory\" must look like \"Class::method\"")),
        },
        _ => return Err(invalid_service(path, id, "\"factory\" must be a list or a string")),
    };

    Ok(match parse_string(&target) {
        Value::Reference(service) => Factory::Service { service, method },
        _ => Factory::Class { class: target, method },
    })
}

/// `[method, [args]]`, `[method]` or `{ method: m, arguments: [args] }`.
fn parse_call(path: &Path, id: &str, call: &Json) -> DiResult<(String, Vec<Value>)> {
    let (method, args) = match call {
        Json::Array(parts) => match parts.as_slice() {
            [Json::String(method)] => (method.clone(), None),
            [Json::String(method), args] => (method.clone(), Some(args)),
            _ => return Err(invalid_service(path, id, "a call must be [method, [arguments]]")),
        },
        Json::Object(map) => match map.get("method") {
            Some(Json::String(method)) => (method.clone(), map.get("arguments")),
            _ => return Err(invalid_service(path, id, "a call map needs a \"method\" string")),
        },
        _ => return Err(invalid_service(path, id, "a call must be a list or a map")),
    };

    let args = match args {
        None | Some(Json::Null) => Vec::new(),
        Some(Json::Array(args)) => args.iter().map(parse_value).collect::<DiResult<_>>()?,
        Some(_) => {
            return Err(invalid_service(path, id, format!("arguments of call \"{method}\" must be a list")));
        }
    };
    Ok((method, args))
}

/// `name` or `{ name: n, priority: 10, ... }`.
fn parse_tag(path: &Path, id: &str, tag: &Json) -> DiResult<(String, TagAttributes)> {
    match tag {
        Json::String(name) if !name.is_empty() => Ok((name.clone(), TagAttributes::new())),
        Json::Object(map) => {
            let name = match map.get("name") {
                Some(Json::String(name)) if !name.is_empty() => name.clone(),
                _ => return Err(invalid_service(path, id, "a tag needs a non-empty \"name\"")),
            };
            let mut attributes = TagAttributes::new();
            for (key, value) in map.iter().filter(|(k, _)| k.as_str() != "name") {
                if value.is_array() || value.is_object() {
                    return Err(invalid_service(
                        path,
                        id,
                        format!("attribute \"{key}\" of tag \"{name}\" must be a scalar"),
                    ));
                }
                attributes.insert(key.clone(), Value::from(value.clone()));
            }
            Ok((name, attributes))
        }
        _ => Err(invalid_service(path, id, "a tag must be a non-empty string or a map")),
    }
}

fn flag(path: &Path, id: &str, entry: &serde_json::Map<String, Json>, key: &str) -> DiResult<bool> {
    match entry.get(key) {
        None | Some(Json::Null) => Ok(false),
        Some(Json::Bool(b)) => Ok(*b),
        Some(_) => Err(invalid_service(path, id, format!("\"{key}\" must be a boolean"))),
    }
}

fn optional_string(
    path: &Path,
    id: &str,
    entry: &serde_json::Map<String, Json>,
    key: &str,
) -> DiResult<Option<String>> {
    match entry.get(key) {
        None | Some(Json::Null) => Ok(None),
        Some(Json::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(invalid_service(path, id, format!("\"{key}\" must be a string"))),
    }
}

fn invalid_file(path: &Path, message: impl Into<String>) -> DiError {
    DiError::InvalidConfigFile {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

fn invalid_service(path: &Path, id: &str, message: impl Into<String>) -> DiError {
    invalid_file(path, format!("service \"{id}\": {}", message.into()))
}
