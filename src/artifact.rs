//! The compiled artifact: everything the runtime needs, nothing it doesn't.

use std::path::Path;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::alias::Alias;
use crate::builder::FrozenContainer;
use crate::definition::{Definition, Factory, MethodCall};
use crate::error::{DiError, DiResult};
use crate::proxy::ProxyDescriptor;
use crate::resource::Fingerprint;
use crate::value::Value;

/// Format version written into every artifact. Loading another version fails.
pub const ARTIFACT_VERSION: u32 = 1;

/// Instructions for building one service.
///
/// References point at concrete ids. A reference with `deferred = true`
/// receives a lazy proxy instead of the constructed target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Factory>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<MethodCall>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, Value>,
    pub public: bool,
    pub shared: bool,
    #[serde(default)]
    pub lazy: bool,
    #[serde(default)]
    pub synthetic: bool,
    /// Tag names, for runtime lookups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl From<&Definition> for ServicePlan {
    fn from(def: &Definition) -> Self {
        Self {
            class: def.class.clone(),
            factory: def.factory.clone(),
            arguments: def.arguments.clone(),
            calls: def.calls.clone(),
            properties: def.properties.clone(),
            public: def.public,
            shared: def.shared,
            lazy: def.lazy,
            synthetic: def.synthetic,
            tags: def.tags.keys().cloned().collect(),
        }
    }
}

/// Serialized output of a compilation, loaded by [`crate::runtime::Container`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledContainer {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub services: IndexMap<String, ServicePlan>,
    #[serde(default)]
    pub aliases: IndexMap<String, Alias>,
    #[serde(default)]
    pub parameters: IndexMap<String, Value>,
    /// Dependencies first; ties in registration order.
    pub construction_order: Vec<String>,
    #[serde(default)]
    pub proxies: Vec<ProxyDescriptor>,
    #[serde(default)]
    pub removed_ids: Vec<String>,
    #[serde(default)]
    pub fingerprint: Option<Fingerprint>,
}

impl CompiledContainer {
    pub fn from_frozen(frozen: &FrozenContainer) -> Self {
        let registry = frozen.registry();
        Self {
            version: ARTIFACT_VERSION,
            generated_at: frozen.compiled_at(),
            services: registry
                .definitions()
                .iter()
                .map(|(id, def)| (id.clone(), ServicePlan::from(def)))
                .collect(),
            aliases: registry.aliases().clone(),
            parameters: registry.parameters().all().clone(),
            construction_order: frozen.construction_order().to_vec(),
            proxies: frozen.proxies().to_vec(),
            removed_ids: frozen.removed_ids().to_vec(),
            fingerprint: frozen.fingerprint().cloned(),
        }
    }

    pub fn plan(&self, id: &str) -> Option<&ServicePlan> {
        self.services.get(id)
    }

    pub fn proxy(&self, id: &str) -> Option<&ProxyDescriptor> {
        self.proxies.iter().find(|p| p.id == id)
    }

    pub fn to_json(&self) -> DiResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(content: &str) -> DiResult<Self> {
        let artifact: Self = serde_json::from_str(content)?;
        artifact.check_version()
    }

    #[cfg(feature = "yaml")]
    pub fn to_yaml(&self) -> DiResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml(content: &str) -> DiResult<Self> {
        let artifact: Self = serde_yaml::from_str(content)?;
        artifact.check_version()
    }

    /// Parses `content`, picking the format from the extension of `path`
    /// (`.yaml`/`.yml` or JSON otherwise).
    pub fn parse(path: &Path, content: &str) -> DiResult<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            #[cfg(feature = "yaml")]
            Some("yaml" | "yml") => Self::from_yaml(content),
            _ => Self::from_json(content),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> DiResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| DiError::io(path, e))?;
        Self::parse(path, &content)
    }

    fn check_version(self) -> DiResult<Self> {
        if self.version != ARTIFACT_VERSION {
            return Err(DiError::Serialization(format!(
                "artifact version {} is not supported (expected {ARTIFACT_VERSION})",
                self.version
            )));
        }
        Ok(self)
    }
}
