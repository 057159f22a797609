//! Build-time registration API.
//!
//! [`ContainerBuilder`] collects definitions, aliases, parameters and
//! resources, then [`ContainerBuilder::compile`] consumes it and returns a
//! [`FrozenContainer`]. Nothing can be registered after that point: the
//! builder no longer exists.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::alias::Alias;
use crate::artifact::CompiledContainer;
use crate::compiler::{Compiler, CompilerPass, PassConfig, PassPhase};
use crate::config::CompilerConfig;
use crate::definition::Definition;
use crate::dumper::{ArtifactDumper, Dumper};
use crate::error::DiResult;
use crate::graph::{GraphBuilder, ServiceGraph};
use crate::parameter_bag::ParameterBag;
use crate::proxy::{ProxyDescriptor, ProxyGenerator};
use crate::registry::Registry;
use crate::resource::{Fingerprint, Resource, ResourceTracker};
use crate::runtime::{Container, ServiceFactories};
use crate::types::{ClassCatalog, ClassInfo};
use crate::value::Value;

/// A reusable bundle of registrations.
///
/// # Examples
///
/// ```rust
/// use di_compiler::{ContainerBuilder, Definition, DiResult, Extension, Reference};
///
/// struct MailerExtension {
///     sender: String,
/// }
///
/// impl Extension for MailerExtension {
///     fn load(self, builder: &mut ContainerBuilder) -> DiResult<()> {
///         builder.set_parameter("mailer.sender", self.sender);
///         builder.register("transport", Definition::new("SmtpTransport"));
///         builder.register(
///             "mailer",
///             Definition::new("Mailer")
///                 .arg(Reference::new("transport"))
///                 .arg("%mailer.sender%")
///                 .public(),
///         );
///         Ok(())
///     }
/// }
///
/// # fn main() -> DiResult<()> {
/// let mut builder = ContainerBuilder::new();
/// builder.extend(MailerExtension { sender: "noreply@example.com".into() })?;
/// let frozen = builder.compile()?;
/// assert_eq!(
///     frozen.registry().definition("mailer").unwrap().arguments[1],
///     "noreply@example.com".into()
/// );
/// # Ok(())
/// # }
/// ```
pub trait Extension {
    fn load(self, builder: &mut ContainerBuilder) -> DiResult<()>;
}

struct UserPass {
    pass: Box<dyn CompilerPass>,
    phase: PassPhase,
    priority: i32,
}

/// Mutable container description, consumed by [`ContainerBuilder::compile`].
#[derive(Default)]
pub struct ContainerBuilder {
    registry: Registry,
    config: CompilerConfig,
    catalog: ClassCatalog,
    passes: Vec<UserPass>,
    resources: ResourceTracker,
}

impl fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("definitions", &self.registry.definitions().len())
            .field("aliases", &self.registry.aliases().len())
            .field("passes", &self.passes.len())
            .field("resources", &self.resources.len())
            .finish()
    }
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CompilerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Registers or replaces the definition for `id`.
    pub fn register(&mut self, id: impl Into<String>, definition: Definition) -> &mut Definition {
        self.registry.register(id, definition)
    }

    pub fn set_alias(&mut self, id: impl Into<String>, alias: impl Into<Alias>) -> &mut Alias {
        self.registry.alias(id, alias)
    }

    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.registry.parameters_mut().set(name, value);
    }

    pub fn parameters(&self) -> &ParameterBag {
        self.registry.parameters()
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterBag {
        self.registry.parameters_mut()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Declares a class for type checking and proxy interfaces.
    pub fn declare_class(&mut self, info: ClassInfo) -> &mut Self {
        self.catalog.declare(info);
        self
    }

    pub fn catalog_mut(&mut self) -> &mut ClassCatalog {
        &mut self.catalog
    }

    /// Adds a pass on top of the built-in pipeline. At equal phase and
    /// priority it runs after the built-in passes, in insertion order.
    pub fn add_pass(&mut self, pass: impl CompilerPass + 'static, phase: PassPhase, priority: i32) -> &mut Self {
        self.passes.push(UserPass {
            pass: Box::new(pass),
            phase,
            priority,
        });
        self
    }

    /// Tracks `resource` when resource tracking is enabled; returns whether
    /// it was newly tracked.
    pub fn add_resource(&mut self, resource: Resource) -> bool {
        if !self.config.track_resources {
            return false;
        }
        self.resources.track(resource)
    }

    pub fn is_tracking_resources(&self) -> bool {
        self.config.track_resources
    }

    pub fn resources(&self) -> &ResourceTracker {
        &self.resources
    }

    pub fn extend(&mut self, extension: impl Extension) -> DiResult<&mut Self> {
        extension.load(self)?;
        Ok(self)
    }

    /// Copies everything from `other` into this builder. Later entries win.
    pub fn merge(&mut self, other: ContainerBuilder) -> &mut Self {
        let ContainerBuilder {
            registry,
            catalog,
            passes,
            resources,
            ..
        } = other;

        for (id, definition) in registry.definitions() {
            self.registry.register(id.clone(), definition.clone());
        }
        for (id, alias) in registry.aliases() {
            self.registry.alias(id.clone(), alias.clone());
        }
        for (name, value) in registry.parameters().all() {
            self.registry.parameters_mut().set(name.clone(), value.clone());
        }
        self.catalog.merge(catalog);
        self.passes.extend(passes);
        if self.config.track_resources {
            self.resources.merge(resources);
        }
        self
    }

    /// Runs the pass pipeline and freezes the result.
    ///
    /// On failure the builder is gone along with its registrations; a
    /// previously compiled container stays whatever it was.
    pub fn compile(self) -> DiResult<FrozenContainer> {
        let ContainerBuilder {
            mut registry,
            config,
            catalog,
            passes,
            resources,
        } = self;

        let mut pipeline = PassConfig::defaults(&config);
        for user in passes {
            pipeline.add_boxed(user.pass, user.phase, user.priority);
        }

        let mut compiler = Compiler::new(pipeline);
        compiler.compile(&mut registry, &config, &catalog)?;

        let graph = GraphBuilder::new().build(&registry)?;
        let construction_order = graph.construction_order()?;
        let proxies = ProxyGenerator::new(&catalog).generate(&registry)?;

        let compiled_at = Utc::now();
        let fingerprint = if config.track_resources {
            Some(resources.compute_fingerprint_at(compiled_at)?)
        } else {
            None
        };

        tracing::info!(
            services = registry.definitions().len(),
            aliases = registry.aliases().len(),
            proxies = proxies.len(),
            removed = compiler.removed_ids().len(),
            resources = resources.len(),
            "container compiled"
        );

        Ok(FrozenContainer {
            log: compiler.log().to_vec(),
            removed_ids: compiler.removed_ids().to_vec(),
            registry,
            config,
            catalog,
            graph,
            construction_order,
            proxies,
            fingerprint,
            compiled_at,
        })
    }
}

/// The compiled, read-only registry and everything derived from it.
#[derive(Debug, Clone)]
pub struct FrozenContainer {
    registry: Registry,
    config: CompilerConfig,
    catalog: ClassCatalog,
    graph: ServiceGraph,
    construction_order: Vec<String>,
    proxies: Vec<ProxyDescriptor>,
    removed_ids: Vec<String>,
    fingerprint: Option<Fingerprint>,
    log: Vec<String>,
    compiled_at: DateTime<Utc>,
}

impl FrozenContainer {
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    /// Dependency graph of the final registry.
    pub fn graph(&self) -> &ServiceGraph {
        &self.graph
    }

    /// Dependencies first; ties in registration order.
    pub fn construction_order(&self) -> &[String] {
        &self.construction_order
    }

    pub fn proxies(&self) -> &[ProxyDescriptor] {
        &self.proxies
    }

    pub fn removed_ids(&self) -> &[String] {
        &self.removed_ids
    }

    /// `None` when resource tracking was disabled.
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    /// Compiler log, one `PassName: message` line per pass action.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    pub fn compiled_at(&self) -> DateTime<Utc> {
        self.compiled_at
    }

    pub fn to_artifact(&self) -> CompiledContainer {
        CompiledContainer::from_frozen(self)
    }

    pub fn dump(&self, dumper: &dyn Dumper) -> DiResult<String> {
        dumper.dump(self)
    }

    /// The artifact in the configured `dump_format`.
    pub fn dump_artifact(&self) -> DiResult<String> {
        ArtifactDumper::from_config(&self.config).dump(self)
    }

    /// A runtime container over this compilation.
    pub fn into_container(self, factories: ServiceFactories) -> Container {
        Container::new(self.to_artifact(), factories)
    }
}
