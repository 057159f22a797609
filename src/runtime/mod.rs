//! Runtime container over a [`CompiledContainer`].
//!
//! The artifact says what to build; [`ServiceFactories`] say how to build
//! each class. Shared services are constructed at most once per container,
//! even when several threads request them at the same time.

mod factories;
mod service;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use crate::artifact::{CompiledContainer, ServicePlan};
use crate::definition::Factory;
use crate::error::{DiError, DiResult};
use crate::internal::ConstructionGuard;
use crate::parameter_bag::ParameterBag;
use crate::proxy::LazyProxy;
use crate::reference::Reference;
use crate::value::Value;

pub use factories::{FactoryFn, ServiceFactories};
pub use service::{downcast, unwrap_proxy, Argument, Arguments, AsAny, Instance, Service};

/// Container built from a compiled artifact.
///
/// Cloning is cheap and clones share every instance.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use di_compiler::runtime::{Container, Instance, Service, ServiceFactories};
/// use di_compiler::{ContainerBuilder, Definition, Reference};
///
/// struct Transport;
/// impl Service for Transport {}
///
/// struct Mailer {
///     _transport: Instance,
/// }
/// impl Service for Mailer {}
///
/// let mut builder = ContainerBuilder::new();
/// builder.register("transport", Definition::new("Transport"));
/// builder.register("mailer", Definition::new("Mailer").arg(Reference::new("transport")).public());
/// let artifact = builder.compile().unwrap().to_artifact();
///
/// let factories = ServiceFactories::new()
///     .with("Transport", |_| Ok(Arc::new(Transport) as Instance))
///     .with("Mailer", |args| Ok(Arc::new(Mailer { _transport: args.service(0)? }) as Instance));
///
/// let container = Container::new(artifact, factories);
/// let first = container.get("mailer").unwrap();
/// let second = container.get("mailer").unwrap();
/// assert!(Arc::ptr_eq(&first, &second));
/// assert!(container.get("transport").is_err()); // private
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

struct Inner {
    artifact: CompiledContainer,
    factories: ServiceFactories,
    parameters: ParameterBag,
    shared: HashMap<String, OnceCell<Instance>>,
    lazy_shared: HashMap<String, OnceCell<Instance>>,
    synthetic: RwLock<HashMap<String, Instance>>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("services", &self.inner.artifact.services.len())
            .field("initialized", &self.inner.shared.values().filter(|c| c.get().is_some()).count())
            .finish()
    }
}

impl Container {
    pub fn new(artifact: CompiledContainer, factories: ServiceFactories) -> Self {
        let shared = artifact
            .services
            .iter()
            .filter(|(_, plan)| plan.shared && !plan.synthetic)
            .map(|(id, _)| (id.clone(), OnceCell::new()))
            .collect();
        let lazy_shared = artifact
            .services
            .iter()
            .filter(|(_, plan)| plan.shared && plan.lazy)
            .map(|(id, _)| (id.clone(), OnceCell::new()))
            .collect();
        let parameters = artifact.parameters.clone().into_iter().collect();

        Self {
            inner: Arc::new(Inner {
                artifact,
                factories,
                parameters,
                shared,
                lazy_shared,
                synthetic: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// The public service `id`, constructing it (and its dependencies) on
    /// first use. Lazy services are returned as proxies.
    pub fn get(&self, id: &str) -> DiResult<Instance> {
        let id = self.public_id(id)?;
        self.inner.injectable(&id)
    }

    /// Whether `id` names a public service or public alias.
    pub fn has(&self, id: &str) -> bool {
        self.public_id(id).is_ok()
    }

    /// Whether the shared or synthetic service `id` already holds an instance.
    pub fn initialized(&self, id: &str) -> bool {
        let id = self.inner.resolve_alias(id);
        self.inner.shared.get(id).is_some_and(|cell| cell.get().is_some())
            || self.inner.synthetic.read().contains_key(id)
    }

    pub fn get_parameter(&self, name: &str) -> DiResult<&Value> {
        self.inner.parameters.get(name)
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.inner.parameters.has(name)
    }

    pub fn parameters(&self) -> &IndexMap<String, Value> {
        self.inner.parameters.all()
    }

    /// Provides the instance of a synthetic service.
    pub fn set(&self, id: &str, instance: Instance) -> DiResult<()> {
        let id = self.inner.resolve_alias(id).to_string();
        match self.inner.artifact.plan(&id) {
            Some(plan) if plan.synthetic => {
                tracing::debug!(service = %id, "synthetic service set");
                self.inner.synthetic.write().insert(id, instance);
                Ok(())
            }
            Some(_) => Err(DiError::invalid(id, "only synthetic services can be set at runtime")),
            None => Err(self.inner.not_found(&id)),
        }
    }

    /// Constructs every shared, non-lazy, public service in construction order.
    pub fn boot(&self) -> DiResult<usize> {
        let mut booted = 0;
        for id in &self.inner.artifact.construction_order {
            let Some(plan) = self.inner.artifact.plan(id) else {
                continue;
            };
            if plan.public && plan.shared && !plan.lazy && !plan.synthetic {
                self.inner.service(id)?;
                booted += 1;
            }
        }
        tracing::info!(services = booted, "container booted");
        Ok(booted)
    }

    /// Public service ids with the given tag, in registration order.
    pub fn tagged(&self, tag: &str) -> Vec<&str> {
        self.inner
            .artifact
            .services
            .iter()
            .filter(|(_, plan)| plan.public && plan.tags.iter().any(|t| t == tag))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn artifact(&self) -> &CompiledContainer {
        &self.inner.artifact
    }

    fn public_id(&self, id: &str) -> DiResult<String> {
        let artifact = &self.inner.artifact;
        let via_public_alias = match artifact.aliases.get(id) {
            Some(alias) if !alias.public => return Err(DiError::PrivateService { id: id.to_string() }),
            Some(alias) => {
                if let Some(message) = alias.deprecation_message(id) {
                    tracing::warn!(alias = %id, "{message}");
                }
                true
            }
            None => false,
        };
        let resolved = self.inner.resolve_alias(id);
        match artifact.plan(resolved) {
            Some(plan) if plan.public || via_public_alias => Ok(resolved.to_string()),
            Some(_) => Err(DiError::PrivateService { id: id.to_string() }),
            None => Err(self.inner.not_found(resolved)),
        }
    }
}

impl Inner {
    fn resolve_alias<'a>(&'a self, id: &'a str) -> &'a str {
        let mut current = id;
        for _ in 0..=self.artifact.aliases.len() {
            match self.artifact.aliases.get(current) {
                Some(alias) => current = &alias.target,
                None => break,
            }
        }
        current
    }

    fn not_found(&self, id: &str) -> DiError {
        if self.artifact.removed_ids.iter().any(|r| r == id) {
            DiError::RemovedService { id: id.to_string() }
        } else {
            DiError::not_found(id, None)
        }
    }

    /// What a consumer of `id` receives: a proxy for lazy services, the
    /// instance otherwise.
    fn injectable(self: &Arc<Self>, id: &str) -> DiResult<Instance> {
        let plan = self.plan(id)?;
        if !plan.lazy {
            return self.service(id);
        }
        match self.lazy_shared.get(id) {
            Some(cell) => cell.get_or_try_init(|| Ok(self.proxy(id))).cloned(),
            None => Ok(self.proxy(id)),
        }
    }

    fn proxy(self: &Arc<Self>, id: &str) -> Instance {
        let container: Weak<Inner> = Arc::downgrade(self);
        let target = id.to_string();
        Arc::new(LazyProxy::new(id, move || match container.upgrade() {
            Some(inner) => inner.service(&target),
            None => Err(DiError::ConstructionFailure {
                id: target.clone(),
                message: "the container was dropped".to_string(),
            }),
        }))
    }

    fn plan(&self, id: &str) -> DiResult<&ServicePlan> {
        self.artifact.plan(id).ok_or_else(|| self.not_found(id))
    }

    /// The real instance of `id`: memoized for shared services.
    fn service(self: &Arc<Self>, id: &str) -> DiResult<Instance> {
        let plan = self.plan(id)?;
        if plan.synthetic {
            return self
                .synthetic
                .read()
                .get(id)
                .cloned()
                .ok_or_else(|| DiError::not_found(id, None));
        }
        let Some(cell) = self.shared.get(id) else {
            return self.construct(id, plan);
        };
        if let Some(instance) = cell.get() {
            return Ok(Arc::clone(instance));
        }
        // This thread may be the one initializing the cell.
        ConstructionGuard::check(id)?;
        cell.get_or_try_init(|| self.construct(id, plan)).cloned()
    }

    fn construct(self: &Arc<Self>, id: &str, plan: &ServicePlan) -> DiResult<Instance> {
        let _guard = ConstructionGuard::enter(id)?;
        tracing::debug!(service = %id, "constructing service");

        let arguments = Arguments::new(id, self.resolve_all(id, &plan.arguments)?);
        let instance = match &plan.factory {
            Some(Factory::Class { class, method }) => {
                let name = format!("{class}::{method}");
                let factory = self.factories.get(&name).ok_or_else(|| missing_factory(id, &name))?;
                factory(arguments)?
            }
            Some(Factory::Service { service, method }) => {
                let factory = self.reference(service)?.ok_or_else(|| DiError::not_found(&service.id, Some(id)))?;
                factory.call(method, arguments)?.ok_or_else(|| DiError::ConstructionFailure {
                    id: id.to_string(),
                    message: format!("factory method {method}() of \"{}\" returned nothing", service.id),
                })?
            }
            None => {
                let class = plan
                    .class
                    .as_deref()
                    .ok_or_else(|| DiError::invalid(id, "the plan has neither a class nor a factory"))?;
                let factory = self.factories.get(class).ok_or_else(|| missing_factory(id, class))?;
                factory(arguments)?
            }
        };

        for (name, value) in &plan.properties {
            let value = self.resolve(id, value)?;
            instance.set_property(name, value)?;
        }
        for call in &plan.calls {
            let args = Arguments::new(id, self.resolve_all(id, &call.arguments)?);
            instance.call(&call.method, args)?;
        }
        Ok(instance)
    }

    fn resolve_all(self: &Arc<Self>, id: &str, values: &[Value]) -> DiResult<Vec<Argument>> {
        values.iter().map(|v| self.resolve(id, v)).collect()
    }

    fn resolve(self: &Arc<Self>, id: &str, value: &Value) -> DiResult<Argument> {
        Ok(match value {
            Value::Null => Argument::Null,
            Value::Bool(b) => Argument::Bool(*b),
            Value::Int(i) => Argument::Int(*i),
            Value::Float(x) => Argument::Float(*x),
            Value::String(s) => Argument::String(s.clone()),
            Value::List(items) => Argument::List(self.resolve_all(id, items)?),
            Value::Map(map) => Argument::Map(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.resolve(id, v)?)))
                    .collect::<DiResult<_>>()?,
            ),
            Value::Reference(reference) => match self.reference(reference)? {
                Some(instance) => Argument::Service(instance),
                None => Argument::Null,
            },
            Value::Tagged(collection) => {
                return Err(DiError::invalid(
                    id,
                    format!("tagged collection \"{}\" was not resolved at compile time", collection.tag),
                ))
            }
        })
    }

    /// `None` when an optional reference points at a missing service.
    fn reference(self: &Arc<Self>, reference: &Reference) -> DiResult<Option<Instance>> {
        let target = self.resolve_alias(&reference.id).to_string();
        if self.artifact.plan(&target).is_none() {
            return match reference.is_required() {
                true => Err(self.not_found(&target)),
                false => Ok(None),
            };
        }
        if reference.deferred {
            tracing::trace!(service = %target, "injecting deferred proxy");
            return Ok(Some(self.proxy(&target)));
        }
        self.injectable(&target).map(Some)
    }
}

fn missing_factory(id: &str, name: &str) -> DiError {
    DiError::ConstructionFailure {
        id: id.to_string(),
        message: format!("no factory registered for \"{name}\""),
    }
}
