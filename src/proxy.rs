//! Lazy proxies.
//!
//! At compile time [`ProxyGenerator`] describes which services need a
//! stand-in and which contract it exposes. At runtime [`LazyProxy`] is that
//! stand-in: it does nothing until the first operation, then constructs the
//! real service once and forwards to it.

use std::fmt;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::definition::Definition;
use crate::error::{DiError, DiResult};
use crate::graph::slot_references;
use crate::registry::Registry;
use crate::runtime::{Argument, Arguments, Instance, Service};
use crate::types::ClassCatalog;

/// Why a service is proxied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyReason {
    /// The definition is marked lazy: every consumer gets a proxy.
    Explicit,
    /// Only the slots deferred by the circular reference check get a proxy.
    CycleBreak,
}

/// The contract a proxy must expose for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyDescriptor {
    pub id: String,
    pub class: Option<String>,
    /// Every declared parent class and interface of `class`.
    #[serde(default)]
    pub interfaces: Vec<String>,
    pub reason: ProxyReason,
}

/// Builds [`ProxyDescriptor`]s from definitions.
#[derive(Debug, Clone, Copy)]
pub struct ProxyGenerator<'a> {
    catalog: &'a ClassCatalog,
}

impl<'a> ProxyGenerator<'a> {
    pub fn new(catalog: &'a ClassCatalog) -> Self {
        Self { catalog }
    }

    /// Describes the proxy for `id`: explicit for lazy definitions, a cycle
    /// break otherwise.
    pub fn wrap(&self, id: &str, definition: &Definition) -> ProxyDescriptor {
        let reason = if definition.lazy {
            ProxyReason::Explicit
        } else {
            ProxyReason::CycleBreak
        };
        let interfaces = definition
            .class
            .as_deref()
            .map(|class| self.catalog.ancestors(class))
            .unwrap_or_default();
        ProxyDescriptor {
            id: id.to_string(),
            class: definition.class.clone(),
            interfaces,
            reason,
        }
    }

    /// One descriptor per proxied service, in registration order: every lazy
    /// definition and every target of a deferred reference.
    pub fn generate(&self, registry: &Registry) -> DiResult<Vec<ProxyDescriptor>> {
        let mut deferred_targets: Vec<String> = Vec::new();
        for def in registry.definitions().values() {
            for (_, _, reference) in slot_references(def) {
                if reference.deferred {
                    let target = registry.resolve_id(&reference.id)?;
                    if !deferred_targets.iter().any(|t| t == target) {
                        deferred_targets.push(target.to_string());
                    }
                }
            }
        }

        Ok(registry
            .definitions()
            .iter()
            .filter(|(id, def)| def.lazy || deferred_targets.contains(*id))
            .map(|(id, def)| self.wrap(id, def))
            .collect())
    }
}

type Init = Box<dyn Fn() -> DiResult<Instance> + Send + Sync>;

/// Runtime stand-in for a service that is constructed on first use.
///
/// The target is built at most once: concurrent first uses block on the
/// same initialization. A failed construction is not cached, the next use
/// retries.
///
/// # Examples
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use di_compiler::runtime::{Instance, Service};
/// use di_compiler::LazyProxy;
///
/// struct Counter;
/// impl Service for Counter {}
///
/// let built = Arc::new(AtomicUsize::new(0));
/// let seen = built.clone();
/// let proxy = LazyProxy::new("counter", move || {
///     seen.fetch_add(1, Ordering::SeqCst);
///     Ok(Arc::new(Counter) as Instance)
/// });
///
/// assert!(!proxy.is_initialized());
/// proxy.target().unwrap();
/// proxy.target().unwrap();
/// assert_eq!(built.load(Ordering::SeqCst), 1);
/// ```
pub struct LazyProxy {
    id: String,
    cell: OnceCell<Instance>,
    init: Init,
}

impl LazyProxy {
    pub fn new(id: impl Into<String>, init: impl Fn() -> DiResult<Instance> + Send + Sync + 'static) -> Self {
        Self {
            id: id.into(),
            cell: OnceCell::new(),
            init: Box::new(init),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The real service, constructing it on first call.
    pub fn target(&self) -> DiResult<&Instance> {
        self.cell.get_or_try_init(|| {
            tracing::debug!(service = %self.id, "initializing lazy proxy");
            (self.init)().map_err(|source| DiError::ProxyConstructionFailure {
                id: self.id.clone(),
                source: Box::new(source),
            })
        })
    }
}

impl fmt::Debug for LazyProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyProxy")
            .field("id", &self.id)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl Service for LazyProxy {
    fn call(&self, method: &str, args: Arguments) -> DiResult<Option<Instance>> {
        self.target()?.call(method, args)
    }

    fn set_property(&self, name: &str, value: Argument) -> DiResult<()> {
        self.target()?.set_property(name, value)
    }
}
