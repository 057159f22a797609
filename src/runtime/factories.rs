use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::DiResult;
use crate::runtime::{Arguments, Instance};

/// Builds an instance from resolved constructor arguments.
pub type FactoryFn = Arc<dyn Fn(Arguments) -> DiResult<Instance> + Send + Sync>;

/// Constructors available to the runtime, keyed by class name for plain
/// classes and by `Class::method` for static factories.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use di_compiler::runtime::{Instance, Service, ServiceFactories};
///
/// struct Clock;
/// impl Service for Clock {}
///
/// let factories = ServiceFactories::new()
///     .with("Clock", |_args| Ok(Arc::new(Clock) as Instance))
///     .with("Clock::utc", |_args| Ok(Arc::new(Clock) as Instance));
///
/// assert!(factories.contains("Clock::utc"));
/// assert_eq!(factories.len(), 2);
/// ```
#[derive(Clone, Default)]
pub struct ServiceFactories {
    factories: HashMap<String, FactoryFn>,
}

impl fmt::Debug for ServiceFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("ServiceFactories").field("names", &names).finish()
    }
}

impl ServiceFactories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(Arguments) -> DiResult<Instance> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(Arguments) -> DiResult<Instance> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FactoryFn> {
        self.factories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn extend(&mut self, other: ServiceFactories) {
        self.factories.extend(other.factories);
    }
}
