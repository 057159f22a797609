//! What the runtime hands out and what factories receive.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{DiError, DiResult};
use crate::proxy::LazyProxy;

/// Type erasure helper implemented for every `Send + Sync` type.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// An object managed by the container.
///
/// Method calls and property assignments from definitions are dispatched by
/// name; the defaults reject them. Services are shared behind `Arc`, so
/// implementations that accept calls use interior mutability.
///
/// # Examples
///
/// ```rust
/// use di_compiler::runtime::{Arguments, Instance, Service};
/// use di_compiler::DiResult;
/// use parking_lot::Mutex;
///
/// #[derive(Default)]
/// struct Dispatcher {
///     listeners: Mutex<Vec<Instance>>,
/// }
///
/// impl Service for Dispatcher {
///     fn call(&self, method: &str, args: Arguments) -> DiResult<Option<Instance>> {
///         match method {
///             "addListener" => {
///                 self.listeners.lock().push(args.service(0)?);
///                 Ok(None)
///             }
///             other => Err(args.unsupported(other)),
///         }
///     }
/// }
/// ```
pub trait Service: AsAny {
    /// Invokes `method`. Factory methods return the produced instance.
    fn call(&self, method: &str, args: Arguments) -> DiResult<Option<Instance>> {
        Err(args.unsupported(method))
    }

    fn set_property(&self, name: &str, _value: Argument) -> DiResult<()> {
        Err(DiError::ConstructionFailure {
            id: std::any::type_name::<Self>().to_string(),
            message: format!("property \"{name}\" cannot be set"),
        })
    }
}

/// A shared service instance.
pub type Instance = Arc<dyn Service>;

impl fmt::Debug for dyn Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_any().downcast_ref::<LazyProxy>() {
            Some(proxy) => fmt::Debug::fmt(proxy, f),
            None => f.write_str("Service"),
        }
    }
}

/// Looks through lazy proxies, constructing their targets when needed.
pub fn unwrap_proxy(instance: &Instance) -> DiResult<Instance> {
    let mut current = Arc::clone(instance);
    loop {
        let next = match current.as_ref().as_any().downcast_ref::<LazyProxy>() {
            Some(proxy) => Arc::clone(proxy.target()?),
            None => return Ok(current),
        };
        current = next;
    }
}

/// The concrete `T` behind `instance`, looking through proxies.
/// `Ok(None)` when the service is of another type.
pub fn downcast<T: Any + Send + Sync>(instance: &Instance) -> DiResult<Option<Arc<T>>> {
    Ok(unwrap_proxy(instance)?.into_any().downcast::<T>().ok())
}

/// A value passed to a factory, method call or property at runtime.
#[derive(Clone)]
pub enum Argument {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Argument>),
    Map(IndexMap<String, Argument>),
    Service(Instance),
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Null => f.write_str("Null"),
            Argument::Bool(b) => write!(f, "Bool({b})"),
            Argument::Int(i) => write!(f, "Int({i})"),
            Argument::Float(x) => write!(f, "Float({x})"),
            Argument::String(s) => write!(f, "String({s:?})"),
            Argument::List(items) => f.debug_list().entries(items).finish(),
            Argument::Map(map) => f.debug_map().entries(map).finish(),
            Argument::Service(s) => write!(f, "Service({s:?})"),
        }
    }
}

impl Argument {
    pub fn type_name(&self) -> &'static str {
        match self {
            Argument::Null => "null",
            Argument::Bool(_) => "bool",
            Argument::Int(_) => "int",
            Argument::Float(_) => "float",
            Argument::String(_) => "string",
            Argument::List(_) => "list",
            Argument::Map(_) => "map",
            Argument::Service(_) => "service",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Argument::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Argument::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Argument::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Argument::Float(x) => Some(*x),
            Argument::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Argument::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_service(&self) -> Option<&Instance> {
        match self {
            Argument::Service(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Argument]> {
        match self {
            Argument::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Positional arguments for one factory or method invocation, with typed
/// accessors that report failures against the service being built.
#[derive(Debug, Clone)]
pub struct Arguments {
    service: String,
    values: Vec<Argument>,
}

impl Arguments {
    pub fn new(service: impl Into<String>, values: Vec<Argument>) -> Self {
        Self {
            service: service.into(),
            values,
        }
    }

    /// Id of the service being constructed.
    pub fn service_id(&self) -> &str {
        &self.service
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> DiResult<&Argument> {
        self.values
            .get(index)
            .ok_or_else(|| self.failure(format!("argument #{index} is missing")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.values.iter()
    }

    pub fn into_vec(self) -> Vec<Argument> {
        self.values
    }

    pub fn service(&self, index: usize) -> DiResult<Instance> {
        match self.get(index)? {
            Argument::Service(s) => Ok(Arc::clone(s)),
            other => Err(self.mismatch(index, "service", other)),
        }
    }

    /// A service argument that may have been replaced by `null`.
    pub fn optional_service(&self, index: usize) -> DiResult<Option<Instance>> {
        match self.values.get(index) {
            None | Some(Argument::Null) => Ok(None),
            Some(Argument::Service(s)) => Ok(Some(Arc::clone(s))),
            Some(other) => Err(self.mismatch(index, "service", other)),
        }
    }

    /// The concrete `T` behind a service argument, looking through proxies.
    ///
    /// Forcing a deferred argument this way during construction defeats the
    /// proxy; keep the [`Instance`] instead when the argument may be deferred.
    pub fn typed<T: Any + Send + Sync>(&self, index: usize) -> DiResult<Arc<T>> {
        let instance = self.service(index)?;
        downcast::<T>(&instance)?.ok_or_else(|| {
            self.failure(format!(
                "argument #{index} is not a {}",
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn string(&self, index: usize) -> DiResult<String> {
        match self.get(index)? {
            Argument::String(s) => Ok(s.clone()),
            other => Err(self.mismatch(index, "string", other)),
        }
    }

    pub fn int(&self, index: usize) -> DiResult<i64> {
        let arg = self.get(index)?;
        arg.as_i64().ok_or_else(|| self.mismatch(index, "int", arg))
    }

    pub fn float(&self, index: usize) -> DiResult<f64> {
        let arg = self.get(index)?;
        arg.as_f64().ok_or_else(|| self.mismatch(index, "float", arg))
    }

    pub fn bool(&self, index: usize) -> DiResult<bool> {
        let arg = self.get(index)?;
        arg.as_bool().ok_or_else(|| self.mismatch(index, "bool", arg))
    }

    /// Error for a method the receiving service does not implement.
    pub fn unsupported(&self, method: &str) -> DiError {
        self.failure(format!("method {method}() is not supported"))
    }

    pub fn failure(&self, message: impl Into<String>) -> DiError {
        DiError::ConstructionFailure {
            id: self.service.clone(),
            message: message.into(),
        }
    }

    fn mismatch(&self, index: usize, expected: &str, given: &Argument) -> DiError {
        self.failure(format!(
            "argument #{index} must be a {expected}, {} given",
            given.type_name()
        ))
    }
}
