//! # di-compiler
//!
//! A service-container compiler: declare services once, compile them into a
//! frozen, validated artifact, then construct them on demand at runtime.
//!
//! ## Features
//!
//! - **Declarative definitions**: classes, factories, constructor arguments,
//!   method calls, properties, tags and decorators
//! - **Parameters**: `%name%` placeholders resolved at compile time, with
//!   cycle detection and `%%` escaping
//! - **Pass pipeline**: ordered, named compiler passes that never partially apply
//! - **Cycle breaking**: setter and property cycles are deferred behind lazy
//!   proxies, constructor-only cycles fail with the full path
//! - **Freshness tracking**: cached artifacts are rebuilt when a tracked file,
//!   directory or parameter changes
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use di_compiler::runtime::{downcast, Arguments, Instance, Service, ServiceFactories};
//! use di_compiler::{ContainerBuilder, Definition, DiResult, Reference};
//! use parking_lot::Mutex;
//!
//! struct A {
//!     b: Instance,
//! }
//! impl Service for A {}
//!
//! #[derive(Default)]
//! struct B {
//!     a: Mutex<Option<Instance>>,
//! }
//! impl Service for B {
//!     fn call(&self, method: &str, args: Arguments) -> DiResult<Option<Instance>> {
//!         match method {
//!             "setA" => {
//!                 *self.a.lock() = Some(args.service(0)?);
//!                 Ok(None)
//!             }
//!             other => Err(args.unsupported(other)),
//!         }
//!     }
//! }
//!
//! // a needs b to be built, b only needs a afterwards: the setter is deferred.
//! let mut builder = ContainerBuilder::new();
//! builder.register("a", Definition::new("A").arg(Reference::new("b")).public());
//! builder.register("b", Definition::new("B").call("setA", vec![Reference::new("a").into()]));
//! let frozen = builder.compile().unwrap();
//! assert_eq!(frozen.construction_order(), ["b", "a"]);
//!
//! let factories = ServiceFactories::new()
//!     .with("A", |args| Ok(Arc::new(A { b: args.service(0)? }) as Instance))
//!     .with("B", |_| Ok(Arc::new(B::default()) as Instance));
//! let container = frozen.into_container(factories);
//!
//! let a = container.get("a").unwrap();
//! let a = downcast::<A>(&a).unwrap().unwrap();
//! let b = downcast::<B>(&a.b).unwrap().unwrap();
//! assert!(b.a.lock().is_some());
//! ```
//!
//! ## Cargo features
//!
//! - `yaml` (default): YAML service files and YAML artifacts

pub mod alias;
pub mod artifact;
pub mod builder;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod definition;
pub mod dumper;
pub mod error;
pub mod graph;
pub mod loader;
pub mod parameter_bag;
pub mod proxy;
pub mod reference;
pub mod registry;
pub mod resource;
pub mod runtime;
pub mod types;
pub mod value;

mod internal;

pub use alias::Alias;
pub use artifact::{CompiledContainer, ServicePlan, ARTIFACT_VERSION};
pub use builder::{ContainerBuilder, Extension, FrozenContainer};
pub use cache::{ConfigCache, ContainerCache};
pub use compiler::{CompilationContext, Compiler, CompilerPass, PassConfig, PassPhase};
pub use config::{CompilerConfig, DumpFormat};
pub use definition::{Decoration, Definition, Factory, MethodCall, TagAttributes};
pub use dumper::{ArtifactDumper, DotDumper, Dumper};
pub use error::{DiError, DiResult};
pub use graph::{Edge, EdgeKind, GraphBuilder, ServiceGraph, Slot};
pub use loader::{FileFormat, FileLoader};
pub use parameter_bag::ParameterBag;
pub use proxy::{LazyProxy, ProxyDescriptor, ProxyGenerator, ProxyReason};
pub use reference::{InvalidBehavior, Reference};
pub use registry::Registry;
pub use resource::{Fingerprint, FreshnessContext, Resource, ResourceTracker};
pub use runtime::{Container, Instance, Service, ServiceFactories};
pub use types::{ClassCatalog, ClassInfo, ParamDecl, ParamType};
pub use value::{TaggedCollection, Value};
