//! Dumpers turn a [`FrozenContainer`] into text.
//!
//! [`ArtifactDumper`] writes the loadable [`CompiledContainer`](crate::artifact::CompiledContainer);
//! [`DotDumper`] renders the dependency graph for Graphviz.

mod artifact;
mod dot;

pub use artifact::ArtifactDumper;
pub use dot::DotDumper;

use crate::builder::FrozenContainer;
use crate::error::DiResult;

/// Serializes a frozen container.
pub trait Dumper {
    fn dump(&self, frozen: &FrozenContainer) -> DiResult<String>;
}
