//! Reference resolution: turns the registry into a directed service graph.
//!
//! Nodes are definition ids, edges are the references found while walking a
//! definition's factory, constructor arguments, method calls and properties.
//! Every edge remembers the exact slot it came from, so analyses can report
//! actionable errors and passes can rewrite that single slot afterwards.

use std::collections::VecDeque;
use std::fmt;

use indexmap::IndexMap;

use crate::definition::{Definition, Factory};
use crate::error::{DiError, DiResult};
use crate::reference::{InvalidBehavior, Reference};
use crate::registry::Registry;
use crate::value::Value;

/// How the dependent consumes the referenced service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Needed before the dependent exists.
    Constructor,
    /// The factory service producing the dependent.
    Factory,
    /// Injected through a method call after construction.
    MethodCall,
    /// Assigned to a property after construction.
    Property,
}

impl EdgeKind {
    /// Whether the edge can be satisfied after the dependent is constructed.
    pub fn is_deferrable(self) -> bool {
        matches!(self, EdgeKind::MethodCall | EdgeKind::Property)
    }
}

/// Top-level slot of a definition holding a reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    Factory,
    Argument(usize),
    Call {
        index: usize,
        method: String,
        argument: usize,
    },
    Property(String),
}

impl Slot {
    pub fn kind(&self) -> EdgeKind {
        match self {
            Slot::Factory => EdgeKind::Factory,
            Slot::Argument(_) => EdgeKind::Constructor,
            Slot::Call { .. } => EdgeKind::MethodCall,
            Slot::Property(_) => EdgeKind::Property,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Factory => write!(f, "factory"),
            Slot::Argument(i) => write!(f, "argument #{i}"),
            Slot::Call { method, argument, .. } => write!(f, "argument #{argument} of method call {method}()"),
            Slot::Property(name) => write!(f, "property \"{name}\""),
        }
    }
}

/// Position inside a list or map nested in a slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    Index(usize),
    Key(String),
}

/// One reference from `from` to `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    /// Concrete target id; aliases are already resolved.
    pub to: String,
    pub slot: Slot,
    pub path: Vec<PathStep>,
    pub kind: EdgeKind,
    pub behavior: InvalidBehavior,
    /// The slot already receives a lazy proxy.
    pub deferred: bool,
    /// The target is explicitly lazy, so the dependent only ever sees a proxy.
    pub lazy_target: bool,
}

impl Edge {
    /// Whether `to` must be fully constructed before `from` can be.
    pub fn is_construction_edge(&self) -> bool {
        !self.deferred && !self.lazy_target
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub class: Option<String>,
    pub public: bool,
    pub lazy: bool,
    pub shared: bool,
    pub synthetic: bool,
    pub outgoing: Vec<usize>,
}

/// Directed graph over definition ids with annotated edges.
#[derive(Debug, Clone, Default)]
pub struct ServiceGraph {
    nodes: IndexMap<String, Node>,
    edges: Vec<Edge>,
}

impl ServiceGraph {
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, index: usize) -> Option<&Edge> {
        self.edges.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = (usize, &Edge)> {
        self.nodes
            .get(id)
            .into_iter()
            .flat_map(|node| node.outgoing.iter())
            .map(move |&i| (i, &self.edges[i]))
    }

    /// Kahn topological order over construction edges: every dependency
    /// precedes its dependents. Ties follow registration order.
    ///
    /// Fails with `FatalCircularReference` when construction edges still form
    /// a cycle, which the circular reference check normally rules out.
    pub fn construction_order(&self) -> DiResult<Vec<String>> {
        let index_of = |id: &str| self.nodes.get_index_of(id);
        let mut pending: Vec<usize> = vec![0; self.nodes.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];

        for edge in self.edges.iter().filter(|e| e.is_construction_edge() && e.from != e.to) {
            if let (Some(from), Some(to)) = (index_of(&edge.from), index_of(&edge.to)) {
                pending[from] += 1;
                dependents[to].push(from);
            }
        }
        if let Some(edge) = self.edges.iter().find(|e| e.is_construction_edge() && e.from == e.to) {
            return Err(DiError::FatalCircularReference {
                chain: vec![edge.from.clone(), edge.to.clone()],
            });
        }

        // kept sorted by registration index
        let mut ready: VecDeque<usize> = (0..self.nodes.len()).filter(|&i| pending[i] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(next) = ready.pop_front() {
            order.push(next);
            let mut released = Vec::new();
            for &dependent in &dependents[next] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    released.push(dependent);
                }
            }
            released.sort_unstable();
            for idx in released {
                let pos = ready.partition_point(|&queued| queued < idx);
                ready.insert(pos, idx);
            }
        }

        if order.len() != self.nodes.len() {
            let stuck: Vec<String> = (0..self.nodes.len())
                .filter(|&i| pending[i] > 0)
                .filter_map(|i| self.nodes.get_index(i).map(|(id, _)| id.clone()))
                .collect();
            return Err(DiError::FatalCircularReference { chain: stuck });
        }

        Ok(order
            .into_iter()
            .filter_map(|i| self.nodes.get_index(i).map(|(id, _)| id.clone()))
            .collect())
    }
}

/// Builds a [`ServiceGraph`] from a registry.
///
/// References to aliases are resolved to their concrete target first.
/// A missing target fails with `ServiceNotFound` when the reference is
/// required; `null`/`ignore` references to missing targets produce no edge.
#[derive(Debug, Default)]
pub struct GraphBuilder;

impl GraphBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, registry: &Registry) -> DiResult<ServiceGraph> {
        let mut graph = ServiceGraph::default();
        for (id, def) in registry.definitions() {
            graph.nodes.insert(
                id.clone(),
                Node {
                    id: id.clone(),
                    class: def.class.clone(),
                    public: def.public,
                    lazy: def.lazy,
                    shared: def.shared,
                    synthetic: def.synthetic,
                    outgoing: Vec::new(),
                },
            );
        }

        for (id, def) in registry.definitions() {
            for (slot, path, reference) in slot_references(def) {
                let target = registry.resolve_id(&reference.id)?;
                let Some(target_def) = registry.definition(target) else {
                    if reference.is_required() {
                        return Err(DiError::not_found(target, Some(id.as_str())));
                    }
                    continue;
                };
                let edge = Edge {
                    from: id.clone(),
                    to: target.to_string(),
                    kind: slot.kind(),
                    slot,
                    path,
                    behavior: reference.behavior,
                    deferred: reference.deferred,
                    lazy_target: target_def.lazy,
                };
                let index = graph.edges.len();
                if let Some(node) = graph.nodes.get_mut(id) {
                    node.outgoing.push(index);
                }
                graph.edges.push(edge);
            }
        }

        tracing::debug!(nodes = graph.nodes.len(), edges = graph.edges.len(), "service graph built");
        Ok(graph)
    }
}

/// Every reference of `def` with its slot and nested path, in declaration order:
/// factory, constructor arguments, method calls, properties.
pub fn slot_references(def: &Definition) -> Vec<(Slot, Vec<PathStep>, &Reference)> {
    let mut out = Vec::new();
    if let Some(Factory::Service { service, .. }) = &def.factory {
        out.push((Slot::Factory, Vec::new(), service));
    }
    for (i, arg) in def.arguments.iter().enumerate() {
        collect(arg, &Slot::Argument(i), &mut Vec::new(), &mut out);
    }
    for (index, call) in def.calls.iter().enumerate() {
        for (argument, arg) in call.arguments.iter().enumerate() {
            let slot = Slot::Call {
                index,
                method: call.method.clone(),
                argument,
            };
            collect(arg, &slot, &mut Vec::new(), &mut out);
        }
    }
    for (name, value) in &def.properties {
        collect(value, &Slot::Property(name.clone()), &mut Vec::new(), &mut out);
    }
    out
}

fn collect<'a>(
    value: &'a Value,
    slot: &Slot,
    path: &mut Vec<PathStep>,
    out: &mut Vec<(Slot, Vec<PathStep>, &'a Reference)>,
) {
    match value {
        Value::Reference(r) => out.push((slot.clone(), path.clone(), r)),
        Value::List(items) => {
            for (i, item) in items.iter().enumerate() {
                path.push(PathStep::Index(i));
                collect(item, slot, path, out);
                path.pop();
            }
        }
        Value::Map(map) => {
            for (key, item) in map {
                path.push(PathStep::Key(key.clone()));
                collect(item, slot, path, out);
                path.pop();
            }
        }
        _ => {}
    }
}

/// The reference stored at `slot`/`path` of `def`, for in-place rewriting.
pub fn reference_at_mut<'a>(def: &'a mut Definition, slot: &Slot, path: &[PathStep]) -> Option<&'a mut Reference> {
    let root: &mut Value = match slot {
        Slot::Factory => {
            return match &mut def.factory {
                Some(Factory::Service { service, .. }) if path.is_empty() => Some(service),
                _ => None,
            };
        }
        Slot::Argument(i) => def.arguments.get_mut(*i)?,
        Slot::Call { index, argument, .. } => def.calls.get_mut(*index)?.arguments.get_mut(*argument)?,
        Slot::Property(name) => def.properties.get_mut(name)?,
    };
    let mut current = root;
    for step in path {
        current = match (current, step) {
            (Value::List(items), PathStep::Index(i)) => items.get_mut(*i)?,
            (Value::Map(map), PathStep::Key(k)) => map.get_mut(k)?,
            _ => return None,
        };
    }
    match current {
        Value::Reference(r) => Some(r),
        _ => None,
    }
}
