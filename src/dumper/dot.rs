use std::fmt::Write;

use crate::builder::FrozenContainer;
use crate::dumper::Dumper;
use crate::error::DiResult;
use crate::graph::{Edge, EdgeKind, Node};

/// Renders the final dependency graph in Graphviz DOT.
///
/// Lazy services are filled, private services drawn with a dashed border,
/// deferred edges dashed and edges into lazy services dotted.
///
/// # Examples
///
/// ```rust
/// use di_compiler::dumper::{DotDumper, Dumper};
/// use di_compiler::{ContainerBuilder, Definition, Reference};
///
/// let mut builder = ContainerBuilder::new();
/// builder.register("a", Definition::new("A").arg(Reference::new("b")).public());
/// builder.register("b", Definition::new("B").call("setA", vec![Reference::new("a").into()]));
/// let frozen = builder.compile().unwrap();
///
/// let dot = DotDumper::new().dump(&frozen).unwrap();
/// assert!(dot.starts_with("digraph Container {"));
/// assert!(dot.contains("\"b\" -> \"a\" [style=dashed"));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct DotDumper {
    slot_labels: bool,
}

impl Default for DotDumper {
    fn default() -> Self {
        Self { slot_labels: true }
    }
}

impl DotDumper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether edges carry the slot they fill (`argument #0`, ...).
    pub fn with_slot_labels(mut self, enabled: bool) -> Self {
        self.slot_labels = enabled;
        self
    }

    fn node_line(node: &Node) -> String {
        let class = node.class.as_deref().unwrap_or("synthetic");
        let mut styles = Vec::new();
        if node.lazy {
            styles.push("filled");
        }
        if !node.public {
            styles.push("dashed");
        }
        let mut line = format!(
            "  \"{}\" [label=\"{}\\n({})\"",
            escape(&node.id),
            escape(&node.id),
            escape(class)
        );
        if !styles.is_empty() {
            let _ = write!(line, ", style=\"{}\"", styles.join(","));
        }
        if node.lazy {
            line.push_str(", fillcolor=lightyellow");
        }
        line.push_str("];\n");
        line
    }

    fn edge_line(&self, edge: &Edge) -> String {
        let style = if edge.deferred {
            "dashed"
        } else if edge.lazy_target {
            "dotted"
        } else if edge.kind == EdgeKind::Factory {
            "bold"
        } else {
            "solid"
        };
        let mut line = format!("  \"{}\" -> \"{}\" [style={}", escape(&edge.from), escape(&edge.to), style);
        if self.slot_labels {
            let _ = write!(line, ", label=\"{}\"", escape(&edge.slot.to_string()));
        }
        line.push_str("];\n");
        line
    }
}

impl Dumper for DotDumper {
    fn dump(&self, frozen: &FrozenContainer) -> DiResult<String> {
        let graph = frozen.graph();
        let mut output = String::new();
        output.push_str("digraph Container {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box];\n\n");

        for node in graph.nodes() {
            output.push_str(&Self::node_line(node));
        }
        output.push('\n');
        for edge in graph.edges() {
            output.push_str(&self.edge_line(edge));
        }

        output.push_str("}\n");
        Ok(output)
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
