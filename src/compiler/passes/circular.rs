use crate::compiler::{CompilationContext, CompilerPass, CycleDetector};
use crate::error::{DiError, DiResult};
use crate::graph::{reference_at_mut, GraphBuilder};

/// Detects construction cycles. Resolvable cycles are broken by marking the
/// chosen reference slot as deferred; the slot then receives a lazy proxy.
/// A cycle made only of constructor and factory edges is fatal.
#[derive(Debug, Default)]
pub struct CheckCircularReferencesPass;

impl CompilerPass for CheckCircularReferencesPass {
    fn name(&self) -> &str {
        "CheckCircularReferencesPass"
    }

    fn process(&self, ctx: &mut CompilationContext<'_>) -> DiResult<()> {
        let graph = GraphBuilder::new().build(ctx.registry())?;
        let report = CycleDetector::new().analyze(&graph)?;

        for (edge_id, cycle) in report.deferred.iter().zip(&report.cycles) {
            let Some(edge) = graph.edge(*edge_id) else {
                continue;
            };
            let def = ctx
                .registry_mut()
                .definition_mut(&edge.from)
                .ok_or_else(|| DiError::not_found(edge.from.clone(), None))?;
            let reference = reference_at_mut(def, &edge.slot, &edge.path).ok_or_else(|| {
                DiError::invalid(&edge.from, format!("{} no longer holds a reference", edge.slot))
            })?;
            reference.deferred = true;
            ctx.log(format!(
                "deferred \"{}\" -> \"{}\" ({}) to break {}",
                edge.from,
                edge.to,
                edge.slot,
                cycle.join(" -> ")
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::passes::test_support::run;
    use crate::definition::Definition;
    use crate::reference::Reference;
    use crate::registry::Registry;

    #[test]
    fn method_call_back_edge_is_deferred() {
        let mut registry = Registry::new();
        registry.register("a", Definition::new("A").arg(Reference::new("b")));
        registry.register("b", Definition::new("B").call("setA", vec![Reference::new("a").into()]));

        let (registry, log) = run(&CheckCircularReferencesPass, registry).unwrap();
        let call = &registry.definition("b").unwrap().calls[0];
        assert!(call.arguments[0].as_reference().unwrap().deferred);
        assert!(!registry.definition("a").unwrap().arguments[0].as_reference().unwrap().deferred);
        assert_eq!(
            log,
            vec!["deferred \"b\" -> \"a\" (argument #0 of method call setA()) to break a -> b -> a"]
        );
    }

    #[test]
    fn constructor_cycle_is_fatal() {
        let mut registry = Registry::new();
        registry.register("a", Definition::new("A").arg(Reference::new("b")));
        registry.register("b", Definition::new("B").arg(Reference::new("a")));
        let err = run(&CheckCircularReferencesPass, registry).unwrap_err();
        assert_eq!(err.chain(), Some(&["a".to_string(), "b".into(), "a".into()][..]));
    }
}
