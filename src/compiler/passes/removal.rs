use std::collections::HashSet;

use crate::compiler::{CompilationContext, CompilerPass};
use crate::error::DiResult;
use crate::graph::slot_references;

/// Removes abstract definitions: they only serve as templates.
#[derive(Debug, Default)]
pub struct RemoveAbstractDefinitionsPass;

impl CompilerPass for RemoveAbstractDefinitionsPass {
    fn name(&self) -> &str {
        "RemoveAbstractDefinitionsPass"
    }

    fn process(&self, ctx: &mut CompilationContext<'_>) -> DiResult<()> {
        let abstract_ids: Vec<String> = ctx
            .registry()
            .definitions()
            .iter()
            .filter(|(_, def)| def.is_abstract)
            .map(|(id, _)| id.clone())
            .collect();
        for id in abstract_ids {
            ctx.registry_mut().remove_definition(&id);
            ctx.log(format!("removed abstract definition \"{id}\""));
            ctx.mark_removed(id);
        }
        Ok(())
    }
}

/// Removes private definitions not reachable from any public definition or
/// public alias.
#[derive(Debug, Default)]
pub struct RemoveUnusedDefinitionsPass;

impl CompilerPass for RemoveUnusedDefinitionsPass {
    fn name(&self) -> &str {
        "RemoveUnusedDefinitionsPass"
    }

    fn process(&self, ctx: &mut CompilationContext<'_>) -> DiResult<()> {
        let registry = ctx.registry();
        let mut pending: Vec<String> = registry
            .definitions()
            .iter()
            .filter(|(_, def)| def.public || def.synthetic)
            .map(|(id, _)| id.clone())
            .collect();
        for (_, alias) in registry.aliases().iter().filter(|(_, a)| a.public) {
            pending.push(registry.resolve_id(&alias.target)?.to_string());
        }

        let mut reachable: HashSet<String> = HashSet::new();
        while let Some(id) = pending.pop() {
            if !reachable.insert(id.clone()) {
                continue;
            }
            let Some(def) = registry.definition(&id) else {
                continue;
            };
            for (_, _, reference) in slot_references(def) {
                let target = registry.resolve_id(&reference.id)?;
                if !reachable.contains(target) {
                    pending.push(target.to_string());
                }
            }
        }

        let unused: Vec<String> = registry
            .ids()
            .filter(|id| !reachable.contains(*id))
            .map(str::to_string)
            .collect();
        for id in unused {
            ctx.registry_mut().remove_definition(&id);
            tracing::debug!(service = %id, "removing unused private service");
            ctx.log(format!("removed unused private service \"{id}\""));
            ctx.mark_removed(id);
        }
        Ok(())
    }
}
