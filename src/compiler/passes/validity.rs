use crate::compiler::{CompilationContext, CompilerPass};
use crate::definition::Factory;
use crate::error::{DiError, DiResult};
use crate::graph::slot_references;

/// Rejects definitions that cannot be turned into services.
///
/// - a concrete definition needs a class or a factory
/// - a synthetic definition must be public
/// - nothing may reference an abstract definition
#[derive(Debug, Default)]
pub struct CheckDefinitionValidityPass;

impl CompilerPass for CheckDefinitionValidityPass {
    fn name(&self) -> &str {
        "CheckDefinitionValidityPass"
    }

    fn process(&self, ctx: &mut CompilationContext<'_>) -> DiResult<()> {
        let registry = ctx.registry();
        for (id, def) in registry.definitions() {
            if def.synthetic && !def.public {
                return Err(DiError::invalid(
                    id,
                    "a synthetic service must be public, it is only ever set at runtime",
                ));
            }
            if !def.synthetic && !def.is_abstract && def.class.is_none() && def.factory.is_none() {
                return Err(DiError::invalid(id, "the definition has neither a class nor a factory"));
            }
            if let Some(Factory::Class { method, .. } | Factory::Service { method, .. }) = &def.factory {
                if method.is_empty() {
                    return Err(DiError::invalid(id, "the factory method name is empty"));
                }
            }

            for (slot, _, reference) in slot_references(def) {
                let Ok(target) = registry.resolve_id(&reference.id) else {
                    continue;
                };
                if registry.definition(target).is_some_and(|t| t.is_abstract) {
                    return Err(DiError::invalid(
                        id,
                        format!("{slot} references abstract service \"{target}\""),
                    ));
                }
            }
        }
        Ok(())
    }
}
