use std::collections::HashMap;

use crate::compiler::{CompilationContext, CompilerPass};
use crate::error::DiResult;

/// Rewrites every reference to an alias into a reference to its concrete
/// target and flattens alias chains, so that each alias points directly at a
/// definition id. Alias cycles fail here. Referencing a deprecated alias is
/// reported through `tracing::warn!` and the compiler log.
#[derive(Debug, Default)]
pub struct ResolveReferencesToAliasesPass;

impl CompilerPass for ResolveReferencesToAliasesPass {
    fn name(&self) -> &str {
        "ResolveReferencesToAliasesPass"
    }

    fn process(&self, ctx: &mut CompilationContext<'_>) -> DiResult<()> {
        let targets = resolved_targets(ctx)?;
        let deprecations: HashMap<String, String> = ctx
            .registry()
            .aliases()
            .iter()
            .filter_map(|(id, alias)| alias.deprecation_message(id).map(|m| (id.clone(), m)))
            .collect();

        let mut notices = Vec::new();
        for (id, def) in ctx.registry_mut().definitions_mut() {
            def.for_each_reference_mut(&mut |reference| {
                if let Some(message) = deprecations.get(&reference.id) {
                    notices.push((id.clone(), reference.id.clone(), message.clone()));
                }
                if let Some(target) = targets.get(&reference.id) {
                    reference.id = target.clone();
                }
            });
        }
        for (from, alias, message) in notices {
            tracing::warn!(service = %from, alias = %alias, "{message}");
            ctx.log(format!("\"{from}\" references deprecated alias \"{alias}\": {message}"));
        }

        for (alias, target) in &targets {
            if let Some(entry) = ctx.registry().get_alias(alias).cloned() {
                if entry.target != *target {
                    let mut flattened = entry;
                    flattened.target = target.clone();
                    ctx.registry_mut().alias(alias.clone(), flattened);
                }
            }
        }
        Ok(())
    }
}

/// Removes private aliases once nothing needs them: references to them are
/// rewritten to the concrete target first.
#[derive(Debug, Default)]
pub struct RemovePrivateAliasesPass;

impl CompilerPass for RemovePrivateAliasesPass {
    fn name(&self) -> &str {
        "RemovePrivateAliasesPass"
    }

    fn process(&self, ctx: &mut CompilationContext<'_>) -> DiResult<()> {
        let targets = resolved_targets(ctx)?;
        let private: Vec<String> = ctx
            .registry()
            .aliases()
            .iter()
            .filter(|(_, alias)| !alias.public)
            .map(|(id, _)| id.clone())
            .collect();
        if private.is_empty() {
            return Ok(());
        }

        for (_, def) in ctx.registry_mut().definitions_mut() {
            def.for_each_reference_mut(&mut |reference| {
                if private.contains(&reference.id) {
                    if let Some(target) = targets.get(&reference.id) {
                        reference.id = target.clone();
                    }
                }
            });
        }
        for id in private {
            ctx.registry_mut().remove_alias(&id);
            ctx.log(format!("removed private alias \"{id}\""));
            ctx.mark_removed(id);
        }
        Ok(())
    }
}

fn resolved_targets(ctx: &CompilationContext<'_>) -> DiResult<HashMap<String, String>> {
    let registry = ctx.registry();
    registry
        .aliases()
        .keys()
        .map(|id| Ok((id.clone(), registry.resolve_id(id)?.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::Alias;
    use crate::compiler::passes::test_support::run;
    use crate::definition::Definition;
    use crate::error::DiError;
    use crate::reference::Reference;
    use crate::registry::Registry;

    #[test]
    fn references_and_chains_point_at_definitions() {
        let mut registry = Registry::new();
        registry.register("z", Definition::new("Z"));
        registry.alias("y", "z");
        registry.alias("x", "y");
        registry.register("user", Definition::new("U").arg(Reference::new("x")));

        let (registry, _) = run(&ResolveReferencesToAliasesPass, registry).unwrap();
        assert_eq!(registry.definition("user").unwrap().arguments[0].as_reference().unwrap().id, "z");
        assert_eq!(registry.get_alias("x").unwrap().target, "z");
    }

    #[test]
    fn deprecated_alias_use_is_logged() {
        let mut registry = Registry::new();
        registry.register("new", Definition::new("N"));
        registry.alias("old", Alias::new("new").deprecate("\"%alias_id%\" is deprecated"));
        registry.register("user", Definition::new("U").arg(Reference::new("old")));

        let (_, log) = run(&ResolveReferencesToAliasesPass, registry).unwrap();
        assert_eq!(log, vec!["\"user\" references deprecated alias \"old\": \"old\" is deprecated"]);
    }

    #[test]
    fn alias_cycle_fails() {
        let mut registry = Registry::new();
        registry.alias("a", "b");
        registry.alias("b", "a");
        assert!(matches!(
            run(&ResolveReferencesToAliasesPass, registry),
            Err(DiError::AliasCircularReference { .. })
        ));
    }

    #[test]
    fn private_aliases_are_removed() {
        let mut registry = Registry::new();
        registry.register("impl", Definition::new("Impl"));
        registry.alias("iface", Alias::new("impl").private());
        registry.alias("public", "impl");
        registry.register("user", Definition::new("U").arg(Reference::new("iface")));

        let (registry, _) = run(&RemovePrivateAliasesPass, registry).unwrap();
        assert!(!registry.has_alias("iface"));
        assert!(registry.has_alias("public"));
        assert_eq!(registry.definition("user").unwrap().arguments[0].as_reference().unwrap().id, "impl");
    }
}
