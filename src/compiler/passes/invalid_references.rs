use crate::compiler::{CompilationContext, CompilerPass};
use crate::definition::{Definition, Factory};
use crate::error::{DiError, DiResult};
use crate::reference::InvalidBehavior;
use crate::registry::Registry;
use crate::value::Value;

/// Applies the invalid behavior of references whose target does not exist.
///
/// - required references fail with `ServiceNotFound`
/// - `null` references become `Value::Null`
/// - `ignore` references are dropped together with their list element, map
///   entry, property or method call; a constructor argument becomes `null`
#[derive(Debug, Default)]
pub struct ResolveInvalidReferencesPass;

impl CompilerPass for ResolveInvalidReferencesPass {
    fn name(&self) -> &str {
        "ResolveInvalidReferencesPass"
    }

    fn process(&self, ctx: &mut CompilationContext<'_>) -> DiResult<()> {
        let snapshot = ctx.registry().clone();
        let mut log = Vec::new();
        for (id, def) in ctx.registry_mut().definitions_mut() {
            resolve_definition(&snapshot, id, def, &mut log)?;
        }
        for line in log {
            ctx.log(line);
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Keep,
    Drop,
}

fn resolve_definition(registry: &Registry, id: &str, def: &mut Definition, log: &mut Vec<String>) -> DiResult<()> {
    let exists = |target: &str| {
        registry
            .resolve_id(target)
            .map(|resolved| registry.has_definition(resolved))
            .unwrap_or(false)
    };

    if let Some(Factory::Service { service, .. }) = &def.factory {
        if !exists(&service.id) {
            return Err(DiError::not_found(service.id.clone(), Some(id)));
        }
    }

    for arg in def.arguments.iter_mut() {
        if resolve(arg, id, &exists)? == Outcome::Drop {
            *arg = Value::Null;
        }
    }

    let mut kept_calls = Vec::with_capacity(def.calls.len());
    for mut call in std::mem::take(&mut def.calls) {
        let mut keep = true;
        for arg in call.arguments.iter_mut() {
            if resolve(arg, id, &exists)? == Outcome::Drop {
                keep = false;
            }
        }
        if keep {
            kept_calls.push(call);
        } else {
            log.push(format!("removed method call {}() from \"{id}\": ignored reference is missing", call.method));
        }
    }
    def.calls = kept_calls;

    let mut dropped = Vec::new();
    for (name, value) in def.properties.iter_mut() {
        if resolve(value, id, &exists)? == Outcome::Drop {
            dropped.push(name.clone());
        }
    }
    for name in dropped {
        def.properties.shift_remove(&name);
        log.push(format!("removed property \"{name}\" from \"{id}\": ignored reference is missing"));
    }
    Ok(())
}

fn resolve(value: &mut Value, from: &str, exists: &impl Fn(&str) -> bool) -> DiResult<Outcome> {
    match value {
        Value::Reference(reference) => {
            if exists(&reference.id) {
                return Ok(Outcome::Keep);
            }
            match reference.behavior {
                InvalidBehavior::ExceptionOnInvalid => {
                    return Err(DiError::not_found(reference.id.clone(), Some(from)));
                }
                InvalidBehavior::IgnoreOnInvalid => return Ok(Outcome::Drop),
                InvalidBehavior::NullOnInvalid => {}
            }
            *value = Value::Null;
            Ok(Outcome::Keep)
        }
        Value::List(items) => {
            let mut kept = Vec::with_capacity(items.len());
            for mut item in std::mem::take(items) {
                if resolve(&mut item, from, exists)? == Outcome::Keep {
                    kept.push(item);
                }
            }
            *items = kept;
            Ok(Outcome::Keep)
        }
        Value::Map(map) => {
            let mut kept = indexmap::IndexMap::with_capacity(map.len());
            for (key, mut item) in std::mem::take(map) {
                if resolve(&mut item, from, exists)? == Outcome::Keep {
                    kept.insert(key, item);
                }
            }
            *map = kept;
            Ok(Outcome::Keep)
        }
        _ => Ok(Outcome::Keep),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::passes::test_support::run;
    use crate::reference::Reference;

    #[test]
    fn behaviors_are_applied_per_reference() {
        let mut registry = Registry::new();
        registry.register("present", Definition::new("P"));
        registry.register(
            "svc",
            Definition::new("S")
                .arg(Reference::null_on_invalid("missing"))
                .arg(Reference::ignore_on_invalid("missing"))
                .arg(vec![
                    Value::from(Reference::ignore_on_invalid("missing")),
                    Value::from(Reference::new("present")),
                ])
                .call("setLogger", vec![Reference::ignore_on_invalid("missing").into()])
                .call("setPresent", vec![Reference::new("present").into()])
                .property("optional", Reference::ignore_on_invalid("missing")),
        );

        let (registry, log) = run(&ResolveInvalidReferencesPass, registry).unwrap();
        let def = registry.definition("svc").unwrap();
        assert_eq!(def.arguments[0], Value::Null);
        assert_eq!(def.arguments[1], Value::Null);
        assert_eq!(def.arguments[2], Value::List(vec![Reference::new("present").into()]));
        assert_eq!(def.calls.len(), 1);
        assert_eq!(def.calls[0].method, "setPresent");
        assert!(def.properties.is_empty());
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn missing_required_reference_names_both_ends() {
        let mut registry = Registry::new();
        registry.register("svc", Definition::new("S").arg(Reference::new("nope")));
        let err = run(&ResolveInvalidReferencesPass, registry).unwrap_err();
        assert_eq!(
            err.to_string(),
            "You have requested a non-existent service \"nope\". It is referenced by service \"svc\"."
        );
    }
}
