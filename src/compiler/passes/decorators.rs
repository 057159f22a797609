use crate::alias::Alias;
use crate::compiler::{CompilationContext, CompilerPass};
use crate::definition::Decoration;
use crate::error::{DiError, DiResult};
use crate::reference::InvalidBehavior;
use crate::value::Value;

/// Applies `Definition::decorate`.
///
/// The decorated definition moves to the inner id (`<decorator>.inner` unless
/// given) and becomes private; the original id turns into an alias of the
/// decorator. Decorators of the same id stack by priority: the highest
/// priority is applied first and ends up closest to the original service.
///
/// A missing decorated service follows the decoration's invalid behavior:
/// `ServiceNotFound`, the decorator is removed (ignore), or references to
/// the inner id inside the decorator become `null`.
#[derive(Debug, Default)]
pub struct DecoratorServicePass;

impl CompilerPass for DecoratorServicePass {
    fn name(&self) -> &str {
        "DecoratorServicePass"
    }

    fn process(&self, ctx: &mut CompilationContext<'_>) -> DiResult<()> {
        let mut decorators: Vec<(String, Decoration)> = ctx
            .registry()
            .definitions()
            .iter()
            .filter_map(|(id, def)| def.decorates.clone().map(|d| (id.clone(), d)))
            .collect();
        decorators.sort_by(|a, b| b.1.priority.cmp(&a.1.priority));

        for (decorator, decoration) in decorators {
            let inner_id = decoration
                .inner_id
                .clone()
                .unwrap_or_else(|| format!("{decorator}.inner"));
            let target = decoration.id.clone();
            if target == decorator {
                return Err(DiError::invalid(&decorator, "a service cannot decorate itself"));
            }

            let registry = ctx.registry_mut();
            if let Some(def) = registry.definition_mut(&decorator) {
                def.decorates = None;
            }

            if let Some(alias) = registry.get_alias(&target).cloned() {
                let public = alias.public;
                registry.alias(inner_id.clone(), Alias::new(alias.target).private());
                registry.alias(target.clone(), Alias::new(decorator.clone()).private_if(!public));
            } else if let Some(mut original) = registry.remove_definition(&target) {
                let public = original.public;
                original.public = false;
                registry.register(inner_id.clone(), original);
                registry.alias(target.clone(), Alias::new(decorator.clone()).private_if(!public));
            } else {
                match decoration.behavior {
                    InvalidBehavior::ExceptionOnInvalid => {
                        return Err(DiError::not_found(target, Some(decorator.as_str())));
                    }
                    InvalidBehavior::IgnoreOnInvalid => {
                        registry.remove_definition(&decorator);
                        ctx.mark_removed(decorator.clone());
                        ctx.log(format!(
                            "removed decorator \"{decorator}\": decorated service \"{target}\" does not exist"
                        ));
                        continue;
                    }
                    InvalidBehavior::NullOnInvalid => {
                        if let Some(def) = registry.definition_mut(&decorator) {
                            def.for_each_value_mut(&mut |value| null_references_to(value, &inner_id));
                        }
                        ctx.log(format!(
                            "decorator \"{decorator}\" receives null: decorated service \"{target}\" does not exist"
                        ));
                        continue;
                    }
                }
            }

            tracing::debug!(service = %target, decorator = %decorator, inner = %inner_id, "service decorated");
            ctx.log(format!("decorated \"{target}\" with \"{decorator}\" (inner \"{inner_id}\")"));
        }
        Ok(())
    }
}

fn null_references_to(value: &mut Value, id: &str) {
    match value {
        Value::Reference(r) if r.id == id => *value = Value::Null,
        Value::List(items) => items.iter_mut().for_each(|v| null_references_to(v, id)),
        Value::Map(map) => map.values_mut().for_each(|v| null_references_to(v, id)),
        _ => {}
    }
}
