use crate::compiler::{CompilationContext, CompilerPass};
use crate::definition::{Definition, Factory};
use crate::error::{DiError, DiResult};
use crate::parameter_bag::ParameterBag;
use crate::value::Value;

/// Resolves the parameter bag and every `%name%` placeholder in definitions:
/// class names, factory names, arguments, method calls, properties and tag
/// attributes. `%%` is unescaped once, after resolution.
#[derive(Debug, Default)]
pub struct ResolveParameterPlaceholdersPass;

impl CompilerPass for ResolveParameterPlaceholdersPass {
    fn name(&self) -> &str {
        "ResolveParameterPlaceholdersPass"
    }

    fn process(&self, ctx: &mut CompilationContext<'_>) -> DiResult<()> {
        let bag = ctx.registry().parameters().clone();
        let resolved = bag.resolve_all()?;

        let mut count = 0usize;
        for (id, def) in ctx.registry_mut().definitions_mut() {
            resolve_definition(&bag, id, def)?;
            count += 1;
        }
        ctx.registry_mut().replace_parameters(resolved);
        ctx.log(format!("resolved parameters of {count} definitions"));
        Ok(())
    }
}

fn resolve_definition(bag: &ParameterBag, id: &str, def: &mut Definition) -> DiResult<()> {
    if let Some(class) = &def.class {
        def.class = Some(resolve_name(bag, id, class)?);
    }
    match &mut def.factory {
        Some(Factory::Class { class, method }) => {
            *class = resolve_name(bag, id, class)?;
            *method = resolve_name(bag, id, method)?;
        }
        Some(Factory::Service { method, .. }) => {
            *method = resolve_name(bag, id, method)?;
        }
        None => {}
    }

    let mut failure = None;
    def.for_each_value_mut(&mut |value| {
        if failure.is_none() {
            match resolve(bag, value) {
                Ok(v) => *value = v,
                Err(e) => failure = Some(e),
            }
        }
    });
    if let Some(err) = failure {
        return Err(err);
    }

    for occurrences in def.tags.values_mut() {
        for attributes in occurrences.iter_mut() {
            for value in attributes.values_mut() {
                *value = resolve(bag, value)?;
            }
        }
    }
    Ok(())
}

fn resolve(bag: &ParameterBag, value: &Value) -> DiResult<Value> {
    Ok(ParameterBag::unescape_value(bag.resolve_value(value)?))
}

fn resolve_name(bag: &ParameterBag, id: &str, name: &str) -> DiResult<String> {
    match resolve(bag, &Value::String(name.to_string()))? {
        Value::String(s) => Ok(s),
        other => Err(DiError::invalid(
            id,
            format!("\"{name}\" must resolve to a string, got {}", other.type_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::passes::test_support::run;
    use crate::registry::Registry;

    #[test]
    fn placeholders_in_definitions_are_resolved() {
        let mut registry = Registry::new();
        registry.parameters_mut().set("mailer.class", "SmtpMailer");
        registry.parameters_mut().set("port", 25);
        registry.parameters_mut().set("host", "mx.local");
        registry.register(
            "mailer",
            Definition::new("%mailer.class%")
                .arg("%port%")
                .arg("smtp://%host%:%port% 100%%")
                .property("hosts", vec!["%host%"]),
        );

        let (registry, _) = run(&ResolveParameterPlaceholdersPass, registry).unwrap();
        let def = registry.definition("mailer").unwrap();
        assert_eq!(def.class.as_deref(), Some("SmtpMailer"));
        assert_eq!(def.arguments[0], Value::Int(25));
        assert_eq!(def.arguments[1], Value::from("smtp://mx.local:25 100%"));
        assert_eq!(def.properties["hosts"], Value::List(vec![Value::from("mx.local")]));
        assert!(registry.parameters().is_resolved());
    }

    #[test]
    fn class_must_resolve_to_a_string() {
        let mut registry = Registry::new();
        registry.parameters_mut().set("n", 1);
        registry.register("x", Definition::new("%n%"));
        assert!(matches!(
            run(&ResolveParameterPlaceholdersPass, registry),
            Err(DiError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn unknown_parameter_fails() {
        let mut registry = Registry::new();
        registry.register("x", Definition::new("X").arg("%missing%"));
        assert!(matches!(
            run(&ResolveParameterPlaceholdersPass, registry),
            Err(DiError::ParameterNotFound { .. })
        ));
    }
}
