use crate::compiler::{CompilationContext, CompilerPass};
use crate::error::{DiError, DiResult};
use crate::registry::Registry;
use crate::types::{ClassCatalog, ParamDecl, ParamType};
use crate::value::Value;

/// Checks constructor arguments, method call arguments and properties
/// against the declarations in the [`ClassCatalog`].
///
/// Only classes present in the catalog are checked. A reference is accepted
/// when the target's class is unknown or is a subtype of the declared class;
/// deferred references are checked like direct ones since their proxy
/// exposes the target's class and interfaces.
#[derive(Debug, Default)]
pub struct CheckTypeDeclarationsPass;

impl CompilerPass for CheckTypeDeclarationsPass {
    fn name(&self) -> &str {
        "CheckTypeDeclarationsPass"
    }

    fn process(&self, ctx: &mut CompilationContext<'_>) -> DiResult<()> {
        let catalog = ctx.catalog();
        if catalog.is_empty() {
            return Ok(());
        }
        let registry = ctx.registry();
        let mut checked = 0usize;

        for (id, def) in registry.definitions() {
            let Some(class) = def.class.as_deref() else {
                continue;
            };
            let Some(info) = catalog.get(class) else {
                continue;
            };
            checked += 1;

            if def.factory.is_none() {
                check_arguments(registry, catalog, id, &format!("{class}::__construct()"), &info.constructor, &def.arguments)?;
            }
            for call in &def.calls {
                let Some(params) = catalog.method(class, &call.method) else {
                    return Err(DiError::invalid(
                        id,
                        format!("method {}() does not exist on class \"{class}\"", call.method),
                    ));
                };
                check_arguments(registry, catalog, id, &format!("{class}::{}()", call.method), params, &call.arguments)?;
            }
            for (name, value) in &def.properties {
                if let Some(decl) = catalog.property(class, name) {
                    check_value(registry, catalog, id, &format!("property \"{class}::${name}\""), decl, value)?;
                }
            }
        }

        ctx.log(format!("checked type declarations of {checked} definitions"));
        Ok(())
    }
}

fn check_arguments(
    registry: &Registry,
    catalog: &ClassCatalog,
    id: &str,
    function: &str,
    params: &[ParamDecl],
    arguments: &[Value],
) -> DiResult<()> {
    let required = params.iter().filter(|p| !p.optional).count();
    if arguments.len() < required {
        return Err(DiError::invalid(
            id,
            format!("{function} requires {required} arguments, {} given", arguments.len()),
        ));
    }
    if arguments.len() > params.len() {
        return Err(DiError::invalid(
            id,
            format!("{function} accepts {} arguments, {} given", params.len(), arguments.len()),
        ));
    }
    for (i, (decl, value)) in params.iter().zip(arguments).enumerate() {
        check_value(registry, catalog, id, &format!("argument #{i} (${}) of {function}", decl.name), decl, value)?;
    }
    Ok(())
}

fn check_value(
    registry: &Registry,
    catalog: &ClassCatalog,
    id: &str,
    position: &str,
    decl: &ParamDecl,
    value: &Value,
) -> DiResult<()> {
    let accepted = match value {
        Value::Reference(reference) => match &decl.ty {
            ParamType::Mixed => true,
            ParamType::Class(expected) => {
                let target = registry.resolve_id(&reference.id)?;
                match registry.definition(target).and_then(|d| d.class.as_deref()) {
                    Some(actual) if catalog.contains(actual) => catalog.is_subtype(actual, expected),
                    _ => true,
                }
            }
            _ => false,
        },
        other => decl.accepts_value(other),
    };

    if accepted {
        return Ok(());
    }
    let given = match value {
        Value::Reference(r) => registry
            .resolve_id(&r.id)
            .ok()
            .and_then(|t| registry.definition(t))
            .map(|d| d.display_class())
            .unwrap_or_else(|| r.id.clone()),
        other => other.type_name().to_string(),
    };
    let nullable = if decl.nullable { "?" } else { "" };
    Err(DiError::invalid(
        id,
        format!("{position} accepts \"{nullable}{}\", \"{given}\" passed", decl.ty),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::passes::test_support::run_with_catalog;
    use crate::definition::Definition;
    use crate::reference::Reference;
    use crate::types::ClassInfo;

    fn catalog() -> ClassCatalog {
        let mut catalog = ClassCatalog::new();
        catalog
            .declare(ClassInfo::new("LoggerInterface"))
            .declare(ClassInfo::new("FileLogger").implements("LoggerInterface"))
            .declare(ClassInfo::new("Clock"))
            .declare(
                ClassInfo::new("Mailer")
                    .constructor(vec![
                        ParamDecl::new("logger", ParamType::Class("LoggerInterface".into())),
                        ParamDecl::new("retries", ParamType::Int).optional(),
                    ])
                    .method("setTimeout", vec![ParamDecl::new("seconds", ParamType::Float)]),
            );
        catalog
    }

    fn registry(logger: &str) -> Registry {
        let mut registry = Registry::new();
        registry.register("logger", Definition::new("FileLogger"));
        registry.register("clock", Definition::new("Clock"));
        registry.register(
            "mailer",
            Definition::new("Mailer")
                .arg(Reference::new(logger))
                .call("setTimeout", vec![Value::Int(3)]),
        );
        registry
    }

    #[test]
    fn subtypes_and_optional_parameters_pass() {
        assert!(run_with_catalog(&CheckTypeDeclarationsPass, registry("logger"), &catalog()).is_ok());
    }

    #[test]
    fn unrelated_class_is_rejected() {
        let err = run_with_catalog(&CheckTypeDeclarationsPass, registry("clock"), &catalog()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid definition for service \"mailer\": argument #0 ($logger) of Mailer::__construct() accepts \"LoggerInterface\", \"Clock\" passed"
        );
    }

    #[test]
    fn unknown_method_is_rejected() {
        let mut registry = registry("logger");
        registry
            .definition_mut("mailer")
            .unwrap()
            .calls
            .push(crate::definition::MethodCall::new("setNothing", vec![]));
        assert!(run_with_catalog(&CheckTypeDeclarationsPass, registry, &catalog()).is_err());
    }
}
