use std::collections::HashMap;

use crate::compiler::{CompilationContext, CompilerPass};
use crate::definition::{MethodCall, TagAttributes};
use crate::error::{DiError, DiResult};
use crate::reference::Reference;
use crate::value::Value;

/// Expands `Value::Tagged` placeholders into priority-ordered lists of
/// references. A consumer never receives itself.
#[derive(Debug, Default)]
pub struct ResolveTaggedCollectionsPass;

impl CompilerPass for ResolveTaggedCollectionsPass {
    fn name(&self) -> &str {
        "ResolveTaggedCollectionsPass"
    }

    fn process(&self, ctx: &mut CompilationContext<'_>) -> DiResult<()> {
        let tagged: HashMap<String, Vec<String>> = ctx
            .registry()
            .find_tags()
            .into_iter()
            .map(|tag| {
                let ids = ctx.registry().find_by_tag(&tag).into_iter().map(|(id, _)| id).collect();
                (tag, ids)
            })
            .collect();

        let mut failure = None;
        let mut expanded = Vec::new();
        for (id, def) in ctx.registry_mut().definitions_mut() {
            def.for_each_value_mut(&mut |value| {
                if failure.is_none() {
                    if let Err(e) = expand(value, id, &tagged, &mut expanded) {
                        failure = Some(e);
                    }
                }
            });
        }
        if let Some(err) = failure {
            return Err(err);
        }
        for (consumer, tag, count) in expanded {
            ctx.log(format!("injected {count} services tagged \"{tag}\" into \"{consumer}\""));
        }
        Ok(())
    }
}

fn expand(
    value: &mut Value,
    consumer: &str,
    tagged: &HashMap<String, Vec<String>>,
    expanded: &mut Vec<(String, String, usize)>,
) -> DiResult<()> {
    match value {
        Value::Tagged(collection) => {
            let refs: Vec<Value> = tagged
                .get(&collection.tag)
                .into_iter()
                .flatten()
                .filter(|id| id.as_str() != consumer)
                .map(|id| Value::Reference(Reference::new(id.clone())))
                .collect();
            if refs.is_empty() && collection.require_non_empty {
                return Err(DiError::invalid(
                    consumer,
                    format!("no service is tagged \"{}\"", collection.tag),
                ));
            }
            expanded.push((consumer.to_string(), collection.tag.clone(), refs.len()));
            *value = Value::List(refs);
        }
        Value::List(items) => {
            for item in items {
                expand(item, consumer, tagged, expanded)?;
            }
        }
        Value::Map(map) => {
            for item in map.values_mut() {
                expand(item, consumer, tagged, expanded)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Registers every service tagged `tag` on `consumer` with one method call
/// per tagged service, in priority order.
///
/// # Examples
///
/// ```rust
/// use di_compiler::compiler::passes::CollectTaggedServicesPass;
/// use di_compiler::compiler::PassPhase;
/// use di_compiler::{ContainerBuilder, Definition};
///
/// let mut builder = ContainerBuilder::new();
/// builder.register("dispatcher", Definition::new("Dispatcher").public());
/// builder.register("audit", Definition::new("Audit").tag_priority("listener", 5));
/// builder.register("mailer", Definition::new("Mailer").tag_priority("listener", 10));
/// builder.add_pass(
///     CollectTaggedServicesPass::new("listener", "dispatcher", "addListener"),
///     PassPhase::BeforeOptimization,
///     0,
/// );
///
/// let frozen = builder.compile().unwrap();
/// let calls = &frozen.registry().definition("dispatcher").unwrap().calls;
/// assert_eq!(calls.len(), 2);
/// assert_eq!(calls[0].arguments[0].as_reference().unwrap().id, "mailer");
/// ```
#[derive(Debug, Clone)]
pub struct CollectTaggedServicesPass {
    tag: String,
    consumer: String,
    method: String,
    with_attributes: bool,
}

impl CollectTaggedServicesPass {
    pub fn new(tag: impl Into<String>, consumer: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            consumer: consumer.into(),
            method: method.into(),
            with_attributes: false,
        }
    }

    /// Also pass the tag attributes (as a map) after the reference.
    pub fn with_attributes(mut self) -> Self {
        self.with_attributes = true;
        self
    }
}

impl CompilerPass for CollectTaggedServicesPass {
    fn name(&self) -> &str {
        "CollectTaggedServicesPass"
    }

    fn process(&self, ctx: &mut CompilationContext<'_>) -> DiResult<()> {
        let consumer_id = ctx.registry().resolve_id(&self.consumer)?.to_string();
        let tagged: Vec<(String, TagAttributes)> = ctx
            .registry()
            .find_by_tag(&self.tag)
            .into_iter()
            .filter(|(id, _)| *id != consumer_id)
            .collect();

        let consumer = ctx
            .registry_mut()
            .definition_mut(&consumer_id)
            .ok_or_else(|| DiError::not_found(consumer_id.clone(), None))?;
        for (id, attributes) in &tagged {
            let mut arguments = vec![Value::Reference(Reference::new(id.clone()))];
            if self.with_attributes {
                arguments.push(Value::Map(attributes.clone()));
            }
            consumer.calls.push(MethodCall::new(self.method.clone(), arguments));
        }
        ctx.log(format!(
            "registered {} services tagged \"{}\" on \"{}\" via {}()",
            tagged.len(),
            self.tag,
            consumer_id,
            self.method
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::passes::test_support::run;
    use crate::definition::Definition;
    use crate::registry::Registry;
    use crate::value::TaggedCollection;

    #[test]
    fn tagged_collection_becomes_ordered_references() {
        let mut registry = Registry::new();
        registry.register("a", Definition::new("A").tag_priority("handler", 1));
        registry.register("b", Definition::new("B").tag_priority("handler", 9));
        registry.register(
            "chain",
            Definition::new("Chain")
                .tag("handler")
                .arg(TaggedCollection::new("handler")),
        );

        let (registry, log) = run(&ResolveTaggedCollectionsPass, registry).unwrap();
        let ids: Vec<String> = match &registry.definition("chain").unwrap().arguments[0] {
            Value::List(items) => items.iter().filter_map(|v| v.as_reference()).map(|r| r.id.clone()).collect(),
            other => panic!("expected list, got {other:?}"),
        };
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(log, vec!["injected 2 services tagged \"handler\" into \"chain\""]);
    }

    #[test]
    fn required_collection_must_not_be_empty() {
        let mut registry = Registry::new();
        registry.register("chain", Definition::new("Chain").arg(TaggedCollection::new("none").non_empty()));
        assert!(run(&ResolveTaggedCollectionsPass, registry).is_err());
    }

    #[test]
    fn collected_calls_can_carry_attributes() {
        let mut registry = Registry::new();
        registry.register("bus", Definition::new("Bus"));
        registry.register("h", Definition::new("H").tag_priority("handler", 3));

        let pass = CollectTaggedServicesPass::new("handler", "bus", "add").with_attributes();
        let (registry, _) = run(&pass, registry).unwrap();
        let call = &registry.definition("bus").unwrap().calls[0];
        assert_eq!(call.method, "add");
        match &call.arguments[1] {
            Value::Map(attrs) => assert_eq!(attrs["priority"], Value::Int(3)),
            other => panic!("expected attributes, got {other:?}"),
        }
    }
}
