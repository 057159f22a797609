//! The mutable service graph: definitions, aliases and the parameters they use.

use indexmap::IndexMap;

use crate::alias::Alias;
use crate::definition::{Definition, TagAttributes};
use crate::error::{DiError, DiResult};
use crate::parameter_bag::ParameterBag;
use crate::value::Value;

/// One definition replaced by a later registration under the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub id: String,
    pub previous: String,
    pub replacement: String,
}

/// Definition registry.
///
/// Definitions and aliases keep their registration order, which makes every
/// derived ordering (tag lookups, graph traversal, dumped artifacts)
/// reproducible for identical input. Re-registering an id replaces the
/// definition in place (last write wins) and is recorded in
/// [`Registry::overrides`].
///
/// # Examples
///
/// ```rust
/// use di_compiler::{Definition, Registry};
///
/// let mut registry = Registry::new();
/// registry.register("z", Definition::new("Zed"));
/// registry.alias("y", "z");
/// registry.alias("x", "y");
///
/// assert_eq!(registry.resolve_id("x").unwrap(), "z");
/// assert_eq!(registry.find_definition("x").unwrap().class.as_deref(), Some("Zed"));
///
/// registry.alias("z", "x");
/// assert!(registry.resolve_id("x").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Registry {
    definitions: IndexMap<String, Definition>,
    aliases: IndexMap<String, Alias>,
    parameters: ParameterBag,
    overrides: Vec<Override>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces the definition for `id`.
    ///
    /// A definition replaces an alias of the same name.
    pub fn register(&mut self, id: impl Into<String>, definition: Definition) -> &mut Definition {
        let id = id.into();
        self.aliases.shift_remove(&id);
        if let Some(previous) = self.definitions.get(&id) {
            tracing::debug!(service = %id, "overriding service definition");
            self.overrides.push(Override {
                id: id.clone(),
                previous: previous.display_class(),
                replacement: definition.display_class(),
            });
        }
        let entry = self.definitions.entry(id).or_default();
        *entry = definition;
        entry
    }

    /// Registers or replaces an alias. An alias replaces a definition of the same name.
    pub fn alias(&mut self, id: impl Into<String>, alias: impl Into<Alias>) -> &mut Alias {
        let id = id.into();
        self.definitions.shift_remove(&id);
        let entry = self.aliases.entry(id).or_insert_with(|| Alias::new(""));
        *entry = alias.into();
        entry
    }

    pub fn definition(&self, id: &str) -> Option<&Definition> {
        self.definitions.get(id)
    }

    pub fn definition_mut(&mut self, id: &str) -> Option<&mut Definition> {
        self.definitions.get_mut(id)
    }

    pub fn get_alias(&self, id: &str) -> Option<&Alias> {
        self.aliases.get(id)
    }

    pub fn has_definition(&self, id: &str) -> bool {
        self.definitions.contains_key(id)
    }

    pub fn has_alias(&self, id: &str) -> bool {
        self.aliases.contains_key(id)
    }

    /// Whether `id` names a definition or an alias.
    pub fn has(&self, id: &str) -> bool {
        self.has_definition(id) || self.has_alias(id)
    }

    pub fn remove_definition(&mut self, id: &str) -> Option<Definition> {
        self.definitions.shift_remove(id)
    }

    pub fn remove_alias(&mut self, id: &str) -> Option<Alias> {
        self.aliases.shift_remove(id)
    }

    pub fn definitions(&self) -> &IndexMap<String, Definition> {
        &self.definitions
    }

    pub fn definitions_mut(&mut self) -> impl Iterator<Item = (&String, &mut Definition)> {
        self.definitions.iter_mut()
    }

    pub fn aliases(&self) -> &IndexMap<String, Alias> {
        &self.aliases
    }

    /// Definition ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn parameters(&self) -> &ParameterBag {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterBag {
        &mut self.parameters
    }

    pub(crate) fn replace_parameters(&mut self, parameters: ParameterBag) {
        self.parameters = parameters;
    }

    /// Every override recorded so far, oldest first.
    pub fn overrides(&self) -> &[Override] {
        &self.overrides
    }

    /// Follows aliases until a non-alias id is reached.
    ///
    /// Fails with `AliasCircularReference` when resolution does not end within
    /// `aliases + 1` hops. The returned id may still lack a definition.
    pub fn resolve_id<'a>(&'a self, id: &'a str) -> DiResult<&'a str> {
        let mut current = id;
        let mut chain: Vec<&str> = vec![id];
        for _ in 0..=self.aliases.len() {
            match self.aliases.get(current) {
                None => return Ok(current),
                Some(alias) => {
                    if let Some(start) = chain.iter().position(|seen| *seen == alias.target) {
                        let mut cycle: Vec<String> = chain[start..].iter().map(|s| s.to_string()).collect();
                        cycle.push(alias.target.clone());
                        return Err(DiError::AliasCircularReference { chain: cycle });
                    }
                    current = alias.target.as_str();
                    chain.push(current);
                }
            }
        }
        Err(DiError::AliasCircularReference {
            chain: chain.into_iter().map(str::to_string).collect(),
        })
    }

    /// Resolves aliases and returns the definition behind `id`.
    pub fn find_definition(&self, id: &str) -> DiResult<&Definition> {
        let resolved = self.resolve_id(id)?;
        self.definitions
            .get(resolved)
            .ok_or_else(|| DiError::not_found(resolved, None))
    }

    /// Every service tagged `tag`, ordered by its numeric `priority` attribute
    /// (descending; registration order for equal priorities).
    ///
    /// A service carrying the tag more than once appears once, with the
    /// attributes of its highest-priority occurrence. Abstract definitions
    /// are skipped: they never become services.
    pub fn find_by_tag(&self, tag: &str) -> Vec<(String, TagAttributes)> {
        let mut found: Vec<(i64, String, TagAttributes)> = self
            .definitions
            .iter()
            .filter(|(_, def)| !def.is_abstract)
            .filter_map(|(id, def)| {
                def.tags
                    .get(tag)?
                    .iter()
                    .map(|attributes| (tag_priority(attributes), attributes))
                    .reduce(|best, next| if next.0 > best.0 { next } else { best })
                    .map(|(priority, attributes)| (priority, id.clone(), attributes.clone()))
            })
            .collect();
        // sort_by is stable
        found.sort_by(|a, b| b.0.cmp(&a.0));
        found.into_iter().map(|(_, id, attrs)| (id, attrs)).collect()
    }

    /// Every tag name used by at least one definition, in first-use order.
    pub fn find_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for def in self.definitions.values() {
            for name in def.tags.keys() {
                if !tags.contains(name) {
                    tags.push(name.clone());
                }
            }
        }
        tags
    }
}

fn tag_priority(attributes: &TagAttributes) -> i64 {
    match attributes.get("priority") {
        Some(Value::Int(p)) => *p,
        Some(Value::Float(p)) => *p as i64,
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overriding_keeps_position_and_records_it() {
        let mut registry = Registry::new();
        registry.register("a", Definition::new("First"));
        registry.register("b", Definition::new("B"));
        registry.register("a", Definition::new("Second"));

        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(registry.definition("a").unwrap().class.as_deref(), Some("Second"));
        assert_eq!(
            registry.overrides(),
            &[Override {
                id: "a".into(),
                previous: "First".into(),
                replacement: "Second".into()
            }]
        );
    }

    #[test]
    fn tags_are_sorted_by_priority_then_registration() {
        let mut registry = Registry::new();
        registry.register("low", Definition::new("L").tag_priority("t", -10));
        registry.register("first_zero", Definition::new("F").tag("t"));
        registry.register("high", Definition::new("H").tag_priority("t", 20));
        registry.register("second_zero", Definition::new("S").tag("t"));
        registry.register("abstract", Definition::new("A").tag_priority("t", 99).abstract_());

        let ids: Vec<String> = registry.find_by_tag("t").into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["high", "first_zero", "second_zero", "low"]);
    }

    #[test]
    fn service_tagged_twice_is_listed_once_at_its_best_priority() {
        let mut registry = Registry::new();
        registry.register("mid", Definition::new("M").tag_priority("t", 5));
        registry.register(
            "twice",
            Definition::new("T").tag_priority("t", 1).tag_priority("t", 10).tag_priority("t", 3),
        );

        let found = registry.find_by_tag("t");
        let ids: Vec<&str> = found.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["twice", "mid"]);
        assert_eq!(found[0].1["priority"], Value::Int(10));
    }

    #[test]
    fn alias_cycle_reports_the_loop() {
        let mut registry = Registry::new();
        registry.alias("x", "y");
        registry.alias("y", "z");
        registry.alias("z", "x");

        match registry.resolve_id("x") {
            Err(DiError::AliasCircularReference { chain }) => assert_eq!(chain, vec!["x", "y", "z", "x"]),
            other => panic!("expected alias cycle, got {other:?}"),
        }
    }

    #[test]
    fn alias_and_definition_replace_each_other() {
        let mut registry = Registry::new();
        registry.register("a", Definition::new("A"));
        registry.alias("a", "b");
        assert!(!registry.has_definition("a"));
        registry.register("a", Definition::new("A"));
        assert!(!registry.has_alias("a"));
    }
}
