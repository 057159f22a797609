//! Compiler pass pipeline.
//!
//! Passes run in phase order; inside a phase by descending priority, then in
//! registration order. Each pass works on a scratch copy of the registry that
//! replaces the real one only when the pass succeeds, so a failing pass never
//! leaves the registry half rewritten.

mod cycles;
pub mod passes;

use std::fmt;

use crate::config::CompilerConfig;
use crate::error::{DiError, DiResult};
use crate::registry::Registry;
use crate::types::ClassCatalog;

pub use cycles::{CycleDetector, CycleReport, EdgeId};

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PassPhase {
    BeforeOptimization,
    Optimization,
    BeforeRemoval,
    Removal,
    AfterRemoval,
}

impl fmt::Display for PassPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PassPhase::BeforeOptimization => "before-optimization",
            PassPhase::Optimization => "optimization",
            PassPhase::BeforeRemoval => "before-removal",
            PassPhase::Removal => "removal",
            PassPhase::AfterRemoval => "after-removal",
        };
        f.write_str(name)
    }
}

/// A transformation or validation of the registry.
///
/// # Examples
///
/// ```rust
/// use di_compiler::compiler::{CompilationContext, CompilerPass, PassPhase};
/// use di_compiler::{ContainerBuilder, Definition, DiResult};
///
/// struct MakeEverythingPublic;
///
/// impl CompilerPass for MakeEverythingPublic {
///     fn name(&self) -> &str {
///         "MakeEverythingPublic"
///     }
///
///     fn process(&self, ctx: &mut CompilationContext<'_>) -> DiResult<()> {
///         for (_, def) in ctx.registry_mut().definitions_mut() {
///             def.public = true;
///         }
///         Ok(())
///     }
/// }
///
/// let mut builder = ContainerBuilder::new();
/// builder.register("mailer", Definition::new("Mailer"));
/// builder.add_pass(MakeEverythingPublic, PassPhase::BeforeOptimization, 0);
///
/// let frozen = builder.compile().unwrap();
/// assert!(frozen.registry().definition("mailer").unwrap().public);
/// ```
pub trait CompilerPass: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, ctx: &mut CompilationContext<'_>) -> DiResult<()>;
}

/// What a pass sees while it runs.
pub struct CompilationContext<'a> {
    registry: Registry,
    config: &'a CompilerConfig,
    catalog: &'a ClassCatalog,
    log: Vec<String>,
    removed: Vec<String>,
}

impl<'a> CompilationContext<'a> {
    pub fn new(registry: Registry, config: &'a CompilerConfig, catalog: &'a ClassCatalog) -> Self {
        Self {
            registry,
            config,
            catalog,
            log: Vec::new(),
            removed: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn config(&self) -> &CompilerConfig {
        self.config
    }

    pub fn catalog(&self) -> &ClassCatalog {
        self.catalog
    }

    /// Appends a line to the compiler log.
    pub fn log(&mut self, message: impl Into<String>) {
        self.log.push(message.into());
    }

    /// Records that `id` was removed from the registry on purpose.
    pub fn mark_removed(&mut self, id: impl Into<String>) {
        self.removed.push(id.into());
    }

    fn into_parts(self) -> (Registry, Vec<String>, Vec<String>) {
        (self.registry, self.log, self.removed)
    }
}

struct RegisteredPass {
    phase: PassPhase,
    priority: i32,
    seq: usize,
    pass: Box<dyn CompilerPass>,
}

/// The ordered set of passes a [`Compiler`] runs.
#[derive(Default)]
pub struct PassConfig {
    passes: Vec<RegisteredPass>,
    next_seq: usize,
}

impl fmt::Debug for PassConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.ordered().map(|p| format!("{}:{}:{}", p.phase, p.priority, p.pass.name())))
            .finish()
    }
}

impl PassConfig {
    /// An empty pipeline.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in pipeline for `config`.
    pub fn defaults(config: &CompilerConfig) -> Self {
        use passes::*;

        let mut pipeline = Self::empty();
        pipeline.add(DecoratorServicePass, PassPhase::BeforeOptimization, 0);

        pipeline.add(ResolveParameterPlaceholdersPass, PassPhase::Optimization, 100);
        pipeline.add(CheckDefinitionValidityPass, PassPhase::Optimization, 90);
        pipeline.add(ResolveTaggedCollectionsPass, PassPhase::Optimization, 80);
        pipeline.add(ResolveReferencesToAliasesPass, PassPhase::Optimization, 70);
        pipeline.add(ResolveInvalidReferencesPass, PassPhase::Optimization, 60);
        pipeline.add(CheckCircularReferencesPass, PassPhase::Optimization, -100);

        pipeline.add(RemovePrivateAliasesPass, PassPhase::Removal, 10);
        pipeline.add(RemoveAbstractDefinitionsPass, PassPhase::Removal, 5);
        if config.remove_unused {
            pipeline.add(RemoveUnusedDefinitionsPass, PassPhase::Removal, 0);
        }

        if config.check_types {
            pipeline.add(CheckTypeDeclarationsPass, PassPhase::AfterRemoval, 0);
        }
        pipeline
    }

    pub fn add(&mut self, pass: impl CompilerPass + 'static, phase: PassPhase, priority: i32) {
        self.add_boxed(Box::new(pass), phase, priority);
    }

    pub fn add_boxed(&mut self, pass: Box<dyn CompilerPass>, phase: PassPhase, priority: i32) {
        self.passes.push(RegisteredPass {
            phase,
            priority,
            seq: self.next_seq,
            pass,
        });
        self.next_seq += 1;
    }

    /// Removes every pass named `name`; returns how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.passes.len();
        self.passes.retain(|p| p.pass.name() != name);
        before - self.passes.len()
    }

    /// `(phase, priority, name)` for every pass, in execution order.
    pub fn passes(&self) -> Vec<(PassPhase, i32, &str)> {
        self.ordered().map(|p| (p.phase, p.priority, p.pass.name())).collect()
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    fn ordered(&self) -> impl Iterator<Item = &RegisteredPass> {
        let mut ordered: Vec<&RegisteredPass> = self.passes.iter().collect();
        ordered.sort_by(|a, b| {
            a.phase
                .cmp(&b.phase)
                .then(b.priority.cmp(&a.priority))
                .then(a.seq.cmp(&b.seq))
        });
        ordered.into_iter()
    }
}

/// Runs a [`PassConfig`] over a registry and keeps the compiler log.
#[derive(Debug, Default)]
pub struct Compiler {
    pass_config: PassConfig,
    log: Vec<String>,
    removed_ids: Vec<String>,
}

impl Compiler {
    pub fn new(pass_config: PassConfig) -> Self {
        Self {
            pass_config,
            log: Vec::new(),
            removed_ids: Vec::new(),
        }
    }

    pub fn pass_config(&self) -> &PassConfig {
        &self.pass_config
    }

    pub fn pass_config_mut(&mut self) -> &mut PassConfig {
        &mut self.pass_config
    }

    /// One line per pass action, `PassName: message`.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Ids removed by passes, in removal order.
    pub fn removed_ids(&self) -> &[String] {
        &self.removed_ids
    }

    /// Runs every pass. On failure the registry holds the result of the last
    /// successful pass and the error names the failing one.
    pub fn compile(
        &mut self,
        registry: &mut Registry,
        config: &CompilerConfig,
        catalog: &ClassCatalog,
    ) -> DiResult<()> {
        for registered in self.pass_config.ordered() {
            let name = registered.pass.name();
            tracing::debug!(pass = name, phase = %registered.phase, priority = registered.priority, "running compiler pass");

            let mut ctx = CompilationContext::new(registry.clone(), config, catalog);
            registered.pass.process(&mut ctx).map_err(|err| wrap_failure(name, err))?;

            let (scratch, log, removed) = ctx.into_parts();
            *registry = scratch;
            self.log.extend(log.into_iter().map(|line| format!("{name}: {line}")));
            self.removed_ids.extend(removed);
        }
        Ok(())
    }
}

fn wrap_failure(pass: &str, err: DiError) -> DiError {
    match err {
        already @ DiError::CompilerPassFailure { .. } => already,
        other => DiError::CompilerPassFailure {
            pass: pass.to_string(),
            source: Box::new(other),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recording {
        name: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    impl CompilerPass for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn process(&self, _ctx: &mut CompilationContext<'_>) -> DiResult<()> {
            self.seen.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    struct Failing;

    impl CompilerPass for Failing {
        fn name(&self) -> &str {
            "Failing"
        }

        fn process(&self, ctx: &mut CompilationContext<'_>) -> DiResult<()> {
            ctx.registry_mut().remove_definition("keep");
            Err(DiError::invalid("keep", "rejected"))
        }
    }

    #[test]
    fn passes_run_by_phase_priority_then_registration() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut config = PassConfig::empty();
        for (name, phase, priority) in [
            ("removal", PassPhase::Removal, 100),
            ("low", PassPhase::Optimization, 5),
            ("high", PassPhase::Optimization, 10),
            ("tie_first", PassPhase::Optimization, 0),
            ("tie_second", PassPhase::Optimization, 0),
            ("early", PassPhase::BeforeOptimization, -50),
        ] {
            config.add(Recording { name, seen: seen.clone() }, phase, priority);
        }

        let mut compiler = Compiler::new(config);
        compiler
            .compile(&mut Registry::new(), &CompilerConfig::default(), &ClassCatalog::new())
            .unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["early", "high", "low", "tie_first", "tie_second", "removal"]
        );
    }

    #[test]
    fn failing_pass_is_named_and_leaves_registry_untouched() {
        let mut registry = Registry::new();
        registry.register("keep", crate::definition::Definition::new("Keep"));
        let mut config = PassConfig::empty();
        config.add(Failing, PassPhase::Optimization, 0);

        let err = Compiler::new(config)
            .compile(&mut registry, &CompilerConfig::default(), &ClassCatalog::new())
            .unwrap_err();
        match &err {
            DiError::CompilerPassFailure { pass, source } => {
                assert_eq!(pass, "Failing");
                assert!(matches!(**source, DiError::InvalidDefinition { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(registry.has_definition("keep"));
    }

    #[test]
    fn pass_failures_are_not_wrapped_twice() {
        let inner = DiError::CompilerPassFailure {
            pass: "Inner".into(),
            source: Box::new(DiError::invalid("x", "y")),
        };
        match wrap_failure("Outer", inner) {
            DiError::CompilerPassFailure { pass, .. } => assert_eq!(pass, "Inner"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn default_pipeline_respects_config() {
        let all = PassConfig::defaults(&CompilerConfig::default());
        let names: Vec<&str> = all.passes().into_iter().map(|(_, _, n)| n).collect();
        assert_eq!(names.first(), Some(&"DecoratorServicePass"));
        assert_eq!(names.last(), Some(&"CheckTypeDeclarationsPass"));

        let lean = PassConfig::defaults(
            &CompilerConfig::default()
                .with_check_types(false)
                .with_remove_unused(false),
        );
        let names: Vec<&str> = lean.passes().into_iter().map(|(_, _, n)| n).collect();
        assert!(!names.contains(&"CheckTypeDeclarationsPass"));
        assert!(!names.contains(&"RemoveUnusedDefinitionsPass"));
    }
}
