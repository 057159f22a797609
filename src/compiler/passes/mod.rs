//! Built-in compiler passes.
//!
//! [`PassConfig::defaults`](super::PassConfig::defaults) registers all of
//! them except [`CollectTaggedServicesPass`], which is configured per
//! consumer by the application.

mod aliases;
mod circular;
mod decorators;
mod invalid_references;
mod parameters;
mod removal;
mod tagged;
mod type_declarations;
mod validity;

pub use aliases::{RemovePrivateAliasesPass, ResolveReferencesToAliasesPass};
pub use circular::CheckCircularReferencesPass;
pub use decorators::DecoratorServicePass;
pub use invalid_references::ResolveInvalidReferencesPass;
pub use parameters::ResolveParameterPlaceholdersPass;
pub use removal::{RemoveAbstractDefinitionsPass, RemoveUnusedDefinitionsPass};
pub use tagged::{CollectTaggedServicesPass, ResolveTaggedCollectionsPass};
pub use type_declarations::CheckTypeDeclarationsPass;
pub use validity::CheckDefinitionValidityPass;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::compiler::{CompilationContext, CompilerPass};
    use crate::config::CompilerConfig;
    use crate::error::DiResult;
    use crate::registry::Registry;
    use crate::types::ClassCatalog;

    /// Runs `pass` alone and returns the rewritten registry with its log.
    pub fn run(pass: &dyn CompilerPass, registry: Registry) -> DiResult<(Registry, Vec<String>)> {
        run_with_catalog(pass, registry, &ClassCatalog::new())
    }

    pub fn run_with_catalog(
        pass: &dyn CompilerPass,
        registry: Registry,
        catalog: &ClassCatalog,
    ) -> DiResult<(Registry, Vec<String>)> {
        let config = CompilerConfig::default();
        let mut ctx = CompilationContext::new(registry, &config, catalog);
        pass.process(&mut ctx)?;
        let (registry, log, _) = ctx.into_parts();
        Ok((registry, log))
    }
}
