use crate::builder::FrozenContainer;
use crate::config::{CompilerConfig, DumpFormat};
use crate::dumper::Dumper;
use crate::error::DiResult;

/// Writes the runtime artifact as JSON or YAML.
///
/// # Examples
///
/// ```rust
/// use di_compiler::artifact::CompiledContainer;
/// use di_compiler::dumper::{ArtifactDumper, Dumper};
/// use di_compiler::{ContainerBuilder, Definition, DumpFormat};
///
/// let mut builder = ContainerBuilder::new();
/// builder.register("clock", Definition::new("SystemClock").public());
/// let frozen = builder.compile().unwrap();
///
/// let json = ArtifactDumper::new(DumpFormat::Json).dump(&frozen).unwrap();
/// let loaded = CompiledContainer::from_json(&json).unwrap();
/// assert_eq!(loaded.construction_order, vec!["clock"]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactDumper {
    format: DumpFormat,
}

impl ArtifactDumper {
    pub fn new(format: DumpFormat) -> Self {
        Self { format }
    }

    /// Dumps in the config's `dump_format`.
    pub fn from_config(config: &CompilerConfig) -> Self {
        Self::new(config.dump_format)
    }

    pub fn format(&self) -> DumpFormat {
        self.format
    }
}

impl Dumper for ArtifactDumper {
    fn dump(&self, frozen: &FrozenContainer) -> DiResult<String> {
        let artifact = frozen.to_artifact();
        match self.format {
            DumpFormat::Json => artifact.to_json(),
            #[cfg(feature = "yaml")]
            DumpFormat::Yaml => artifact.to_yaml(),
        }
    }
}
