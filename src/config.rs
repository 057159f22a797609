//! Compiler configuration.
//!
//! Settings come from code, a JSON file, or `DI_COMPILER_*` environment
//! variables layered over the defaults.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DiError, DiResult};

/// Prefix of every environment variable read by [`CompilerConfig::from_env`].
pub const ENV_PREFIX: &str = "DI_COMPILER";

/// Serialization format of the compiled artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpFormat {
    #[default]
    Json,
    #[cfg(feature = "yaml")]
    Yaml,
}

impl DumpFormat {
    /// File extension conventionally used for the format.
    pub fn extension(self) -> &'static str {
        match self {
            DumpFormat::Json => "json",
            #[cfg(feature = "yaml")]
            DumpFormat::Yaml => "yaml",
        }
    }
}

impl std::str::FromStr for DumpFormat {
    type Err = DiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(DumpFormat::Json),
            #[cfg(feature = "yaml")]
            "yaml" | "yml" => Ok(DumpFormat::Yaml),
            other => Err(DiError::Serialization(format!("unknown dump format \"{other}\""))),
        }
    }
}

/// Knobs controlling which default passes run and what the builder records.
///
/// # Examples
///
/// ```rust
/// use di_compiler::{CompilerConfig, DumpFormat};
///
/// let config = CompilerConfig::default();
/// assert!(config.track_resources);
/// assert!(config.check_types);
/// assert!(config.remove_unused);
/// assert_eq!(config.dump_format, DumpFormat::Json);
///
/// let config: CompilerConfig = serde_json::from_str(r#"{"remove_unused": false}"#).unwrap();
/// assert!(!config.remove_unused);
/// assert!(config.check_types);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Record resources consulted during the build for cache freshness.
    pub track_resources: bool,
    /// Register `CheckTypeDeclarationsPass`.
    pub check_types: bool,
    /// Register `RemoveUnusedDefinitionsPass`.
    pub remove_unused: bool,
    /// Format of [`FrozenContainer::dump_artifact`](crate::FrozenContainer::dump_artifact)
    /// and of artifacts cached through [`cache_path`](Self::cache_path).
    pub dump_format: DumpFormat,
    /// Directory behind [`cache_path`](Self::cache_path); `di-compiler` under
    /// the system temp directory when unset.
    pub cache_dir: Option<PathBuf>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            track_resources: true,
            check_types: true,
            remove_unused: true,
            dump_format: DumpFormat::Json,
            cache_dir: None,
        }
    }
}

impl CompilerConfig {
    /// Defaults overridden by `DI_COMPILER_TRACK_RESOURCES`,
    /// `DI_COMPILER_CHECK_TYPES`, `DI_COMPILER_REMOVE_UNUSED`,
    /// `DI_COMPILER_DUMP_FORMAT` and `DI_COMPILER_CACHE_DIR`.
    pub fn from_env() -> DiResult<Self> {
        Self::default().merge_env()
    }

    /// Applies the environment on top of `self`.
    pub fn merge_env(mut self) -> DiResult<Self> {
        if let Some(v) = env_value("track_resources") {
            self.track_resources = parse_bool("track_resources", &v)?;
        }
        if let Some(v) = env_value("check_types") {
            self.check_types = parse_bool("check_types", &v)?;
        }
        if let Some(v) = env_value("remove_unused") {
            self.remove_unused = parse_bool("remove_unused", &v)?;
        }
        if let Some(v) = env_value("dump_format") {
            self.dump_format = v.parse()?;
        }
        if let Some(v) = env_value("cache_dir") {
            self.cache_dir = (!v.is_empty()).then(|| PathBuf::from(v));
        }
        Ok(self)
    }

    /// Reads a JSON configuration file. Missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> DiResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| DiError::io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn with_track_resources(mut self, enabled: bool) -> Self {
        self.track_resources = enabled;
        self
    }

    pub fn with_check_types(mut self, enabled: bool) -> Self {
        self.check_types = enabled;
        self
    }

    pub fn with_remove_unused(mut self, enabled: bool) -> Self {
        self.remove_unused = enabled;
        self
    }

    pub fn with_dump_format(mut self, format: DumpFormat) -> Self {
        self.dump_format = format;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Where the artifact called `name` is cached: `<cache_dir>/<name>.<ext>`,
    /// the extension following `dump_format`.
    pub fn cache_path(&self, name: &str) -> PathBuf {
        let dir = match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => env::temp_dir().join("di-compiler"),
        };
        dir.join(format!("{name}.{}", self.dump_format.extension()))
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(format!("{}_{}", ENV_PREFIX, key.to_uppercase())).ok()
}

fn parse_bool(key: &str, value: &str) -> DiResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(DiError::Serialization(format!(
            "{ENV_PREFIX}_{} expects a boolean, got \"{other}\"",
            key.to_uppercase()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booleans_accept_common_spellings() {
        assert!(parse_bool("x", "Yes").unwrap());
        assert!(!parse_bool("x", "off").unwrap());
        assert!(parse_bool("x", "maybe").is_err());
    }

    #[test]
    fn cache_path_follows_dir_and_format() {
        let config = CompilerConfig::default().with_cache_dir("/var/cache/app");
        assert_eq!(config.cache_path("container"), PathBuf::from("/var/cache/app/container.json"));
        assert!(CompilerConfig::default().cache_path("c").starts_with(env::temp_dir()));
    }

    #[test]
    fn dump_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<DumpFormat>().unwrap(), DumpFormat::Json);
        assert!("xml".parse::<DumpFormat>().is_err());
    }
}
