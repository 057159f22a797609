//! On-disk artifact cache.
//!
//! The artifact is stored at the cache path and its [`Fingerprint`] in a
//! `<path>.meta` sidecar. Both are written to a temporary file in the same
//! directory and renamed into place, so readers only ever see complete files.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::artifact::CompiledContainer;
use crate::builder::ContainerBuilder;
use crate::config::{CompilerConfig, DumpFormat};
use crate::dumper::{ArtifactDumper, Dumper};
use crate::error::{DiError, DiResult};
use crate::parameter_bag::ParameterBag;
use crate::resource::{Fingerprint, FreshnessContext, ResourceTracker};
use crate::runtime::{Container, ServiceFactories};

/// One cached artifact and its fingerprint sidecar.
#[derive(Debug, Clone)]
pub struct ConfigCache {
    path: PathBuf,
}

impl ConfigCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta_path(&self) -> PathBuf {
        let mut meta = self.path.clone().into_os_string();
        meta.push(".meta");
        PathBuf::from(meta)
    }

    /// Format implied by the cache path's extension.
    pub fn format(&self) -> DumpFormat {
        match self.path.extension().and_then(|e| e.to_str()) {
            #[cfg(feature = "yaml")]
            Some("yaml" | "yml") => DumpFormat::Yaml,
            _ => DumpFormat::Json,
        }
    }

    /// The stored fingerprint, or `None` when the sidecar is missing.
    pub fn fingerprint(&self) -> DiResult<Option<Fingerprint>> {
        let meta = self.meta_path();
        match fs::read_to_string(&meta) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(DiError::io(meta, err)),
        }
    }

    /// Whether the artifact exists and every tracked resource is unchanged.
    ///
    /// Parameter resources compare against `parameters`; without them they
    /// are stale. A missing or unreadable sidecar is stale.
    pub fn is_fresh(&self, parameters: Option<&ParameterBag>) -> bool {
        if !self.path.is_file() {
            return false;
        }
        let fingerprint = match self.fingerprint() {
            Ok(Some(fingerprint)) => fingerprint,
            Ok(None) => return false,
            Err(err) => {
                tracing::debug!(path = %self.path.display(), error = %err, "unreadable cache metadata");
                return false;
            }
        };
        if fingerprint.created_at > Utc::now() {
            return false;
        }
        let mut ctx = FreshnessContext::new(fingerprint.created_at);
        if let Some(parameters) = parameters {
            ctx = ctx.with_parameters(parameters);
        }
        ResourceTracker::is_fresh_with(&fingerprint, &ctx)
    }

    /// Atomically replaces the artifact, then its sidecar.
    pub fn write(&self, content: &str, fingerprint: &Fingerprint) -> DiResult<()> {
        let meta = serde_json::to_string_pretty(fingerprint)?;
        write_atomic(&self.path, content.as_bytes())?;
        write_atomic(&self.meta_path(), meta.as_bytes())
    }

    pub fn read(&self) -> DiResult<String> {
        fs::read_to_string(&self.path).map_err(|e| DiError::io(&self.path, e))
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> DiResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| DiError::io(dir, e))?;

    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| DiError::io(dir, e))?;
    temp.write_all(content).map_err(|e| DiError::io(temp.path(), e))?;
    temp.as_file().sync_all().map_err(|e| DiError::io(temp.path(), e))?;
    temp.persist(path).map_err(|e| DiError::io(path, e.error))?;
    Ok(())
}

/// Loads a runtime container from a [`ConfigCache`], recompiling when stale.
#[derive(Debug)]
pub struct ContainerCache;

impl ContainerCache {
    /// Returns a container over the cached artifact when it is fresh.
    /// Otherwise runs `build`, compiles the result, writes the cache and
    /// returns a container over the new artifact.
    ///
    /// When `build` or compilation fails the previous cache files are left
    /// untouched.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use di_compiler::cache::ContainerCache;
    /// use di_compiler::runtime::{Instance, Service, ServiceFactories};
    /// use di_compiler::{ContainerBuilder, Definition};
    ///
    /// struct Clock;
    /// impl Service for Clock {}
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let path = dir.path().join("container.json");
    /// let factories = ServiceFactories::new().with("Clock", |_| Ok(Arc::new(Clock) as Instance));
    ///
    /// let build = || {
    ///     let mut builder = ContainerBuilder::new();
    ///     builder.register("clock", Definition::new("Clock").public());
    ///     Ok(builder)
    /// };
    /// let container = ContainerCache::load_or_build(&path, factories.clone(), build).unwrap();
    /// assert!(container.has("clock"));
    /// assert!(path.exists());
    /// ```
    pub fn load_or_build<F>(path: impl AsRef<Path>, factories: ServiceFactories, build: F) -> DiResult<Container>
    where
        F: FnOnce() -> DiResult<ContainerBuilder>,
    {
        Self::load_or_build_with(path, factories, None, build)
    }

    /// Like [`load_or_build`](Self::load_or_build), with the current values
    /// of tracked parameters. A cache tracking parameter resources is only
    /// reused when `parameters` is given and those values are unchanged.
    pub fn load_or_build_with<F>(
        path: impl AsRef<Path>,
        factories: ServiceFactories,
        parameters: Option<&ParameterBag>,
        build: F,
    ) -> DiResult<Container>
    where
        F: FnOnce() -> DiResult<ContainerBuilder>,
    {
        let cache = ConfigCache::new(path.as_ref());
        if cache.is_fresh(parameters) {
            match cache.read().and_then(|content| CompiledContainer::parse(cache.path(), &content)) {
                Ok(artifact) => {
                    tracing::debug!(path = %cache.path().display(), "using cached container");
                    return Ok(Container::new(artifact, factories));
                }
                Err(err) => {
                    tracing::warn!(path = %cache.path().display(), error = %err, "discarding unreadable cached container");
                }
            }
        }

        let frozen = build()?.compile()?;
        let content = ArtifactDumper::new(cache.format()).dump(&frozen)?;
        let fingerprint = match frozen.fingerprint() {
            Some(fingerprint) => fingerprint.clone(),
            None => ResourceTracker::new().compute_fingerprint_at(frozen.compiled_at())?,
        };
        cache.write(&content, &fingerprint)?;
        tracing::info!(
            path = %cache.path().display(),
            resources = fingerprint.resources.len(),
            "container cache rebuilt"
        );
        Ok(frozen.into_container(factories))
    }

    /// Caches under [`CompilerConfig::cache_path`] for `name`, in the
    /// configured dump format.
    pub fn load_or_build_in<F>(
        config: &CompilerConfig,
        name: &str,
        factories: ServiceFactories,
        parameters: Option<&ParameterBag>,
        build: F,
    ) -> DiResult<Container>
    where
        F: FnOnce() -> DiResult<ContainerBuilder>,
    {
        Self::load_or_build_with(config.cache_path(name), factories, parameters, build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;

    #[test]
    fn meta_path_appends_suffix() {
        let cache = ConfigCache::new("/tmp/cache/container.json");
        assert_eq!(cache.meta_path(), PathBuf::from("/tmp/cache/container.json.meta"));
    }

    #[test]
    fn missing_files_are_stale() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ConfigCache::new(dir.path().join("container.json"));
        assert!(!cache.is_fresh(None));
        assert!(cache.fingerprint().unwrap().is_none());
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ConfigCache::new(dir.path().join("nested/container.json"));
        let fingerprint = ResourceTracker::new().compute_fingerprint().unwrap();

        cache.write("{}", &fingerprint).unwrap();
        assert_eq!(cache.read().unwrap(), "{}");
        assert_eq!(cache.fingerprint().unwrap(), Some(fingerprint));
        assert!(cache.is_fresh(None));
    }

    #[test]
    fn parameter_resources_need_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ConfigCache::new(dir.path().join("container.json"));
        let mut params = ParameterBag::new();
        params.set("env", "prod");

        let mut tracker = ResourceTracker::new();
        tracker.track(Resource::parameters(["env"], &params).unwrap());
        cache.write("{}", &tracker.compute_fingerprint().unwrap()).unwrap();

        assert!(!cache.is_fresh(None));
        assert!(cache.is_fresh(Some(&params)));
        params.set("env", "dev");
        assert!(!cache.is_fresh(Some(&params)));
    }
}
