//! Resource freshness tracking.
//!
//! Every external input consulted while building the container (a loaded
//! file, a scanned directory, a subset of parameters) is tracked once per
//! compilation. A cached artifact is trusted only while every tracked
//! resource still reports itself fresh.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::DiResult;
use crate::parameter_bag::ParameterBag;
use crate::value::Value;

/// What a freshness check compares against.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessContext<'a> {
    /// When the artifact was built; newer inputs make it stale.
    pub timestamp: DateTime<Utc>,
    /// Current parameters, required by parameter resources.
    pub parameters: Option<&'a ParameterBag>,
}

impl<'a> FreshnessContext<'a> {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            parameters: None,
        }
    }

    pub fn with_parameters(mut self, parameters: &'a ParameterBag) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

/// A file whose modification time invalidates the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResource {
    pub path: PathBuf,
}

impl FileResource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn is_fresh(&self, timestamp: DateTime<Utc>) -> bool {
        modified_at(&self.path).is_some_and(|mtime| mtime <= timestamp)
    }
}

/// A directory: adding, removing or touching a direct entry invalidates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryResource {
    pub path: PathBuf,
}

impl DirectoryResource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn is_fresh(&self, timestamp: DateTime<Utc>) -> bool {
        let Some(mut newest) = modified_at(&self.path) else {
            return false;
        };
        let Ok(entries) = fs::read_dir(&self.path) else {
            return false;
        };
        for entry in entries.flatten() {
            if let Some(mtime) = modified_at(&entry.path()) {
                newest = newest.max(mtime);
            }
        }
        newest <= timestamp
    }
}

/// A hash over a named subset of resolved parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterResource {
    /// Sorted parameter names.
    pub names: Vec<String>,
    /// Hex SHA-256 of the canonical JSON of those parameters.
    pub hash: String,
}

impl ParameterResource {
    /// Snapshots `names` from `parameters`. Missing names hash as `null`.
    pub fn new<I, S>(names: I, parameters: &ParameterBag) -> DiResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        let hash = parameter_hash(&names, parameters)?;
        Ok(Self { names, hash })
    }

    pub fn is_fresh(&self, parameters: Option<&ParameterBag>) -> bool {
        let Some(parameters) = parameters else {
            return false;
        };
        parameter_hash(&self.names, parameters).is_ok_and(|hash| hash == self.hash)
    }
}

/// A tracked external input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    File(FileResource),
    Directory(DirectoryResource),
    Parameters(ParameterResource),
}

impl Resource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Resource::File(FileResource::new(path))
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Resource::Directory(DirectoryResource::new(path))
    }

    pub fn parameters<I, S>(names: I, parameters: &ParameterBag) -> DiResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ParameterResource::new(names, parameters).map(Resource::Parameters)
    }

    /// Identity used for deduplication.
    pub fn key(&self) -> String {
        match self {
            Resource::File(r) => format!("file:{}", r.path.display()),
            Resource::Directory(r) => format!("directory:{}", r.path.display()),
            Resource::Parameters(r) => format!("parameters:{}", r.names.join(",")),
        }
    }

    pub fn is_fresh(&self, ctx: &FreshnessContext<'_>) -> bool {
        match self {
            Resource::File(r) => r.is_fresh(ctx.timestamp),
            Resource::Directory(r) => r.is_fresh(ctx.timestamp),
            Resource::Parameters(r) => r.is_fresh(ctx.parameters),
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

/// Opaque token recording what an artifact was built from, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub created_at: DateTime<Utc>,
    /// Hex SHA-256 over the tracked resources.
    pub digest: String,
    pub resources: Vec<Resource>,
}

/// Collects the resources consulted during one compilation.
///
/// # Examples
///
/// ```rust
/// use di_compiler::{ParameterBag, Resource, ResourceTracker};
///
/// let mut params = ParameterBag::new();
/// params.set("locale", "en");
///
/// let mut tracker = ResourceTracker::new();
/// assert!(tracker.track(Resource::parameters(["locale"], &params).unwrap()));
/// assert!(!tracker.track(Resource::parameters(["locale"], &params).unwrap()));
///
/// let fingerprint = tracker.compute_fingerprint().unwrap();
/// assert_eq!(fingerprint.resources.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResourceTracker {
    resources: IndexMap<String, Resource>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `resource`; returns `false` when its key is already tracked.
    pub fn track(&mut self, resource: Resource) -> bool {
        let key = resource.key();
        if self.resources.contains_key(&key) {
            return false;
        }
        tracing::trace!(resource = %key, "tracking resource");
        self.resources.insert(key, resource);
        true
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn merge(&mut self, other: ResourceTracker) {
        for resource in other.resources.into_values() {
            self.track(resource);
        }
    }

    pub fn compute_fingerprint(&self) -> DiResult<Fingerprint> {
        self.compute_fingerprint_at(Utc::now())
    }

    pub fn compute_fingerprint_at(&self, created_at: DateTime<Utc>) -> DiResult<Fingerprint> {
        let resources: Vec<Resource> = self.resources.values().cloned().collect();
        let digest = sha256_hex(serde_json::to_string(&resources)?.as_bytes());
        Ok(Fingerprint {
            created_at,
            digest,
            resources,
        })
    }

    /// Whether `fingerprint` is still valid at `now`. Parameter resources
    /// are always stale here; use [`ResourceTracker::is_fresh_with`].
    pub fn is_fresh(fingerprint: &Fingerprint, now: DateTime<Utc>) -> bool {
        if fingerprint.created_at > now {
            tracing::debug!(created_at = %fingerprint.created_at, %now, "fingerprint is from the future");
            return false;
        }
        Self::is_fresh_with(fingerprint, &FreshnessContext::new(fingerprint.created_at))
    }

    /// Checks every resource against `ctx`, stopping at the first stale one.
    pub fn is_fresh_with(fingerprint: &Fingerprint, ctx: &FreshnessContext<'_>) -> bool {
        match fingerprint.resources.iter().find(|r| !r.is_fresh(ctx)) {
            Some(stale) => {
                tracing::debug!(resource = %stale, "stale resource");
                false
            }
            None => true,
        }
    }
}

fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let modified: SystemTime = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Utc>::from(modified))
}

fn parameter_hash(names: &[String], parameters: &ParameterBag) -> DiResult<String> {
    let subset: IndexMap<&str, &Value> = names
        .iter()
        .map(|name| (name.as_str(), parameters.all().get(name).unwrap_or(&Value::Null)))
        .collect();
    Ok(sha256_hex(serde_json::to_string(&subset)?.as_bytes()))
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn parameter_resource_detects_changes() {
        let mut params = ParameterBag::new();
        params.set("a", 1);
        params.set("b", "x");
        let resource = ParameterResource::new(["b", "a"], &params).unwrap();
        assert_eq!(resource.names, vec!["a", "b"]);
        assert!(resource.is_fresh(Some(&params)));

        params.set("unrelated", true);
        assert!(resource.is_fresh(Some(&params)));

        params.set("a", 2);
        assert!(!resource.is_fresh(Some(&params)));
        assert!(!resource.is_fresh(None));
    }

    #[test]
    fn missing_file_is_stale() {
        let resource = FileResource::new("/definitely/not/here.yaml");
        assert!(!resource.is_fresh(Utc::now()));
    }

    #[test]
    fn fingerprint_from_the_future_is_stale() {
        let tracker = ResourceTracker::new();
        let now = Utc::now();
        let fingerprint = tracker.compute_fingerprint_at(now + Duration::seconds(60)).unwrap();
        assert!(!ResourceTracker::is_fresh(&fingerprint, now));
        assert!(ResourceTracker::is_fresh(&fingerprint, now + Duration::seconds(120)));
    }

    #[test]
    fn digest_depends_on_resources() {
        let mut a = ResourceTracker::new();
        a.track(Resource::file("a.yaml"));
        let mut b = ResourceTracker::new();
        b.track(Resource::file("b.yaml"));
        let now = Utc::now();
        assert_ne!(
            a.compute_fingerprint_at(now).unwrap().digest,
            b.compute_fingerprint_at(now).unwrap().digest
        );
    }
}
