use di_compiler::runtime::{Instance, Service, ServiceFactories};
use di_compiler::{
    CompilerConfig, ConfigCache, ContainerBuilder, ContainerCache, Definition, DiError, FileLoader, FreshnessContext,
    ParameterBag, Resource, ResourceTracker,
};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

struct Clock;
impl Service for Clock {}

fn touch_in_future(path: &Path) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(60)).unwrap();
}

fn clock_factories() -> ServiceFactories {
    ServiceFactories::new().with("Clock", |_| Ok(Arc::new(Clock) as Instance))
}

const SERVICES: &str = r#"{ "services": { "clock": { "class": "Clock", "public": true } } }"#;

// ===== Resources =====

#[test]
fn test_file_resource_goes_stale_when_modified() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("services.json");
    fs::write(&path, SERVICES).unwrap();

    let mut tracker = ResourceTracker::new();
    tracker.track(Resource::file(&path));
    let fingerprint = tracker.compute_fingerprint().unwrap();
    assert!(ResourceTracker::is_fresh(&fingerprint, chrono::Utc::now()));

    touch_in_future(&path);
    assert!(!ResourceTracker::is_fresh(&fingerprint, chrono::Utc::now()));
}

#[test]
fn test_untracked_file_does_not_matter() {
    let dir = tempfile::tempdir().unwrap();
    let tracked = dir.path().join("services.json");
    let untracked = dir.path().join("notes.txt");
    fs::write(&tracked, SERVICES).unwrap();
    fs::write(&untracked, "todo").unwrap();

    let mut tracker = ResourceTracker::new();
    tracker.track(Resource::file(&tracked));
    let fingerprint = tracker.compute_fingerprint().unwrap();

    touch_in_future(&untracked);
    assert!(ResourceTracker::is_fresh(&fingerprint, chrono::Utc::now()));
}

#[test]
fn test_deleted_file_is_stale() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("services.json");
    fs::write(&path, SERVICES).unwrap();

    let mut tracker = ResourceTracker::new();
    tracker.track(Resource::file(&path));
    let fingerprint = tracker.compute_fingerprint().unwrap();

    fs::remove_file(&path).unwrap();
    assert!(!ResourceTracker::is_fresh(&fingerprint, chrono::Utc::now()));
}

#[test]
fn test_directory_resource_sees_touched_entries() {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("config");
    fs::create_dir(&config_dir).unwrap();
    let entry = config_dir.join("a.yaml");
    fs::write(&entry, "services: ~").unwrap();

    let mut tracker = ResourceTracker::new();
    tracker.track(Resource::directory(&config_dir));
    let fingerprint = tracker.compute_fingerprint().unwrap();
    assert!(ResourceTracker::is_fresh(&fingerprint, chrono::Utc::now()));

    touch_in_future(&entry);
    assert!(!ResourceTracker::is_fresh(&fingerprint, chrono::Utc::now()));
}

#[test]
fn test_parameter_resource_compares_values() {
    let mut params = ParameterBag::new();
    params.set("env", "prod");
    params.set("debug", false);

    let mut tracker = ResourceTracker::new();
    tracker.track(Resource::parameters(["env", "debug"], &params).unwrap());
    let fingerprint = tracker.compute_fingerprint().unwrap();

    let ctx = FreshnessContext::new(fingerprint.created_at).with_parameters(&params);
    assert!(ResourceTracker::is_fresh_with(&fingerprint, &ctx));
    // untracked parameters do not matter
    let mut unrelated = params.clone();
    unrelated.set("locale", "fr");
    let ctx = FreshnessContext::new(fingerprint.created_at).with_parameters(&unrelated);
    assert!(ResourceTracker::is_fresh_with(&fingerprint, &ctx));

    let mut changed = params.clone();
    changed.set("debug", true);
    let ctx = FreshnessContext::new(fingerprint.created_at).with_parameters(&changed);
    assert!(!ResourceTracker::is_fresh_with(&fingerprint, &ctx));
}

#[test]
fn test_fingerprint_from_the_future_is_stale() {
    let fingerprint = ResourceTracker::new()
        .compute_fingerprint_at(chrono::Utc::now() + chrono::Duration::hours(1))
        .unwrap();
    assert!(!ResourceTracker::is_fresh(&fingerprint, chrono::Utc::now()));
}

#[test]
fn test_loaded_files_are_tracked() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("services.json");
    fs::write(&path, SERVICES).unwrap();

    let mut builder = ContainerBuilder::new();
    FileLoader::new(&mut builder).load(&path).unwrap();
    let frozen = builder.compile().unwrap();

    let fingerprint = frozen.fingerprint().unwrap();
    assert_eq!(fingerprint.created_at, frozen.compiled_at());
    assert_eq!(fingerprint.resources, vec![Resource::file(fs::canonicalize(&path).unwrap())]);
}

// ===== Container Cache =====

#[test]
fn test_cache_rebuilds_only_when_stale() {
    let dir = tempfile::tempdir().unwrap();
    let services = dir.path().join("services.json");
    fs::write(&services, SERVICES).unwrap();
    let cache_path = dir.path().join("cache/container.json");

    let builds = AtomicUsize::new(0);
    let load = || {
        ContainerCache::load_or_build(&cache_path, clock_factories(), || {
            builds.fetch_add(1, Ordering::SeqCst);
            let mut builder = ContainerBuilder::new();
            FileLoader::new(&mut builder).load(&services)?;
            Ok(builder)
        })
        .unwrap()
    };

    assert!(load().has("clock"));
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(ConfigCache::new(&cache_path).is_fresh(None));

    assert!(load().get("clock").is_ok());
    assert_eq!(builds.load(Ordering::SeqCst), 1);

    touch_in_future(&services);
    assert!(!ConfigCache::new(&cache_path).is_fresh(None));
    assert!(load().has("clock"));
    assert_eq!(builds.load(Ordering::SeqCst), 2);
}

#[test]
fn test_tracked_parameters_reuse_cache_while_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("container.json");

    let builds = AtomicUsize::new(0);
    let load = |params: Option<&ParameterBag>| {
        let current = params.cloned().unwrap_or_default();
        ContainerCache::load_or_build_with(&cache_path, clock_factories(), params, || {
            builds.fetch_add(1, Ordering::SeqCst);
            let mut builder = ContainerBuilder::new();
            for (name, value) in current.all() {
                builder.set_parameter(name.clone(), value.clone());
            }
            builder.add_resource(Resource::parameters(["env"], builder.parameters())?);
            builder.register("clock", Definition::new("Clock").public());
            Ok(builder)
        })
        .unwrap()
    };

    let mut params = ParameterBag::new();
    params.set("env", "prod");
    load(Some(&params));
    load(Some(&params));
    assert_eq!(builds.load(Ordering::SeqCst), 1);

    params.set("env", "dev");
    assert!(load(Some(&params)).has("clock"));
    assert_eq!(builds.load(Ordering::SeqCst), 2);

    // without current values the tracked parameters cannot be checked
    load(None);
    assert_eq!(builds.load(Ordering::SeqCst), 3);
}

#[test]
fn test_cache_location_follows_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = CompilerConfig::default().with_cache_dir(dir.path().join("cache"));
    let build = || -> Result<ContainerBuilder, DiError> {
        let mut builder = ContainerBuilder::new();
        builder.register("clock", Definition::new("Clock").public());
        Ok(builder)
    };

    let container = ContainerCache::load_or_build_in(&config, "app", clock_factories(), None, build).unwrap();
    assert!(container.has("clock"));
    assert!(dir.path().join("cache/app.json").is_file());
    assert!(ConfigCache::new(config.cache_path("app")).is_fresh(None));
}

#[test]
fn test_failed_rebuild_keeps_previous_cache() {
    let dir = tempfile::tempdir().unwrap();
    let services = dir.path().join("services.json");
    fs::write(&services, SERVICES).unwrap();
    let cache_path = dir.path().join("container.json");

    let build_from_file = || -> Result<ContainerBuilder, DiError> {
        let mut builder = ContainerBuilder::new();
        FileLoader::new(&mut builder).load(&services)?;
        Ok(builder)
    };
    ContainerCache::load_or_build(&cache_path, clock_factories(), build_from_file).unwrap();
    let before = fs::read_to_string(&cache_path).unwrap();
    let meta_before = fs::read_to_string(ConfigCache::new(&cache_path).meta_path()).unwrap();

    // a broken edit: the referenced service does not exist
    fs::write(
        &services,
        r#"{ "services": { "clock": { "class": "Clock", "arguments": ["@missing"], "public": true } } }"#,
    )
    .unwrap();
    touch_in_future(&services);

    let err = ContainerCache::load_or_build(&cache_path, clock_factories(), build_from_file).unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(fs::read_to_string(&cache_path).unwrap(), before);
    assert_eq!(
        fs::read_to_string(ConfigCache::new(&cache_path).meta_path()).unwrap(),
        meta_before
    );
}

#[test]
fn test_corrupt_cache_is_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("container.json");
    let build = || -> Result<ContainerBuilder, DiError> {
        let mut builder = ContainerBuilder::new();
        builder.register("clock", Definition::new("Clock").public());
        Ok(builder)
    };
    ContainerCache::load_or_build(&cache_path, clock_factories(), build).unwrap();

    fs::write(&cache_path, "{ not json").unwrap();
    let container = ContainerCache::load_or_build(&cache_path, clock_factories(), build).unwrap();
    assert!(container.has("clock"));
    assert!(fs::read_to_string(&cache_path).unwrap().contains("\"clock\""));
}

#[cfg(feature = "yaml")]
#[test]
fn test_yaml_cache_path_writes_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("container.yaml");
    let build = || -> Result<ContainerBuilder, DiError> {
        let mut builder = ContainerBuilder::new();
        builder.register("clock", Definition::new("Clock").public());
        Ok(builder)
    };
    ContainerCache::load_or_build(&cache_path, clock_factories(), build).unwrap();

    let content = fs::read_to_string(&cache_path).unwrap();
    assert!(!content.trim_start().starts_with('{'));
    let container = ContainerCache::load_or_build(&cache_path, clock_factories(), build).unwrap();
    assert!(container.has("clock"));
}
