use di_compiler::{CompilerConfig, ContainerBuilder, Definition, DumpFormat, PassConfig};
use serial_test::serial;
use std::env;

const VARS: &[&str] = &[
    "DI_COMPILER_TRACK_RESOURCES",
    "DI_COMPILER_CHECK_TYPES",
    "DI_COMPILER_REMOVE_UNUSED",
    "DI_COMPILER_DUMP_FORMAT",
    "DI_COMPILER_CACHE_DIR",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_defaults_without_environment() {
    clear_env();
    assert_eq!(CompilerConfig::from_env().unwrap(), CompilerConfig::default());
}

#[test]
#[serial]
fn test_environment_overrides_defaults() {
    clear_env();
    env::set_var("DI_COMPILER_TRACK_RESOURCES", "off");
    env::set_var("DI_COMPILER_REMOVE_UNUSED", "0");
    env::set_var("DI_COMPILER_DUMP_FORMAT", "JSON");
    env::set_var("DI_COMPILER_CACHE_DIR", "/var/cache/app");

    let config = CompilerConfig::from_env().unwrap();
    clear_env();

    assert!(!config.track_resources);
    assert!(!config.remove_unused);
    assert!(config.check_types);
    assert_eq!(config.dump_format, DumpFormat::Json);
    assert_eq!(config.cache_dir.as_deref(), Some(std::path::Path::new("/var/cache/app")));
    assert_eq!(config.cache_path("app"), std::path::PathBuf::from("/var/cache/app/app.json"));
}

#[test]
#[serial]
fn test_invalid_boolean_is_rejected() {
    clear_env();
    env::set_var("DI_COMPILER_CHECK_TYPES", "maybe");
    let result = CompilerConfig::from_env();
    clear_env();

    let err = result.unwrap_err();
    assert!(err.to_string().contains("DI_COMPILER_CHECK_TYPES expects a boolean"));
}

#[test]
#[serial]
fn test_environment_shapes_the_pipeline() {
    clear_env();
    env::set_var("DI_COMPILER_CHECK_TYPES", "false");
    let config = CompilerConfig::from_env().unwrap();
    clear_env();

    let names: Vec<String> = PassConfig::defaults(&config)
        .passes()
        .into_iter()
        .map(|(_, _, name)| name.to_string())
        .collect();
    assert!(!names.iter().any(|n| n == "CheckTypeDeclarationsPass"));

    let mut builder = ContainerBuilder::with_config(config.with_track_resources(false));
    builder.register("a", Definition::new("A").public());
    let frozen = builder.compile().unwrap();
    assert!(frozen.fingerprint().is_none());
}

#[test]
fn test_config_file_keeps_missing_keys_at_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("compiler.json");
    std::fs::write(&path, r#"{ "check_types": false }"#).unwrap();

    let config = CompilerConfig::from_json_file(&path).unwrap();
    assert!(!config.check_types);
    assert!(config.remove_unused);
    assert!(config.track_resources);
}
