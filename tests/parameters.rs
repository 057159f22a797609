use di_compiler::{ContainerBuilder, Definition, DiError, ParameterBag, Value};
use indexmap::IndexMap;
use proptest::prelude::*;

#[test]
fn test_exact_placeholder_keeps_native_type() {
    let mut bag = ParameterBag::new();
    bag.set("workers", 8);
    bag.set("ratio", 0.5);
    bag.set("debug", true);
    bag.set("hosts", vec!["a", "b"]);
    bag.set("pool", "%workers%");
    bag.set("sample", "%ratio%");
    bag.set("verbose", "%debug%");
    bag.set("mirrors", "%hosts%");

    let resolved = bag.resolve_all().unwrap();
    assert_eq!(resolved.get("pool").unwrap(), &Value::Int(8));
    assert_eq!(resolved.get("sample").unwrap(), &Value::Float(0.5));
    assert_eq!(resolved.get("verbose").unwrap(), &Value::Bool(true));
    assert_eq!(resolved.get("mirrors").unwrap(), &Value::from(vec!["a", "b"]));
}

#[test]
fn test_embedded_placeholders_produce_strings() {
    let mut bag = ParameterBag::new();
    bag.set("host", "db");
    bag.set("port", 5432);
    bag.set("debug", false);
    bag.set("dsn", "%host%:%port% debug=%debug%");

    let resolved = bag.resolve_all().unwrap();
    assert_eq!(resolved.get("dsn").unwrap(), &Value::from("db:5432 debug=false"));
}

#[test]
fn test_nested_resolution_inside_lists_and_maps() {
    let mut bag = ParameterBag::new();
    bag.set("root", "/srv");
    let mut map = IndexMap::new();
    map.insert("%root%/cache".to_string(), Value::from("%root%/var"));
    bag.set("paths", Value::Map(map));
    bag.set("dirs", vec!["%root%/a", "%root%/b"]);

    let resolved = bag.resolve_all().unwrap();
    let Value::Map(paths) = resolved.get("paths").unwrap() else {
        panic!("expected a map");
    };
    assert_eq!(paths.get("/srv/cache"), Some(&Value::from("/srv/var")));
    assert_eq!(resolved.get("dirs").unwrap(), &Value::from(vec!["/srv/a", "/srv/b"]));
}

#[test]
fn test_escaped_percent_is_unescaped_exactly_once() {
    let mut bag = ParameterBag::new();
    bag.set("pattern", "100%%");
    bag.set("copy", "%pattern%");
    bag.set("literal", "%%not_a_param%%");

    let resolved = bag.resolve_all().unwrap();
    assert_eq!(resolved.get("pattern").unwrap(), &Value::from("100%"));
    assert_eq!(resolved.get("copy").unwrap(), &Value::from("100%"));
    assert_eq!(resolved.get("literal").unwrap(), &Value::from("%not_a_param%"));

    // resolving again is a no-op
    let again = resolved.resolve_all().unwrap();
    assert_eq!(again, resolved);
}

#[test]
fn test_circular_parameters_report_the_chain() {
    let mut bag = ParameterBag::new();
    bag.set("a", "%b%");
    bag.set("b", "x-%c%");
    bag.set("c", "%a%");

    match bag.resolve_all() {
        Err(DiError::ParameterCircularReference { chain }) => {
            assert_eq!(chain, vec!["a", "b", "c"]);
        }
        other => panic!("expected circular reference, got {other:?}"),
    }
}

#[test]
fn test_unknown_parameter_suggests_a_close_name() {
    let mut bag = ParameterBag::new();
    bag.set("database_host", "db");
    bag.set("x", "%database_hots%");

    match bag.resolve_all() {
        Err(DiError::ParameterNotFound { name, suggestion }) => {
            assert_eq!(name, "database_hots");
            assert_eq!(suggestion.as_deref(), Some("database_host"));
        }
        other => panic!("expected missing parameter, got {other:?}"),
    }
}

#[test]
fn test_names_are_case_sensitive() {
    let mut bag = ParameterBag::new();
    bag.set("Locale", "fr");
    bag.set("x", "%locale%");
    assert!(matches!(bag.resolve_all(), Err(DiError::ParameterNotFound { .. })));
}

#[test]
fn test_list_embedded_in_string_is_invalid() {
    let mut bag = ParameterBag::new();
    bag.set("hosts", vec!["a", "b"]);
    bag.set("x", "hosts: %hosts%");
    assert!(matches!(
        bag.resolve_all(),
        Err(DiError::InvalidParameterValue { ref name, .. }) if name == "hosts"
    ));
}

#[test]
fn test_definitions_receive_resolved_parameters() {
    let mut builder = ContainerBuilder::new();
    builder.set_parameter("mailer.class", "SmtpMailer");
    builder.set_parameter("mailer.port", 25);
    builder.set_parameter("mailer.dsn", "smtp://localhost:%mailer.port%");
    builder.register(
        "mailer",
        Definition::new("%mailer.class%")
            .arg("%mailer.dsn%")
            .arg("%mailer.port%")
            .arg("50%%")
            .public(),
    );

    let frozen = builder.compile().unwrap();
    let mailer = frozen.registry().definition("mailer").unwrap();
    assert_eq!(mailer.class.as_deref(), Some("SmtpMailer"));
    assert_eq!(
        mailer.arguments,
        vec![Value::from("smtp://localhost:25"), Value::Int(25), Value::from("50%")]
    );
    assert!(frozen.registry().parameters().is_resolved());
}

#[test]
fn test_missing_parameter_fails_compilation() {
    let mut builder = ContainerBuilder::new();
    builder.register("a", Definition::new("A").arg("%nope%").public());

    match builder.compile() {
        Err(DiError::CompilerPassFailure { pass, source }) => {
            assert_eq!(pass, "ResolveParameterPlaceholdersPass");
            assert!(matches!(*source, DiError::ParameterNotFound { .. }));
        }
        other => panic!("expected pass failure, got {other:?}"),
    }
}

fn parameter_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Int),
        any::<bool>().prop_map(Value::Bool),
        "[a-z %]{0,12}".prop_map(Value::from),
        (0usize..4).prop_map(|i| Value::from(format!("%p{i}%"))),
        (0usize..4).prop_map(|i| Value::from(format!("x-%p{i}%-y"))),
    ]
}

proptest! {
    #[test]
    fn resolution_is_idempotent(values in proptest::collection::vec(parameter_value(), 1..6)) {
        let mut bag = ParameterBag::new();
        for (i, value) in values.into_iter().enumerate() {
            bag.set(format!("p{i}"), value);
        }

        if let Ok(resolved) = bag.resolve_all() {
            prop_assert!(resolved.is_resolved());
            prop_assert_eq!(resolved.len(), bag.len());
            let again = resolved.resolve_all().unwrap();
            prop_assert_eq!(again, resolved);
        }
    }
}

#[test]
fn test_self_reference_names_only_itself() {
    let mut bag = ParameterBag::new();
    bag.set("a", "%a%");
    match bag.resolve_all() {
        Err(DiError::ParameterCircularReference { chain }) => assert_eq!(chain, vec!["a"]),
        other => panic!("expected circular reference, got {other:?}"),
    }
}
