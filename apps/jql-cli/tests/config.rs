#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::Write;
use std::path::Path;

use jql_cli::config::AppConfig;
use jql_cli::logging::LogFormat;
use modkit_resource::Value;
use modkit_security::Identity;

fn sample() -> AppConfig {
    AppConfig::load(&Path::new(env!("CARGO_MANIFEST_DIR")).join("jql.example.yaml")).unwrap()
}

fn write_config(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[test]
fn sample_config_loads_with_defaults_filled_in() {
    let config = sample();
    assert_eq!(config.query.max_page_size, 50);
    assert_eq!(config.query.max_filter_depth, 16);
    assert_eq!(config.logging.format, LogFormat::Text);
    assert_eq!(config.registry.resources.len(), 2);
    assert_eq!(config.seed["orders"].len(), 3);
}

#[tokio::test]
async fn sample_service_answers_queries() {
    let service = sample().into_service().unwrap();
    let user = Identity::builder().subject_id(42).build();

    let out = service
        .query(&user, "orders", "$[^(@amount_cents-)]{id, internal_note, customer{name}}")
        .await
        .unwrap();
    let ids: Vec<_> = out.iter().map(|r| r.scalar("id").unwrap().clone()).collect();
    assert_eq!(ids, [Value::from("o1"), Value::from("o2")]);
    assert!(out.iter().all(|r| !r.contains("internal_note")));

    let json = serde_json::to_value(&out).unwrap();
    assert_eq!(json[0]["customer"]["name"], "Acme");
    assert!(json[1]["customer"].is_null());
}

#[test]
fn missing_file_is_an_error() {
    let err = AppConfig::load(Path::new("/nonexistent/jql.yaml")).unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
fn unknown_keys_are_rejected() {
    let file = write_config("query:\n  max_page_size: 10\n  page_size: 5\n");
    assert!(AppConfig::load(file.path()).is_err());
}

#[test]
fn links_must_name_declared_relations() {
    let file = write_config(
        r"
registry:
  resources:
    - name: orders
      properties:
        - { name: amount_cents, kind: int }
links:
  - { resource: orders, relation: customer, target: customers, local_key: customer_id, foreign_key: id }
",
    );
    let err = AppConfig::load(file.path()).unwrap().into_service().unwrap_err();
    assert!(err.to_string().contains("not a declared relation"));
}

#[test]
fn seed_for_unknown_resource_is_rejected() {
    let file = write_config(
        r"
registry:
  resources:
    - name: orders
seed:
  invoices:
    - { id: i1 }
",
    );
    let err = AppConfig::load(file.path()).unwrap().into_service().unwrap_err();
    assert!(err.to_string().contains("unknown resource"));
}
