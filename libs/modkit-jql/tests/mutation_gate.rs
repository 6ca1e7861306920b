#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use modkit_jql::{MutationErrorKind, ServiceError};
use modkit_resource::Value;
use serde_json::json;

use common::{admin, input, provider, rows, service, user};

fn mutation_kind(err: &ServiceError) -> Option<MutationErrorKind> {
    match err {
        ServiceError::Mutation(inner) => Some(inner.kind()),
        _ => None,
    }
}

#[tokio::test]
async fn read_only_field_on_create_is_dropped() {
    let store = provider(Vec::new());
    let svc = service(store.clone());

    let created = svc
        .create(
            &admin(),
            "orders",
            input(json!({ "id": "chosen", "amount_cents": 100, "last_name": "Doe", "total": 5 })),
        )
        .await
        .unwrap();

    let id = created.scalar("id").and_then(Value::as_str).unwrap();
    assert_ne!(id, "chosen");
    assert_eq!(created.scalar("status"), Some(&Value::from("new")));
    assert_eq!(created.scalar("total"), Some(&Value::Null));
    assert_eq!(store.row_count("orders"), 1);
}

#[tokio::test]
async fn create_answers_with_id_only_when_row_is_outside_caller_visibility() {
    let store = provider(Vec::new());
    let svc = service(store.clone());

    // owner_id is read-only and dropped, so the self scope does not cover the row
    let created = svc
        .create(
            &user(42),
            "orders",
            input(json!({ "amount_cents": 100, "last_name": "Doe", "owner_id": 42 })),
        )
        .await
        .unwrap();

    assert_eq!(created.keys().collect::<Vec<_>>(), ["id"]);
    assert_eq!(store.row_count("orders"), 1);
    assert!(svc.query(&user(42), "orders", "").await.unwrap().is_empty());

    let id = created.scalar("id").and_then(Value::as_str).unwrap();
    let seen = svc.query(&admin(), "orders", "{id, owner_id}").await.unwrap();
    assert_eq!(seen[0].scalar("id").and_then(Value::as_str), Some(id));
    assert_eq!(seen[0].scalar("owner_id"), Some(&Value::Null));
}

#[tokio::test]
async fn field_outside_can_write_is_forbidden() {
    let store = provider(Vec::new());
    let svc = service(store.clone());

    let err = svc
        .create(
            &user(42),
            "orders",
            input(json!({ "amount_cents": 100, "last_name": "Doe", "internal_note": "x" })),
        )
        .await
        .unwrap_err();
    assert_eq!(mutation_kind(&err), Some(MutationErrorKind::Forbidden));
    assert!(err.is_client_error());
    assert_eq!(store.row_count("orders"), 0);

    let created = svc
        .create(
            &admin(),
            "orders",
            input(json!({ "amount_cents": 100, "last_name": "Doe", "internal_note": "x" })),
        )
        .await
        .unwrap();
    assert_eq!(created.scalar("internal_note"), Some(&Value::from("x")));
}

#[tokio::test]
async fn required_field_missing_on_create_but_not_on_update() {
    let store = provider(rows(json!([
        { "id": "o1", "amount_cents": 1, "status": "new", "last_name": "a", "owner_id": 42 },
    ])));
    let svc = service(store);

    let err = svc
        .create(&user(42), "orders", input(json!({ "last_name": "Doe" })))
        .await
        .unwrap_err();
    assert_eq!(mutation_kind(&err), Some(MutationErrorKind::MissingRequired));

    let updated = svc
        .update(&user(42), "orders", "o1", input(json!({ "last_name": "Doe" })))
        .await
        .unwrap();
    assert_eq!(updated.scalar("last_name"), Some(&Value::from("Doe")));
    assert_eq!(updated.scalar("amount_cents"), Some(&Value::Int(1)));
}

#[tokio::test]
async fn invalid_values_and_unknown_fields_are_rejected() {
    let svc = service(provider(Vec::new()));

    let err = svc
        .create(
            &admin(),
            "orders",
            input(json!({ "amount_cents": 1, "last_name": "a", "status": "lost" })),
        )
        .await
        .unwrap_err();
    assert_eq!(mutation_kind(&err), Some(MutationErrorKind::InvalidValue));

    let err = svc
        .create(&admin(), "orders", input(json!({ "amount_cents": 1, "colour": "red" })))
        .await
        .unwrap_err();
    assert_eq!(mutation_kind(&err), Some(MutationErrorKind::UnknownField));
}

#[tokio::test]
async fn delete_needs_visibility_and_write_permission() {
    let store = provider(rows(json!([
        { "id": "o1", "amount_cents": 1, "status": "new", "last_name": "a", "owner_id": 42 },
        { "id": "o2", "amount_cents": 2, "status": "new", "last_name": "b", "owner_id": 7 },
    ])));
    let svc = service(store.clone());

    let err = svc.delete(&user(42), "orders", "o2").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { .. }));

    let err = svc.delete(&user(42), "customers", "c1").await.unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden { .. }));

    svc.delete(&user(42), "orders", "o1").await.unwrap();
    svc.delete(&admin(), "orders", "o2").await.unwrap();
    assert_eq!(store.row_count("orders"), 0);
}

#[tokio::test]
async fn provider_failure_on_write_is_not_a_client_error() {
    let store = provider(Vec::new());
    let svc = service(store.clone());
    store.set_available(false);

    let err = svc
        .create(&admin(), "orders", input(json!({ "amount_cents": 1, "last_name": "a" })))
        .await
        .unwrap_err();
    assert_eq!(mutation_kind(&err), Some(MutationErrorKind::ProviderFailure));
    assert!(!err.is_client_error());
}
