#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use modkit_jql::{InMemoryProvider, QueryConfig, RelationLink, ResourceService};
use modkit_resource::{
    PropertyDefinition, RegistrySnapshot, ResourceSchema, SchemaRegistry, Value, ValueKind,
};
use modkit_security::{Identity, ScopeRule};

pub type Row = BTreeMap<String, Value>;

/// Rows from a JSON array of objects.
pub fn rows(json: serde_json::Value) -> Vec<Row> {
    serde_json::from_value(json).unwrap()
}

pub fn input(json: serde_json::Value) -> Row {
    serde_json::from_value(json).unwrap()
}

pub fn orders() -> ResourceSchema {
    ResourceSchema::builder("orders")
        .property(PropertyDefinition::new("id", ValueKind::Str).read_only().permit_all(&["*"]))
        .property(PropertyDefinition::new("amount_cents", ValueKind::Int).permit_all(&["*"]))
        .property(
            PropertyDefinition::new("status", ValueKind::Enum)
                .variants(["new", "done"])
                .default_value("new")
                .permit_all(&["*"]),
        )
        .property(PropertyDefinition::new("last_name", ValueKind::Str).permit_all(&["*"]))
        .property(
            PropertyDefinition::new("internal_note", ValueKind::Str)
                .nullable()
                .permit_all(&["admin"]),
        )
        .property(PropertyDefinition::new("owner_id", ValueKind::Int).read_only().permit_all(&["*"]))
        .property(PropertyDefinition::new("customer_id", ValueKind::Str).nullable().permit_all(&["*"]))
        .property(
            PropertyDefinition::new("total", ValueKind::Int)
                .depends_on(["amount_cents"])
                .readable_by(["*"]),
        )
        .property(PropertyDefinition::has_one("customer", "customers").readable_by(["*"]))
        .rule(ScopeRule::role("admin", "admin"))
        .rule(ScopeRule::self_match("user", "owner_id"))
        .build()
        .unwrap()
}

pub fn customers() -> ResourceSchema {
    ResourceSchema::builder("customers")
        .property(PropertyDefinition::new("id", ValueKind::Str).read_only().permit_all(&["*"]))
        .property(
            PropertyDefinition::new("name", ValueKind::Str)
                .permit_all(&["admin"])
                .readable_by(["*"])
                .filterable_by(["*"]),
        )
        .property(PropertyDefinition::new("public", ValueKind::Bool).permit_all(&["admin"]))
        .property(PropertyDefinition::has_many("orders", "orders").readable_by(["*"]))
        .rule(ScopeRule::role("admin", "admin"))
        .rule(ScopeRule::field_equals("public", "public", true))
        .build()
        .unwrap()
}

pub fn links() -> [RelationLink; 2] {
    [
        RelationLink {
            resource: "orders".to_owned(),
            relation: "customer".to_owned(),
            target: "customers".to_owned(),
            local_key: "customer_id".to_owned(),
            foreign_key: "id".to_owned(),
        },
        RelationLink {
            resource: "customers".to_owned(),
            relation: "orders".to_owned(),
            target: "orders".to_owned(),
            local_key: "id".to_owned(),
            foreign_key: "customer_id".to_owned(),
        },
    ]
}

/// Provider with the given orders, two customers and both relation links.
pub fn provider(order_rows: Vec<Row>) -> Arc<InMemoryProvider> {
    let [to_customer, to_orders] = links();
    Arc::new(
        InMemoryProvider::new()
            .with_rows("orders", order_rows)
            .with_rows(
                "customers",
                rows(serde_json::json!([
                    { "id": "c1", "name": "Acme", "public": true },
                    { "id": "c2", "name": "Hidden Ltd", "public": false },
                ])),
            )
            .with_link(to_customer)
            .with_link(to_orders),
    )
}

pub fn service_with(provider: Arc<InMemoryProvider>, config: QueryConfig) -> ResourceService {
    let snapshot = RegistrySnapshot::new([orders(), customers()]).unwrap();
    ResourceService::new(Arc::new(SchemaRegistry::new(snapshot)), provider, config)
}

pub fn service(provider: Arc<InMemoryProvider>) -> ResourceService {
    service_with(provider, QueryConfig::default())
}

pub fn admin() -> Identity {
    Identity::builder().subject_id(1).role("admin").build()
}

pub fn user(id: i64) -> Identity {
    Identity::builder().subject_id(id).build()
}
