//! Data-literal schema declarations.
//!
//! ```yaml
//! resources:
//!   - name: users
//!     rules:
//!       - { name: admin, requires_role: admin, predicate: { kind: unrestricted } }
//!       - { name: user, predicate: { kind: self_match, field: id } }
//!     properties:
//!       - name: email
//!         kind: str
//!         permissions: { can_read: ["*"], can_write: ["user:{id}"] }
//! ```

use modkit_security::ScopeRule;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::property::PropertyDefinition;
use crate::registry::RegistrySnapshot;
use crate::schema::ResourceSchema;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDecl {
    pub name: String,
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
    #[serde(default)]
    pub rules: Vec<ScopeRule>,
}

impl ResourceDecl {
    /// # Errors
    /// Any validation error of [`ResourceSchemaBuilder::build`](crate::ResourceSchemaBuilder::build).
    pub fn build(self) -> Result<ResourceSchema, SchemaError> {
        ResourceSchema::builder(self.name)
            .properties(self.properties)
            .rules(self.rules)
            .build()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryDecl {
    #[serde(default)]
    pub resources: Vec<ResourceDecl>,
}

impl RegistryDecl {
    /// Build every resource and the snapshot holding them.
    ///
    /// # Errors
    /// The first schema or cross-resource validation error.
    pub fn build(self) -> Result<RegistrySnapshot, SchemaError> {
        let schemas = self
            .resources
            .into_iter()
            .map(ResourceDecl::build)
            .collect::<Result<Vec<_>, _>>()?;
        RegistrySnapshot::new(schemas)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::property::{Operation, ValueKind};
    use modkit_security::Identity;
    use serde_json::json;

    #[test]
    fn declaration_builds_registry() {
        let decl: RegistryDecl = serde_json::from_value(json!({
            "resources": [
                {
                    "name": "users",
                    "rules": [
                        {"name": "admin", "requires_role": "admin", "predicate": {"kind": "unrestricted"}},
                        {"name": "user", "predicate": {"kind": "self_match", "field": "id"}}
                    ],
                    "properties": [
                        {"name": "id", "kind": "int", "access": "read_only", "permissions": {"can_read": ["*"]}},
                        {"name": "email", "kind": "str", "permissions": {"can_read": ["*"], "can_write": ["user:{id}"]}},
                        {"name": "company", "kind": "object", "nullable": true,
                         "relation": {"target": "companies", "cardinality": "one"},
                         "permissions": {"can_read": ["admin"]}}
                    ]
                },
                {"name": "companies", "properties": [{"name": "id", "kind": "int"}]}
            ]
        }))
        .unwrap();

        let snapshot = decl.build().unwrap();
        assert_eq!(snapshot.len(), 2);

        let users = snapshot.get("users").unwrap();
        let email = users.property("email").unwrap();
        assert_eq!(email.kind(), ValueKind::Str);

        let ctx = users.resolve_scope(&Identity::builder().subject_id(7).build());
        assert!(email.allows(Operation::Write, &ctx));
        assert!(!users.property("company").unwrap().allows(Operation::Read, &ctx));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let res = serde_json::from_value::<ResourceDecl>(json!({"name": "users", "fields": []}));
        assert!(res.is_err());
    }

    #[test]
    fn dangling_relation_fails_build() {
        let decl: RegistryDecl = serde_json::from_value(json!({
            "resources": [{
                "name": "users",
                "properties": [{"name": "company", "kind": "object",
                                "relation": {"target": "companies", "cardinality": "one"}}]
            }]
        }))
        .unwrap();
        assert!(matches!(decl.build(), Err(SchemaError::UnknownRelationTarget { .. })));
    }
}
