//! Mutation gate: turns a client payload into the exact field set handed to
//! the record provider, or rejects it whole.

use std::collections::BTreeMap;

use modkit_resource::{Access, Operation, PropertyDefinition, ResourceSchema, Value};
use modkit_security::ScopeContext;

use crate::error::MutationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    /// Partial update: absent fields keep their stored value.
    Update,
}

/// Check `input` against `schema` and the caller's scope.
///
/// Read-only, computed and relation fields are dropped without error. On
/// [`WriteMode::Create`] absent fields with a default get it.
///
/// # Errors
/// - [`MutationError::UnknownField`] for names the schema does not declare
/// - [`MutationError::Forbidden`] when `canWrite` does not match `ctx`
/// - [`MutationError::InvalidValue`] for values of the wrong kind, or null on a non-nullable field
/// - [`MutationError::MissingRequired`] on create when a required field is absent
pub fn prepare_write(
    input: BTreeMap<String, Value>,
    schema: &ResourceSchema,
    ctx: &ScopeContext,
    mode: WriteMode,
) -> Result<BTreeMap<String, Value>, MutationError> {
    let mut out = BTreeMap::new();

    for (name, value) in input {
        let prop = schema
            .property(&name)
            .ok_or_else(|| MutationError::UnknownField {
                field: name.clone(),
            })?;

        if prop.access() == Access::ReadOnly || prop.is_computed() || prop.is_relation() {
            tracing::debug!(
                resource = schema.name(),
                field = %name,
                "dropping read-only field from write"
            );
            continue;
        }
        if !prop.allows(Operation::Write, ctx) {
            return Err(MutationError::Forbidden { field: name });
        }

        out.insert(name, coerce_input(prop, value)?);
    }

    if mode == WriteMode::Create {
        for prop in schema.properties() {
            if out.contains_key(prop.name()) {
                continue;
            }
            if prop.is_required() {
                return Err(MutationError::MissingRequired {
                    field: prop.name().to_owned(),
                });
            }
            if let Some(default) = prop.default()
                && !prop.is_computed()
                && !prop.is_relation()
            {
                out.insert(prop.name().to_owned(), default.clone());
            }
        }
    }

    Ok(out)
}

fn coerce_input(prop: &PropertyDefinition, value: Value) -> Result<Value, MutationError> {
    if value.is_null() {
        if prop.is_nullable() {
            return Ok(Value::Null);
        }
        return Err(MutationError::InvalidValue {
            field: prop.name().to_owned(),
            reason: "null is not allowed".to_owned(),
        });
    }
    prop.kind()
        .coerce(value, prop.enum_variants())
        .map_err(|reason| MutationError::InvalidValue {
            field: prop.name().to_owned(),
            reason,
        })
}
