use thiserror::Error;

/// Errors raised while building or registering resource schemas.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("resource name must not be empty")]
    EmptyResourceName,

    #[error("resource '{0}' is declared more than once")]
    DuplicateResource(String),

    #[error("property '{property}' is declared more than once on '{resource}'")]
    DuplicateProperty { resource: String, property: String },

    #[error("property '{property}' on '{resource}' depends on unknown property '{dependency}'")]
    UnknownDependency {
        resource: String,
        property: String,
        dependency: String,
    },

    #[error("relation '{resource}.{property}' targets unknown resource '{target}'")]
    UnknownRelationTarget {
        resource: String,
        property: String,
        target: String,
    },

    #[error("default of '{resource}.{property}' is invalid: {reason}")]
    InvalidDefault {
        resource: String,
        property: String,
        reason: String,
    },
}
