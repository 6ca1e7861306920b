//! Declarative resource schemas.
//!
//! A [`ResourceSchema`] is built once at startup (builder or serde
//! declaration), registered in a [`SchemaRegistry`], and never mutated
//! afterwards. Requests pin a [`RegistrySnapshot`] and resolve their
//! [`RequestScopes`] against it.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod declare;
pub mod error;
pub mod property;
pub mod registry;
pub mod schema;
pub mod value;

pub use declare::{RegistryDecl, ResourceDecl};
pub use error::SchemaError;
pub use property::{
    Access, Cardinality, Operation, Permissions, PropertyDefinition, Relation, ValueKind,
};
pub use registry::{RegistrySnapshot, RequestScopes, SchemaRegistry};
pub use schema::{ResourceSchema, ResourceSchemaBuilder};
pub use value::Value;
