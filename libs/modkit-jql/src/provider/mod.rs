//! Record provider boundary.
//!
//! The engine never touches storage directly: base record streams, relation
//! hops and writes all go through [`RecordProvider`]. Every read takes the
//! row-visibility predicate of the caller, so a provider can push it down.

mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use modkit_resource::Value;
use modkit_security::AccessScope;
use thiserror::Error;

pub use memory::{InMemoryProvider, RelationLink};

/// Field holding a record's identifier.
pub const ID_FIELD: &str = "id";

/// A record as handed out by a provider: identity plus a field snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    resource: String,
    id: String,
    fields: BTreeMap<String, Value>,
}

impl Record {
    #[must_use]
    pub fn new(
        resource: impl Into<String>,
        id: impl Into<String>,
        fields: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            resource: resource.into(),
            id: id.into(),
            fields,
        }
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    NotFound,
    Unavailable,
    Backend,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("{resource} record '{id}' not found")]
    NotFound { resource: String, id: String },

    #[error("record storage is unavailable")]
    Unavailable,

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl ProviderError {
    #[must_use]
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            Self::NotFound { .. } => ProviderErrorKind::NotFound,
            Self::Unavailable => ProviderErrorKind::Unavailable,
            Self::Backend(_) => ProviderErrorKind::Backend,
        }
    }

    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// Storage collaborator supplying records and performing writes.
///
/// Implementations must allow concurrent reads for one request; the
/// evaluator fans relation fetches out across projection branches.
///
/// # Errors
/// Every fallible method returns [`ProviderError`]; the engine never retries.
#[async_trait]
pub trait RecordProvider: Send + Sync {
    /// Every record of `resource` admitted by `visibility`, in storage order.
    async fn fetch_all(
        &self,
        resource: &str,
        visibility: &AccessScope,
    ) -> Result<Vec<Record>, ProviderError>;

    /// Records reached from `record` through `relation`, bounded by the
    /// target resource's `visibility`. A `one` relation yields at most one.
    async fn fetch_relation(
        &self,
        record: &Record,
        relation: &str,
        visibility: &AccessScope,
    ) -> Result<Vec<Record>, ProviderError>;

    /// The record `id` of `resource`, if it exists and is visible.
    async fn find(
        &self,
        resource: &str,
        id: &str,
        visibility: &AccessScope,
    ) -> Result<Option<Record>, ProviderError>;

    /// Read one property. Missing fields read as `Null`.
    fn read_field(&self, record: &Record, property: &str) -> Value {
        record.field(property).cloned().unwrap_or_default()
    }

    async fn create(
        &self,
        resource: &str,
        fields: BTreeMap<String, Value>,
    ) -> Result<Record, ProviderError>;

    async fn update(
        &self,
        record: &Record,
        fields: BTreeMap<String, Value>,
    ) -> Result<Record, ProviderError>;

    async fn delete(&self, record: &Record) -> Result<(), ProviderError>;
}
