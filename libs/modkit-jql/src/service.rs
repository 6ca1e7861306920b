//! Request façade over the query and write pipeline.
//!
//! Every call pins one registry snapshot for its whole lifetime, so a
//! concurrent [`SchemaRegistry::replace`] is never observed mid-request.

use std::collections::BTreeMap;
use std::sync::Arc;

use modkit_resource::{RegistrySnapshot, RequestScopes, SchemaRegistry, Value};
use modkit_security::Identity;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::ast::AbstractQuery;
use crate::config::QueryConfig;
use crate::error::{EvalError, MutationError, ParseError, PlanError};
use crate::eval::{evaluate, evaluate_records};
use crate::mutation::{WriteMode, prepare_write};
use crate::parser::Parser;
use crate::plan::{Planner, ValidatedQuery};
use crate::projected::{ProjectedRecord, ProjectedValue};
use crate::provider::{ID_FIELD, ProviderError, Record, RecordProvider};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error("{resource} record '{id}' not found")]
    NotFound { resource: String, id: String },

    #[error("deleting {resource} records is not permitted")]
    Forbidden { resource: String },
}

impl ServiceError {
    /// `true` when the caller's input is at fault (4xx), `false` for storage failures.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Eval(_) => false,
            Self::Mutation(err) => !matches!(err, MutationError::ProviderFailure { .. }),
            Self::Parse(_) | Self::Plan(_) | Self::NotFound { .. } | Self::Forbidden { .. } => {
                true
            }
        }
    }
}

impl From<ProviderError> for ServiceError {
    fn from(err: ProviderError) -> Self {
        tracing::warn!(error = %err, "record provider failed during write");
        Self::Mutation(MutationError::from(err))
    }
}

/// Runs JQL queries and gated writes for one resource registry and one
/// record provider.
#[derive(Clone)]
pub struct ResourceService {
    registry: Arc<SchemaRegistry>,
    provider: Arc<dyn RecordProvider>,
    config: QueryConfig,
}

impl std::fmt::Debug for ResourceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ResourceService {
    #[must_use]
    pub fn new(
        registry: Arc<SchemaRegistry>,
        provider: Arc<dyn RecordProvider>,
        config: QueryConfig,
    ) -> Self {
        Self {
            registry,
            provider,
            config,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Parse and plan `jql` without touching the provider.
    ///
    /// # Errors
    /// [`ServiceError::Parse`] or [`ServiceError::Plan`].
    #[instrument(skip(self, identity))]
    pub fn explain(
        &self,
        identity: &Identity,
        resource: &str,
        jql: &str,
    ) -> Result<(AbstractQuery, ValidatedQuery), ServiceError> {
        let snapshot = self.registry.snapshot();
        let scopes = snapshot.resolve_scopes(identity);
        let query = self.parse(resource, jql)?;
        let planned = Planner::new(&snapshot, &scopes, &self.config).plan(&query)?;
        Ok((query, planned))
    }

    /// Run `jql` against `resource` for `identity`.
    ///
    /// # Errors
    /// [`ServiceError::Parse`], [`ServiceError::Plan`] for client mistakes;
    /// [`ServiceError::Eval`] when the provider fails.
    #[instrument(skip(self, identity))]
    pub async fn query(
        &self,
        identity: &Identity,
        resource: &str,
        jql: &str,
    ) -> Result<Vec<ProjectedRecord>, ServiceError> {
        let (_, planned) = self.explain(identity, resource, jql)?;
        let records = evaluate(&planned, self.provider.as_ref()).await?;
        debug!(count = records.len(), "query evaluated");
        Ok(records)
    }

    /// Create a record and return it under the caller's default projection.
    ///
    /// When the new row is not visible to the caller (a self-scoped caller
    /// whose ownership field is read-only, for one) only its `id` comes back.
    ///
    /// # Errors
    /// [`ServiceError::Plan`] for an unknown resource, [`ServiceError::Mutation`]
    /// when the gate or the provider rejects the write.
    #[instrument(skip(self, identity, input))]
    pub async fn create(
        &self,
        identity: &Identity,
        resource: &str,
        input: BTreeMap<String, Value>,
    ) -> Result<ProjectedRecord, ServiceError> {
        let snapshot = self.registry.snapshot();
        let scopes = snapshot.resolve_scopes(identity);
        let schema = snapshot
            .get(resource)
            .ok_or_else(|| PlanError::UnknownResource(resource.to_owned()))?;

        let fields = prepare_write(input, schema, &scopes.context(resource), WriteMode::Create)?;
        let record = self.provider.create(resource, fields).await?;
        self.present(&snapshot, &scopes, record).await
    }

    /// Partially update the record `id`.
    ///
    /// An update that moves the row out of the caller's visibility answers
    /// with its `id` only.
    ///
    /// # Errors
    /// As [`create`](Self::create), plus [`ServiceError::NotFound`] when the
    /// record does not exist or is not visible to the caller.
    #[instrument(skip(self, identity, input))]
    pub async fn update(
        &self,
        identity: &Identity,
        resource: &str,
        id: &str,
        input: BTreeMap<String, Value>,
    ) -> Result<ProjectedRecord, ServiceError> {
        let snapshot = self.registry.snapshot();
        let scopes = snapshot.resolve_scopes(identity);
        let schema = snapshot
            .get(resource)
            .ok_or_else(|| PlanError::UnknownResource(resource.to_owned()))?;
        let ctx = scopes.context(resource);

        let fields = prepare_write(input, schema, &ctx, WriteMode::Update)?;
        let record = self.find_visible(resource, id, &scopes).await?;
        let record = self.provider.update(&record, fields).await?;
        self.present(&snapshot, &scopes, record).await
    }

    /// Delete the record `id`.
    ///
    /// # Errors
    /// [`ServiceError::NotFound`] when the record is not visible,
    /// [`ServiceError::Forbidden`] when the caller may write no property of
    /// the resource.
    #[instrument(skip(self, identity))]
    pub async fn delete(
        &self,
        identity: &Identity,
        resource: &str,
        id: &str,
    ) -> Result<(), ServiceError> {
        let snapshot = self.registry.snapshot();
        let scopes = snapshot.resolve_scopes(identity);
        let schema = snapshot
            .get(resource)
            .ok_or_else(|| PlanError::UnknownResource(resource.to_owned()))?;

        let record = self.find_visible(resource, id, &scopes).await?;
        if !schema.is_writable_by(&scopes.context(resource)) {
            return Err(ServiceError::Forbidden {
                resource: resource.to_owned(),
            });
        }
        self.provider.delete(&record).await?;
        Ok(())
    }

    fn parse(&self, resource: &str, jql: &str) -> Result<AbstractQuery, ParseError> {
        Parser::new(jql)
            .max_depth(self.config.max_filter_depth)
            .parse(resource)
    }

    async fn find_visible(
        &self,
        resource: &str,
        id: &str,
        scopes: &RequestScopes,
    ) -> Result<Record, ServiceError> {
        let ctx = scopes.context(resource);
        self.provider
            .find(resource, id, ctx.visibility())
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                resource: resource.to_owned(),
                id: id.to_owned(),
            })
    }

    /// Project a freshly written record for the caller.
    ///
    /// The record is looked up again under the caller's visibility. A write
    /// that leaves the row outside that visibility answers with the id only.
    async fn present(
        &self,
        snapshot: &RegistrySnapshot,
        scopes: &RequestScopes,
        written: Record,
    ) -> Result<ProjectedRecord, ServiceError> {
        let resource = written.resource();
        let ctx = scopes.context(resource);
        let Some(record) = self
            .provider
            .find(resource, written.id(), ctx.visibility())
            .await?
        else {
            debug!(
                resource,
                id = written.id(),
                "written record is outside the caller's visibility"
            );
            return Ok(ProjectedRecord::new(vec![(
                ID_FIELD.to_owned(),
                ProjectedValue::Scalar(Value::from(written.id())),
            )]));
        };

        let body = Planner::new(snapshot, scopes, &self.config).default_body(resource)?;
        let projected = evaluate_records(&body, vec![record], self.provider.as_ref()).await?;
        Ok(projected.into_iter().next().unwrap_or_default())
    }
}
