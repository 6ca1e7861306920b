use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use modkit_jql::{InMemoryProvider, QueryConfig, RelationLink, ResourceService};
use modkit_resource::{
    PropertyDefinition, RegistryDecl, RegistrySnapshot, SchemaRegistry, Value,
};
use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;

/// Prefix of environment overrides; `__` separates nested keys
/// (`JQL_QUERY__MAX_PAGE_SIZE=20`).
pub const ENV_PREFIX: &str = "JQL_";

type Row = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub registry: RegistryDecl,
    /// Rows loaded into the in-memory store, keyed by resource.
    #[serde(default)]
    pub seed: BTreeMap<String, Vec<Row>>,
    #[serde(default)]
    pub links: Vec<RelationLink>,
}

impl AppConfig {
    /// Read `path` and merge `JQL_*` environment overrides on top.
    ///
    /// # Errors
    /// Missing file, malformed YAML, or values that do not fit the schema.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.is_file() {
            bail!("config file '{}' not found", path.display());
        }
        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("invalid configuration in '{}'", path.display()))
    }

    /// Validate the registry, seed the in-memory store and wire the service.
    ///
    /// # Errors
    /// Invalid schema declarations, or seed rows and links naming unknown
    /// resources or relations.
    pub fn into_service(self) -> anyhow::Result<ResourceService> {
        let snapshot = self
            .registry
            .build()
            .context("invalid resource registry")?;

        for link in &self.links {
            check_link(&snapshot, link)?;
        }
        if let Some(unknown) = self.seed.keys().find(|r| snapshot.get(r).is_none()) {
            bail!("seed rows for unknown resource '{unknown}'");
        }

        let provider = self
            .links
            .into_iter()
            .fold(InMemoryProvider::new(), InMemoryProvider::with_link);
        for (resource, rows) in self.seed {
            tracing::debug!(%resource, rows = rows.len(), "seeding resource");
            provider.insert_rows(&resource, rows);
        }

        tracing::info!(resources = snapshot.len(), "resource registry loaded");
        Ok(ResourceService::new(
            Arc::new(SchemaRegistry::new(snapshot)),
            Arc::new(provider),
            self.query,
        ))
    }
}

fn check_link(snapshot: &RegistrySnapshot, link: &RelationLink) -> anyhow::Result<()> {
    let Some(schema) = snapshot.get(&link.resource) else {
        bail!("link on unknown resource '{}'", link.resource);
    };
    let Some(relation) = schema
        .property(&link.relation)
        .and_then(PropertyDefinition::relation_info)
    else {
        bail!("'{}.{}' is not a declared relation", link.resource, link.relation);
    };
    if relation.target != link.target {
        bail!(
            "link '{}.{}' targets '{}' but the relation targets '{}'",
            link.resource,
            link.relation,
            link.target,
            relation.target
        );
    }
    Ok(())
}
