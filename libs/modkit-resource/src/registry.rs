//! Process-wide schema registry.
//!
//! Readers pin a [`RegistrySnapshot`] once per request; a reload swaps the
//! whole snapshot atomically, so no request observes a schema changing
//! mid-evaluation.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use modkit_security::{Identity, ScopeContext};

use crate::error::SchemaError;
use crate::schema::ResourceSchema;

/// A validated, immutable set of resource schemas.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    resources: BTreeMap<String, Arc<ResourceSchema>>,
}

impl RegistrySnapshot {
    /// Build a snapshot, checking resource names are unique and every
    /// relation targets a registered resource.
    ///
    /// # Errors
    /// [`SchemaError::DuplicateResource`] or [`SchemaError::UnknownRelationTarget`].
    pub fn new(schemas: impl IntoIterator<Item = ResourceSchema>) -> Result<Self, SchemaError> {
        let mut resources = BTreeMap::new();
        for schema in schemas {
            let name = schema.name().to_owned();
            if resources.contains_key(&name) {
                return Err(SchemaError::DuplicateResource(name));
            }
            resources.insert(name, Arc::new(schema));
        }

        for schema in resources.values() {
            for prop in schema.properties() {
                if let Some(relation) = prop.relation_info()
                    && !resources.contains_key(&relation.target)
                {
                    return Err(SchemaError::UnknownRelationTarget {
                        resource: schema.name().to_owned(),
                        property: prop.name().to_owned(),
                        target: relation.target.clone(),
                    });
                }
            }
        }

        Ok(Self { resources })
    }

    #[must_use]
    pub fn get(&self, resource: &str) -> Option<&Arc<ResourceSchema>> {
        self.resources.get(resource)
    }

    pub fn resources(&self) -> impl Iterator<Item = &Arc<ResourceSchema>> {
        self.resources.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resolve `identity` against the rules of every registered resource.
    #[must_use]
    pub fn resolve_scopes(&self, identity: &Identity) -> RequestScopes {
        RequestScopes {
            contexts: self
                .resources
                .iter()
                .map(|(name, schema)| (name.clone(), schema.resolve_scope(identity)))
                .collect(),
        }
    }
}

/// Per-request scope contexts, one per registered resource.
#[derive(Debug, Clone, Default)]
pub struct RequestScopes {
    contexts: BTreeMap<String, ScopeContext>,
}

impl RequestScopes {
    #[must_use]
    pub fn get(&self, resource: &str) -> Option<&ScopeContext> {
        self.contexts.get(resource)
    }

    /// Context for `resource`; an unknown resource grants nothing.
    #[must_use]
    pub fn context(&self, resource: &str) -> ScopeContext {
        self.get(resource)
            .cloned()
            .unwrap_or_else(|| ScopeContext::empty(resource))
    }

    /// Override the context for one resource.
    pub fn insert(&mut self, ctx: ScopeContext) {
        self.contexts.insert(ctx.resource().to_owned(), ctx);
    }
}

/// Lock-free holder of the current [`RegistrySnapshot`].
pub struct SchemaRegistry {
    current: ArcSwap<RegistrySnapshot>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new(snapshot: RegistrySnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    /// Pin the current snapshot; keep it for the whole request.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    /// Atomically install `snapshot`, returning the one it replaced.
    pub fn replace(&self, snapshot: RegistrySnapshot) -> Arc<RegistrySnapshot> {
        let previous = self.current.swap(Arc::new(snapshot));
        tracing::info!(
            resources = self.current.load().len(),
            "schema registry replaced"
        );
        previous
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new(RegistrySnapshot::default())
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("resources", &self.current.load().len())
            .finish()
    }
}
