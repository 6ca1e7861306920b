use std::collections::HashSet;

use modkit_security::{Identity, ScopeContext, ScopeRule, resolve_scope};

use crate::error::SchemaError;
use crate::property::{Operation, PropertyDefinition};
use crate::value::Value;

/// Immutable description of one resource type.
///
/// Property order is preserved; it drives the default projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSchema {
    name: String,
    properties: Vec<PropertyDefinition>,
    rules: Vec<ScopeRule>,
}

impl ResourceSchema {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ResourceSchemaBuilder {
        ResourceSchemaBuilder {
            name: name.into(),
            properties: Vec::new(),
            rules: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn properties(&self) -> &[PropertyDefinition] {
        &self.properties
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.name() == name)
    }

    #[must_use]
    pub fn rules(&self) -> &[ScopeRule] {
        &self.rules
    }

    /// Run the scope resolver for `identity` against this resource's rules.
    #[must_use]
    pub fn resolve_scope(&self, identity: &Identity) -> ScopeContext {
        resolve_scope(identity, &self.name, &self.rules)
    }

    /// Properties projected when the caller names none: every readable,
    /// non-relation property in declaration order.
    pub fn default_projection<'a>(
        &'a self,
        ctx: &'a ScopeContext,
    ) -> impl Iterator<Item = &'a PropertyDefinition> + 'a {
        self.properties
            .iter()
            .filter(move |p| !p.is_relation() && p.allows(Operation::Read, ctx))
    }

    /// Returns `true` if `ctx` may write at least one property.
    #[must_use]
    pub fn is_writable_by(&self, ctx: &ScopeContext) -> bool {
        self.properties
            .iter()
            .any(|p| p.allows(Operation::Write, ctx))
    }
}

/// Builder for [`ResourceSchema`]; validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
#[must_use]
pub struct ResourceSchemaBuilder {
    name: String,
    properties: Vec<PropertyDefinition>,
    rules: Vec<ScopeRule>,
}

impl ResourceSchemaBuilder {
    pub fn property(mut self, property: PropertyDefinition) -> Self {
        self.properties.push(property);
        self
    }

    pub fn properties(mut self, properties: impl IntoIterator<Item = PropertyDefinition>) -> Self {
        self.properties.extend(properties);
        self
    }

    pub fn rule(mut self, rule: ScopeRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = ScopeRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Validate and freeze the schema.
    ///
    /// Defaults are coerced to the property kind, so `"2024-01-01"` on a
    /// date property is stored as a date.
    ///
    /// # Errors
    /// - [`SchemaError::EmptyResourceName`]
    /// - [`SchemaError::DuplicateProperty`]
    /// - [`SchemaError::UnknownDependency`]
    /// - [`SchemaError::InvalidDefault`]
    pub fn build(self) -> Result<ResourceSchema, SchemaError> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err(SchemaError::EmptyResourceName);
        }

        let mut seen = HashSet::new();
        for prop in &self.properties {
            if !seen.insert(prop.name()) {
                return Err(SchemaError::DuplicateProperty {
                    resource: name,
                    property: prop.name().to_owned(),
                });
            }
        }

        for prop in &self.properties {
            if let Some(dependency) = prop.dependencies().iter().find(|d| !seen.contains(d.as_str()))
            {
                return Err(SchemaError::UnknownDependency {
                    resource: name,
                    property: prop.name().to_owned(),
                    dependency: dependency.clone(),
                });
            }
        }

        let properties = self
            .properties
            .into_iter()
            .map(|prop| normalize_default(&name, prop))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            resource = %name,
            properties = properties.len(),
            rules = self.rules.len(),
            "resource schema built"
        );

        Ok(ResourceSchema {
            name,
            properties,
            rules: self.rules,
        })
    }
}

fn normalize_default(
    resource: &str,
    prop: PropertyDefinition,
) -> Result<PropertyDefinition, SchemaError> {
    let Some(default) = prop.default().cloned() else {
        return Ok(prop);
    };
    let invalid = |reason: String| SchemaError::InvalidDefault {
        resource: resource.to_owned(),
        property: prop.name().to_owned(),
        reason,
    };
    if default.is_null() && !prop.is_nullable() {
        return Err(invalid("null default on a non-nullable property".to_owned()));
    }
    let coerced: Value = prop
        .kind()
        .coerce(default, prop.enum_variants())
        .map_err(invalid)?;
    Ok(prop.default_value(coerced))
}
