//! Query planner: checks an [`AbstractQuery`] against the registry and the
//! caller's scopes and resolves every name up front.
//!
//! ## Permission handling
//!
//! | reference          | check      | on failure                 |
//! |--------------------|------------|----------------------------|
//! | filter leaf        | `canFilter` | `PlanError::Forbidden`    |
//! | sort key           | `canSort`   | `PlanError::Forbidden`    |
//! | relation hop       | `canRead`   | `PlanError::Forbidden`    |
//! | projected field    | `canRead`   | field silently dropped    |

use modkit_resource::{
    Cardinality, Operation, PropertyDefinition, RegistrySnapshot, RequestScopes, ResourceSchema,
    Value, ValueKind,
};
use modkit_security::{AccessScope, ScopeContext};

use crate::ast::{AbstractQuery, Comparator, Direction, FieldPath, FilterExpr, Literal, Projection};
use crate::config::QueryConfig;
use crate::error::PlanError;

/// A relation traversed by a filter or sort path.
#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    pub relation: String,
    pub cardinality: Cardinality,
    pub target: String,
    /// Row visibility of the caller on the target resource.
    pub visibility: AccessScope,
}

/// A filter or sort path resolved down to a scalar property.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    pub display: String,
    pub hops: Vec<Hop>,
    pub property: PropertyDefinition,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlannedFilter {
    Leaf {
        path: ResolvedPath,
        op: Comparator,
        /// Literal coerced to the property's kind.
        value: Value,
    },
    And(Vec<PlannedFilter>),
    Or(Vec<PlannedFilter>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedSort {
    pub path: ResolvedPath,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlannedField {
    Scalar(PropertyDefinition),
    Relation {
        name: String,
        cardinality: Cardinality,
        target: String,
        visibility: AccessScope,
        body: Box<QueryBody>,
    },
}

impl PlannedField {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar(prop) => prop.name(),
            Self::Relation { name, .. } => name,
        }
    }
}

/// Filter, sort, window and projection for one record set.
///
/// Root queries and relation sub-queries share this shape; relation bodies
/// only carry a projection and a window.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBody {
    pub filter: Option<PlannedFilter>,
    pub sort: Vec<PlannedSort>,
    pub offset: usize,
    pub limit: usize,
    pub fields: Vec<PlannedField>,
}

/// Output of the planner. Owned by one request.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedQuery {
    pub resource: String,
    pub visibility: AccessScope,
    pub body: QueryBody,
}

/// Plan `query` for the caller described by `scopes`.
///
/// # Errors
/// See [`Planner::plan`].
pub fn plan(
    query: &AbstractQuery,
    registry: &RegistrySnapshot,
    scopes: &RequestScopes,
    config: &QueryConfig,
) -> Result<ValidatedQuery, PlanError> {
    Planner::new(registry, scopes, config).plan(query)
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

pub struct Planner<'a> {
    registry: &'a RegistrySnapshot,
    scopes: &'a RequestScopes,
    config: &'a QueryConfig,
}

impl<'a> Planner<'a> {
    #[must_use]
    pub fn new(
        registry: &'a RegistrySnapshot,
        scopes: &'a RequestScopes,
        config: &'a QueryConfig,
    ) -> Self {
        Self {
            registry,
            scopes,
            config,
        }
    }

    /// Resolve and authorize every reference in `query`.
    ///
    /// # Errors
    /// - [`PlanError::UnknownResource`] for an unregistered root or target
    /// - [`PlanError::UnknownField`] for unresolvable names
    /// - [`PlanError::Forbidden`] for filter/sort (or relation hops) the caller may not use
    /// - [`PlanError::InvalidPath`] for paths ending on a relation or sorting through `many`
    /// - [`PlanError::TypeMismatch`] for literals that do not fit the property
    pub fn plan(&self, query: &AbstractQuery) -> Result<ValidatedQuery, PlanError> {
        let schema = self.schema(&query.resource)?;
        let ctx = self.scopes.context(&query.resource);

        let filter = query
            .filter
            .as_ref()
            .map(|f| self.plan_filter(schema, &ctx, f))
            .transpose()?;

        let sort = query
            .sort
            .iter()
            .map(|key| {
                Ok(PlannedSort {
                    path: self.resolve_path(schema, &ctx, &key.path, Operation::Sort)?,
                    direction: key.direction,
                })
            })
            .collect::<Result<Vec<_>, PlanError>>()?;

        let limit = self.config.page_limit(query.slice.limit);
        if query.slice.limit.is_some_and(|requested| requested > limit) {
            tracing::debug!(
                resource = %query.resource,
                requested = query.slice.limit,
                limit,
                "page limit clamped"
            );
        }

        let fields = self.plan_projection(schema, &ctx, query.projection.as_ref(), "")?;

        tracing::debug!(
            resource = %query.resource,
            filter_depth = query.filter.as_ref().map_or(0, FilterExpr::depth),
            sort_keys = sort.len(),
            fields = fields.len(),
            "query planned"
        );

        Ok(ValidatedQuery {
            resource: query.resource.clone(),
            visibility: ctx.visibility().clone(),
            body: QueryBody {
                filter,
                sort,
                offset: to_usize(query.slice.offset.unwrap_or(0)),
                limit: to_usize(limit),
                fields,
            },
        })
    }

    /// Body presenting a single record of `resource` under the caller's
    /// default projection.
    ///
    /// # Errors
    /// [`PlanError::UnknownResource`].
    pub fn default_body(&self, resource: &str) -> Result<QueryBody, PlanError> {
        let schema = self.schema(resource)?;
        let ctx = self.scopes.context(resource);
        Ok(QueryBody {
            filter: None,
            sort: Vec::new(),
            offset: 0,
            limit: 1,
            fields: self.plan_projection(schema, &ctx, None, "")?,
        })
    }

    fn schema(&self, resource: &str) -> Result<&'a ResourceSchema, PlanError> {
        self.registry
            .get(resource)
            .map(AsRef::as_ref)
            .ok_or_else(|| PlanError::UnknownResource(resource.to_owned()))
    }

    fn plan_filter(
        &self,
        schema: &'a ResourceSchema,
        ctx: &ScopeContext,
        expr: &FilterExpr,
    ) -> Result<PlannedFilter, PlanError> {
        match expr {
            FilterExpr::Compare(cmp) => {
                let path = self.resolve_path(schema, ctx, &cmp.path, Operation::Filter)?;
                let value = coerce_literal(&path, cmp.op, &cmp.literal)?;
                Ok(PlannedFilter::Leaf {
                    path,
                    op: cmp.op,
                    value,
                })
            }
            FilterExpr::And(children) => children
                .iter()
                .map(|c| self.plan_filter(schema, ctx, c))
                .collect::<Result<_, _>>()
                .map(PlannedFilter::And),
            FilterExpr::Or(children) => children
                .iter()
                .map(|c| self.plan_filter(schema, ctx, c))
                .collect::<Result<_, _>>()
                .map(PlannedFilter::Or),
        }
    }

    /// Walk `path` segment by segment, switching schema at each relation.
    fn resolve_path(
        &self,
        root: &'a ResourceSchema,
        root_ctx: &ScopeContext,
        path: &FieldPath,
        op: Operation,
    ) -> Result<ResolvedPath, PlanError> {
        let display = path.dotted();
        let Some((last, init)) = path.segments().split_last() else {
            return Err(PlanError::InvalidPath {
                path: display,
                reason: "empty path".to_owned(),
            });
        };

        let mut schema = root;
        let mut ctx = root_ctx.clone();
        let mut hops = Vec::with_capacity(init.len());

        for segment in init {
            let prop = schema
                .property(segment)
                .ok_or_else(|| PlanError::UnknownField {
                    path: display.clone(),
                })?;
            let Some(relation) = prop.relation_info() else {
                return Err(PlanError::InvalidPath {
                    path: display,
                    reason: format!("'{segment}' is not a relation"),
                });
            };
            if !prop.allows(Operation::Read, &ctx) {
                return Err(PlanError::Forbidden {
                    path: display,
                    operation: Operation::Read,
                });
            }
            if op == Operation::Sort && relation.cardinality == Cardinality::Many {
                return Err(PlanError::InvalidPath {
                    path: display,
                    reason: format!("cannot sort through to-many relation '{segment}'"),
                });
            }
            schema = self.schema(&relation.target)?;
            ctx = self.scopes.context(&relation.target);
            hops.push(Hop {
                relation: segment.clone(),
                cardinality: relation.cardinality,
                target: relation.target.clone(),
                visibility: ctx.visibility().clone(),
            });
        }

        let prop = schema
            .property(last)
            .ok_or_else(|| PlanError::UnknownField {
                path: display.clone(),
            })?;
        if prop.is_relation() {
            return Err(PlanError::InvalidPath {
                path: display,
                reason: format!("'{last}' is a relation; name one of its fields"),
            });
        }
        if !prop.allows(op, &ctx) {
            return Err(PlanError::Forbidden {
                path: display,
                operation: op,
            });
        }

        Ok(ResolvedPath {
            display,
            hops,
            property: prop.clone(),
        })
    }

    fn plan_projection(
        &self,
        schema: &'a ResourceSchema,
        ctx: &ScopeContext,
        projection: Option<&Projection>,
        prefix: &str,
    ) -> Result<Vec<PlannedField>, PlanError> {
        let Some(projection) = projection else {
            return Ok(schema
                .default_projection(ctx)
                .cloned()
                .map(PlannedField::Scalar)
                .collect());
        };

        let mut fields: Vec<PlannedField> = Vec::with_capacity(projection.fields.len());
        for field in &projection.fields {
            let path = format!("{prefix}{}", field.name);
            if fields.iter().any(|f| f.name() == field.name) {
                continue;
            }
            let prop = schema
                .property(&field.name)
                .ok_or_else(|| PlanError::UnknownField { path: path.clone() })?;

            if !prop.allows(Operation::Read, ctx) {
                tracing::debug!(
                    resource = schema.name(),
                    field = %path,
                    "projected field dropped: not readable in caller scope"
                );
                continue;
            }

            let Some(relation) = prop.relation_info() else {
                if field.nested.is_some() {
                    return Err(PlanError::InvalidPath {
                        path,
                        reason: "only relations take a nested projection".to_owned(),
                    });
                }
                fields.push(PlannedField::Scalar(prop.clone()));
                continue;
            };

            let target = self.schema(&relation.target)?;
            let target_ctx = self.scopes.context(&relation.target);
            let nested = self.plan_projection(
                target,
                &target_ctx,
                field.nested.as_ref(),
                &format!("{path}."),
            )?;
            let limit = match relation.cardinality {
                Cardinality::One => 1,
                Cardinality::Many => to_usize(self.config.max_relation_items),
            };
            fields.push(PlannedField::Relation {
                name: field.name.clone(),
                cardinality: relation.cardinality,
                target: relation.target.clone(),
                visibility: target_ctx.visibility().clone(),
                body: Box::new(QueryBody {
                    filter: None,
                    sort: Vec::new(),
                    offset: 0,
                    limit,
                    fields: nested,
                }),
            });
        }
        Ok(fields)
    }
}

fn expected_for(prop: &PropertyDefinition) -> String {
    match prop.kind() {
        ValueKind::Enum if !prop.enum_variants().is_empty() => {
            format!("one of [{}]", prop.enum_variants().join(", "))
        }
        ValueKind::Date => "a date (YYYY-MM-DD)".to_owned(),
        ValueKind::Int => "a number".to_owned(),
        kind => format!("a {kind}"),
    }
}

/// Turn a literal into a value comparable with `path`'s property.
fn coerce_literal(
    path: &ResolvedPath,
    op: Comparator,
    literal: &Literal,
) -> Result<Value, PlanError> {
    let prop = &path.property;
    let mismatch = |expected: String| PlanError::TypeMismatch {
        path: path.display.clone(),
        literal: literal.to_string(),
        expected,
    };

    let value = match literal {
        Literal::Null if op.is_ordering() => {
            return Err(mismatch("a non-null value for ordering".to_owned()));
        }
        Literal::Null => return Ok(Value::Null),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(n) => Value::Int(*n),
        Literal::Float(x) => Value::Float(*x),
        Literal::Str(s) => Value::Str(s.clone()),
    };

    match prop.kind() {
        ValueKind::Int if matches!(value, Value::Float(_)) => Ok(value),
        ValueKind::Object | ValueKind::Array => Err(mismatch("a scalar property".to_owned())),
        kind => kind
            .coerce(value, prop.enum_variants())
            .map_err(|_| mismatch(expected_for(prop))),
    }
}
