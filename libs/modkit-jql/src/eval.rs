//! Query evaluator.
//!
//! Steps, in order: visible base records, filter, stable sort, window,
//! projection. A relation projection runs the same steps over the related
//! records, so nested output is a bounded sub-query rather than a separate
//! code path.
//!
//! Relation fetches for independent records and projection branches run
//! concurrently; results are reassembled in input order.

use std::cmp::Ordering;

use futures::future::{BoxFuture, FutureExt, try_join_all};
use modkit_resource::{Cardinality, PropertyDefinition, Value, ValueKind};

use crate::ast::{Comparator, Direction};
use crate::error::EvalError;
use crate::plan::{PlannedField, PlannedFilter, PlannedSort, QueryBody, ResolvedPath, ValidatedQuery};
use crate::projected::{ProjectedRecord, ProjectedValue};
use crate::provider::{ProviderError, Record, RecordProvider};

/// Execute a planned query.
///
/// An empty result is a valid outcome.
///
/// # Errors
/// [`EvalError::ProviderFailure`] when the provider fails at any step.
pub async fn evaluate(
    query: &ValidatedQuery,
    provider: &dyn RecordProvider,
) -> Result<Vec<ProjectedRecord>, EvalError> {
    let records = provider
        .fetch_all(&query.resource, &query.visibility)
        .await
        .map_err(provider_failure)?;
    tracing::trace!(resource = %query.resource, candidates = records.len(), "evaluating query");
    evaluate_records(&query.body, records, provider).await
}

/// Run `body` over an explicit record set (already visibility-bounded).
///
/// # Errors
/// [`EvalError::ProviderFailure`] when a relation fetch fails.
pub fn evaluate_records<'a>(
    body: &'a QueryBody,
    records: Vec<Record>,
    provider: &'a dyn RecordProvider,
) -> BoxFuture<'a, Result<Vec<ProjectedRecord>, EvalError>> {
    async move {
        let records = match &body.filter {
            None => records,
            Some(filter) => {
                let keep =
                    try_join_all(records.iter().map(|r| matches_filter(filter, r, provider)))
                        .await?;
                records
                    .into_iter()
                    .zip(keep)
                    .filter_map(|(record, keep)| keep.then_some(record))
                    .collect()
            }
        };

        let records = if body.sort.is_empty() {
            records
        } else {
            let keys = try_join_all(records.iter().map(|r| sort_keys(&body.sort, r, provider)))
                .await?;
            let mut keyed: Vec<(Vec<Value>, Record)> = keys.into_iter().zip(records).collect();
            keyed.sort_by(|(a, _), (b, _)| compare_keys(&body.sort, a, b));
            keyed.into_iter().map(|(_, record)| record).collect()
        };

        let page: Vec<Record> = records
            .into_iter()
            .skip(body.offset)
            .take(body.limit)
            .collect();

        try_join_all(page.iter().map(|r| project_record(&body.fields, r, provider))).await
    }
    .boxed()
}

fn provider_failure(err: ProviderError) -> EvalError {
    tracing::warn!(error = %err, "record provider failed during evaluation");
    EvalError::from(err)
}

/// Read a property, normalizing stored ISO date strings.
fn read_value(provider: &dyn RecordProvider, prop: &PropertyDefinition, record: &Record) -> Value {
    let raw = provider.read_field(record, prop.name());
    if prop.kind() == ValueKind::Date
        && let Value::Str(s) = &raw
        && let Ok(date) = Value::parse_date(s)
    {
        return date;
    }
    raw
}

/// Values reached by `path` from `record`; several through a `many` hop.
async fn resolve_values(
    path: &ResolvedPath,
    record: &Record,
    provider: &dyn RecordProvider,
) -> Result<Vec<Value>, EvalError> {
    if path.hops.is_empty() {
        return Ok(vec![read_value(provider, &path.property, record)]);
    }

    let mut current = vec![record.clone()];
    for hop in &path.hops {
        let fetched = try_join_all(
            current
                .iter()
                .map(|r| provider.fetch_relation(r, &hop.relation, &hop.visibility)),
        )
        .await
        .map_err(provider_failure)?;
        current = fetched
            .into_iter()
            .flat_map(|related| match hop.cardinality {
                Cardinality::One => related.into_iter().take(1).collect::<Vec<_>>(),
                Cardinality::Many => related,
            })
            .collect();
    }

    Ok(current
        .iter()
        .map(|r| read_value(provider, &path.property, r))
        .collect())
}

fn matches_filter<'a>(
    filter: &'a PlannedFilter,
    record: &'a Record,
    provider: &'a dyn RecordProvider,
) -> BoxFuture<'a, Result<bool, EvalError>> {
    async move {
        match filter {
            PlannedFilter::Leaf { path, op, value } => {
                let values = resolve_values(path, record, provider).await?;
                // Nothing reachable reads as a single null.
                if values.is_empty() {
                    return Ok(compare(&Value::Null, *op, value));
                }
                Ok(values.iter().any(|v| compare(v, *op, value)))
            }
            PlannedFilter::And(children) => {
                for child in children {
                    if !matches_filter(child, record, provider).await? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            PlannedFilter::Or(children) => {
                for child in children {
                    if matches_filter(child, record, provider).await? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
    .boxed()
}

/// Leaf comparison. Only `= null` and `!= null` are ever true around null.
fn compare(value: &Value, op: Comparator, literal: &Value) -> bool {
    if literal.is_null() {
        return match op {
            Comparator::Eq => value.is_null(),
            Comparator::Ne => !value.is_null(),
            Comparator::Gt | Comparator::Ge | Comparator::Lt | Comparator::Le => false,
        };
    }
    if value.is_null() {
        return false;
    }
    match op {
        Comparator::Eq => value.equals(literal),
        Comparator::Ne => !value.equals(literal),
        Comparator::Gt => value.compare(literal) == Some(Ordering::Greater),
        Comparator::Ge => matches!(value.compare(literal), Some(Ordering::Greater | Ordering::Equal)),
        Comparator::Lt => value.compare(literal) == Some(Ordering::Less),
        Comparator::Le => matches!(value.compare(literal), Some(Ordering::Less | Ordering::Equal)),
    }
}

async fn sort_keys(
    keys: &[PlannedSort],
    record: &Record,
    provider: &dyn RecordProvider,
) -> Result<Vec<Value>, EvalError> {
    let mut out = Vec::with_capacity(keys.len());
    for key in keys {
        let value = resolve_values(&key.path, record, provider)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        out.push(value);
    }
    Ok(out)
}

/// Multi-key comparison; nulls sort last whatever the direction.
fn compare_keys(keys: &[PlannedSort], a: &[Value], b: &[Value]) -> Ordering {
    for ((key, x), y) in keys.iter().zip(a).zip(b) {
        let ord = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = x.compare(y).unwrap_or(Ordering::Equal);
                match key.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

async fn project_record(
    fields: &[PlannedField],
    record: &Record,
    provider: &dyn RecordProvider,
) -> Result<ProjectedRecord, EvalError> {
    let values = try_join_all(fields.iter().map(|f| project_field(f, record, provider))).await?;
    Ok(ProjectedRecord::new(
        fields
            .iter()
            .map(|f| f.name().to_owned())
            .zip(values)
            .collect(),
    ))
}

fn project_field<'a>(
    field: &'a PlannedField,
    record: &'a Record,
    provider: &'a dyn RecordProvider,
) -> BoxFuture<'a, Result<ProjectedValue, EvalError>> {
    async move {
        match field {
            PlannedField::Scalar(prop) => {
                Ok(ProjectedValue::Scalar(read_value(provider, prop, record)))
            }
            PlannedField::Relation {
                name,
                cardinality,
                visibility,
                body,
                ..
            } => {
                let related = provider
                    .fetch_relation(record, name, visibility)
                    .await
                    .map_err(provider_failure)?;
                let projected = evaluate_records(body, related, provider).await?;
                Ok(match cardinality {
                    Cardinality::One => {
                        ProjectedValue::One(projected.into_iter().next().map(Box::new))
                    }
                    Cardinality::Many => ProjectedValue::Many(projected),
                })
            }
        }
    }
    .boxed()
}
