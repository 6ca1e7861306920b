use std::collections::BTreeMap;
use std::io::Write;

use anyhow::Context;
use modkit_jql::plan::PlannedField;
use modkit_jql::{ResourceService, ServiceError};
use modkit_resource::Value;
use modkit_security::Identity;
use serde::Serialize;
use serde_json::json;

use crate::cli::Commands;

/// Run one subcommand and print its result as JSON on stdout.
///
/// # Errors
/// Service errors (with their client/server classification in the message),
/// malformed `--data` payloads, or stdout failures.
pub async fn execute(
    service: &ResourceService,
    identity: &Identity,
    command: Commands,
) -> anyhow::Result<()> {
    match command {
        Commands::Query { resource, jql } => {
            let records = service
                .query(identity, &resource, &jql)
                .await
                .map_err(describe)?;
            print_json(&records)
        }
        Commands::Explain { resource, jql } => {
            let (query, planned) = service
                .explain(identity, &resource, &jql)
                .map_err(describe)?;
            print_json(&json!({
                "resource": planned.resource,
                "query": query.to_string(),
                "offset": planned.body.offset,
                "limit": planned.body.limit,
                "fields": field_names(&planned.body.fields),
                "sees_all_rows": planned.visibility.is_unconstrained(),
                "sees_no_rows": planned.visibility.is_deny_all(),
            }))
        }
        Commands::Create { resource, data } => {
            let record = service
                .create(identity, &resource, parse_data(&data)?)
                .await
                .map_err(describe)?;
            print_json(&record)
        }
        Commands::Update { resource, id, data } => {
            let record = service
                .update(identity, &resource, &id, parse_data(&data)?)
                .await
                .map_err(describe)?;
            print_json(&record)
        }
        Commands::Delete { resource, id } => {
            service
                .delete(identity, &resource, &id)
                .await
                .map_err(describe)?;
            print_json(&json!({ "deleted": id }))
        }
        Commands::Resources => {
            let snapshot = service.registry().snapshot();
            let resources: Vec<_> = snapshot
                .resources()
                .map(|schema| {
                    json!({
                        "name": schema.name(),
                        "properties": schema.properties(),
                        "rules": schema.rules(),
                    })
                })
                .collect();
            print_json(&resources)
        }
    }
}

fn field_names(fields: &[PlannedField]) -> Vec<serde_json::Value> {
    fields
        .iter()
        .map(|field| match field {
            PlannedField::Scalar(prop) => json!(prop.name()),
            PlannedField::Relation { name, body, .. } => {
                json!({ name.as_str(): field_names(&body.fields) })
            }
        })
        .collect()
}

fn parse_data(raw: &str) -> anyhow::Result<BTreeMap<String, Value>> {
    serde_json::from_str(raw).context("--data must be a JSON object")
}

fn describe(err: ServiceError) -> anyhow::Error {
    let class = if err.is_client_error() {
        "request rejected"
    } else {
        "storage failure"
    };
    anyhow::Error::new(err).context(class)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
