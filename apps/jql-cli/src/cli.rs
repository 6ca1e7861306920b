use std::path::PathBuf;

use clap::{Parser, Subcommand};
use modkit_security::{Identity, ScopeValue};

use crate::logging::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "jql")]
#[command(about = "Run JQL queries and gated writes against declared resources")]
#[command(version)]
pub struct Cli {
    /// YAML configuration holding the registry, seed rows and limits
    #[arg(short, long, global = true, default_value = "jql.yaml")]
    pub config: PathBuf,

    /// Caller subject id; numeric values are matched as integers
    #[arg(short, long, global = true)]
    pub subject: Option<String>,

    /// Caller role, repeatable
    #[arg(short, long = "role", global = true)]
    pub roles: Vec<String>,

    /// Extra caller attribute as `name=value`, repeatable
    #[arg(short, long = "attr", global = true, value_parser = parse_attribute)]
    pub attributes: Vec<(String, String)>,

    /// Log filter directive (overrides the configured level; `RUST_LOG` still wins)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log output format (overrides the configured format)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a query and print the projected records
    Query {
        resource: String,
        /// JQL text; empty means every readable field of the first page
        #[arg(default_value = "")]
        jql: String,
    },
    /// Parse and plan a query without reading any record
    Explain {
        resource: String,
        #[arg(default_value = "")]
        jql: String,
    },
    /// Create a record from a JSON object
    Create { resource: String, data: String },
    /// Partially update a record from a JSON object
    Update {
        resource: String,
        id: String,
        data: String,
    },
    /// Delete a record
    Delete { resource: String, id: String },
    /// List registered resources and their properties
    Resources,
}

impl Cli {
    /// Caller identity described by the global flags; anonymous without `--subject`.
    #[must_use]
    pub fn identity(&self) -> Identity {
        let mut builder = Identity::builder().roles(self.roles.iter().cloned());
        if let Some(subject) = &self.subject {
            builder = builder.subject_id(scope_value(subject));
        }
        for (name, value) in &self.attributes {
            builder = builder.attribute(name, scope_value(value));
        }
        builder.build()
    }
}

fn scope_value(raw: &str) -> ScopeValue {
    raw.parse::<i64>()
        .map_or_else(|_| ScopeValue::from(raw), ScopeValue::from)
}

fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| (name.to_owned(), value.to_owned()))
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))
}
