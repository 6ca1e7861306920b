//! JQL: a compact query language for filtering, sorting, paginating and
//! projecting records of declarative resources.
//!
//! ```text
//! $[?(@amount_cents > 10000, @status = "new"), ^(@amount_cents-, @last_name+), 0:20]{id, customer{name}}
//! ```
//!
//! Query text goes through the [parser](mod@parser) into an
//! [`AbstractQuery`]. The [planner](mod@plan) checks it against the schema
//! registry and the caller's scopes, and the [evaluator](mod@eval) runs it
//! over a [`RecordProvider`]. Writes pass the [`mutation`] gate instead.
//! [`ResourceService`] wires the steps together.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod ast;
pub mod config;
pub mod error;
pub mod eval;
pub mod mutation;
pub mod parser;
pub mod plan;
pub mod projected;
pub mod provider;
pub mod service;

pub use ast::{
    AbstractQuery, Comparator, Comparison, Direction, FieldPath, FilterExpr, Literal, Projection,
    ProjectionField, Slice, SortKey,
};
pub use config::QueryConfig;
pub use error::{
    EvalError, EvalErrorKind, MutationError, MutationErrorKind, ParseError, ParseErrorKind,
    PlanError, PlanErrorKind,
};
pub use eval::{evaluate, evaluate_records};
pub use mutation::{WriteMode, prepare_write};
pub use parser::{Parser, parse};
pub use plan::{Planner, QueryBody, ValidatedQuery, plan};
pub use projected::{ProjectedRecord, ProjectedValue};
pub use provider::{
    ID_FIELD, InMemoryProvider, ProviderError, ProviderErrorKind, Record, RecordProvider,
    RelationLink,
};
pub use service::{ResourceService, ServiceError};
