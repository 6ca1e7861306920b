#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
pub mod access_scope;
pub mod context;
pub mod resolver;
pub mod rules;
pub mod token;

pub use access_scope::{AccessScope, ScopeConstraint, ScopeFilter, ScopeValue};
pub use context::{Identity, IdentityBuilder};
pub use resolver::{ScopeContext, resolve_scope};
pub use rules::{ScopeGrant, ScopePredicate, ScopeRule};
pub use token::{ScopePattern, ScopeToken, TokenParseError};
