//! Scope resolution: rules + identity → per-request [`ScopeContext`].
//!
//! ## Resolution Matrix
//!
//! | satisfied rules | tokens            | visibility                      |
//! |-----------------|-------------------|---------------------------------|
//! | none            | empty             | `deny_all()`                    |
//! | one             | that rule's token | that rule's predicate           |
//! | several         | all their tokens  | OR of the predicates (broadest) |

use std::collections::BTreeSet;

use crate::access_scope::AccessScope;
use crate::context::Identity;
use crate::rules::ScopeRule;
use crate::token::{ScopePattern, ScopeToken};

/// Scope tokens granted to one caller for one resource, plus the row
/// visibility those tokens unlock.
///
/// Created once per request and discarded at request end.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeContext {
    resource: String,
    tokens: BTreeSet<ScopeToken>,
    visibility: AccessScope,
    /// Tokens were granted to an authenticated identity; gates `*`.
    authenticated: bool,
}

impl ScopeContext {
    /// A context granting nothing.
    #[must_use]
    pub fn empty(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            tokens: BTreeSet::new(),
            visibility: AccessScope::deny_all(),
            authenticated: false,
        }
    }

    /// Build a context from explicit parts, held by an authenticated caller.
    #[must_use]
    pub fn new(
        resource: impl Into<String>,
        tokens: impl IntoIterator<Item = ScopeToken>,
        visibility: AccessScope,
    ) -> Self {
        Self {
            resource: resource.into(),
            tokens: tokens.into_iter().collect(),
            visibility,
            authenticated: true,
        }
    }

    /// Mark the holder as authenticated or not.
    #[must_use]
    pub fn authenticated(mut self, authenticated: bool) -> Self {
        self.authenticated = authenticated;
        self
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    #[must_use]
    pub fn tokens(&self) -> &BTreeSet<ScopeToken> {
        &self.tokens
    }

    /// Row-visibility predicate for this caller on this resource.
    #[must_use]
    pub fn visibility(&self) -> &AccessScope {
        &self.visibility
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    #[must_use]
    pub fn holds(&self, token: &ScopeToken) -> bool {
        self.tokens.contains(token)
    }

    /// Returns `true` if any held token is accepted by any pattern.
    ///
    /// An empty pattern set denies everyone; an empty context is denied by
    /// every pattern. The wildcard `*` only admits authenticated callers, so
    /// tokens from `allow_anonymous` rules never satisfy it.
    #[must_use]
    pub fn allows(&self, patterns: &[ScopePattern]) -> bool {
        patterns.iter().any(|pattern| {
            (self.authenticated || *pattern != ScopePattern::Any)
                && self.tokens.iter().any(|token| pattern.accepts(token))
        })
    }
}

/// Evaluate every rule of `resource` against `identity`.
#[must_use]
pub fn resolve_scope(identity: &Identity, resource: &str, rules: &[ScopeRule]) -> ScopeContext {
    let mut tokens = BTreeSet::new();
    let mut visibility = AccessScope::deny_all();

    for rule in rules {
        if let Some(grant) = rule.grant(identity) {
            tracing::trace!(resource, token = %grant.token, "scope rule satisfied");
            tokens.insert(grant.token);
            visibility = visibility.union(grant.visibility);
        }
    }

    tracing::debug!(
        resource,
        tokens = tokens.len(),
        unconstrained = visibility.is_unconstrained(),
        "resolved scope context"
    );

    ScopeContext {
        resource: resource.to_owned(),
        tokens,
        visibility,
        authenticated: identity.is_authenticated(),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::access_scope::ScopeValue;

    fn rules() -> Vec<ScopeRule> {
        vec![
            ScopeRule::role("admin", "admin"),
            ScopeRule::self_match("user", "id"),
        ]
    }

    #[test]
    fn no_matching_rule_yields_empty_context() {
        let ctx = resolve_scope(&Identity::anonymous(), "users", &rules());
        assert!(ctx.is_empty());
        assert!(ctx.visibility().is_deny_all());
        assert!(!ctx.allows(&[ScopePattern::Any]));
    }

    #[test]
    fn plain_user_gets_self_token_only() {
        let caller = Identity::builder().subject_id(42).build();
        let ctx = resolve_scope(&caller, "users", &rules());

        assert_eq!(ctx.tokens().len(), 1);
        assert!(ctx.holds(&ScopeToken::bound("user", "42")));
        assert!(!ctx.allows(&[ScopePattern::Rule("admin".to_owned())]));
        assert!(ctx.allows(&[ScopePattern::Rule("user".to_owned())]));
        assert!(ctx.allows(&[ScopePattern::Any]));

        let row_id = ScopeValue::Int(42);
        assert!(ctx.visibility().matches(|_| Some(row_id.clone())));
        assert!(!ctx.visibility().matches(|_| Some(ScopeValue::Int(7))));
    }

    #[test]
    fn admin_and_self_union_is_unrestricted() {
        let caller = Identity::builder().subject_id(42).role("admin").build();
        let ctx = resolve_scope(&caller, "users", &rules());

        assert_eq!(ctx.tokens().len(), 2);
        assert!(ctx.visibility().is_unconstrained());
    }

    #[test]
    fn wildcard_needs_an_authenticated_caller() {
        let rules = [ScopeRule::field_equals("public", "public", true).allow_anonymous()];
        let ctx = resolve_scope(&Identity::anonymous(), "docs", &rules);

        assert!(ctx.holds(&ScopeToken::unbound("public")));
        assert!(!ctx.is_authenticated());
        assert!(!ctx.allows(&[ScopePattern::Any]));
        assert!(ctx.allows(&[ScopePattern::Rule("public".to_owned())]));

        let member = Identity::builder().subject_id(5).build();
        assert!(resolve_scope(&member, "docs", &rules).allows(&[ScopePattern::Any]));
    }

    #[test]
    fn empty_pattern_set_denies_all() {
        let caller = Identity::builder().subject_id(1).role("admin").build();
        let ctx = resolve_scope(&caller, "users", &rules());
        assert!(!ctx.allows(&[]));
    }
}
