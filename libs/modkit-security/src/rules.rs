//! Scope rules declared on a resource.
//!
//! A rule is a named predicate generator: evaluated against an [`Identity`]
//! it either grants a [`ScopeToken`] together with the row-visibility
//! predicate that token unlocks, or grants nothing.

use serde::{Deserialize, Serialize};

use crate::access_scope::{AccessScope, ScopeConstraint, ScopeFilter, ScopeValue};
use crate::context::{Identity, SUBJECT_ID_ATTRIBUTE};
use crate::token::ScopeToken;

fn default_attribute() -> String {
    SUBJECT_ID_ATTRIBUTE.to_owned()
}

/// Row predicate produced by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScopePredicate {
    /// Every row is visible.
    Unrestricted,
    /// Rows whose `field` equals the caller's `attribute` (default: subject id).
    /// The token is bound to the attribute value, e.g. `user:42`.
    SelfMatch {
        field: String,
        #[serde(default = "default_attribute")]
        attribute: String,
    },
    /// Rows whose `field` equals a fixed value (e.g. `status = "published"`).
    FieldEquals { field: String, value: ScopeValue },
}

/// What a satisfied rule hands to the resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeGrant {
    pub token: ScopeToken,
    pub visibility: AccessScope,
}

/// A named scope rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeRule {
    /// Rule name; becomes the token's rule part (`admin`, `user`).
    pub name: String,
    /// Role the identity must carry for the rule to apply.
    #[serde(default)]
    pub requires_role: Option<String>,
    /// Whether anonymous callers may satisfy the rule.
    #[serde(default)]
    pub anonymous: bool,
    pub predicate: ScopePredicate,
}

impl ScopeRule {
    /// Unrestricted rule gated on a role (`admin` sees everything).
    #[must_use]
    pub fn role(name: &str, role: &str) -> Self {
        Self {
            name: name.to_owned(),
            requires_role: Some(role.to_owned()),
            anonymous: false,
            predicate: ScopePredicate::Unrestricted,
        }
    }

    /// Rule matching rows owned by the caller: `field = identity.id`.
    #[must_use]
    pub fn self_match(name: &str, field: &str) -> Self {
        Self {
            name: name.to_owned(),
            requires_role: None,
            anonymous: false,
            predicate: ScopePredicate::SelfMatch {
                field: field.to_owned(),
                attribute: default_attribute(),
            },
        }
    }

    /// Rule matching rows with a fixed field value.
    #[must_use]
    pub fn field_equals(name: &str, field: &str, value: impl Into<ScopeValue>) -> Self {
        Self {
            name: name.to_owned(),
            requires_role: None,
            anonymous: false,
            predicate: ScopePredicate::FieldEquals {
                field: field.to_owned(),
                value: value.into(),
            },
        }
    }

    /// Require `role` in addition to the predicate.
    #[must_use]
    pub fn with_role(mut self, role: &str) -> Self {
        self.requires_role = Some(role.to_owned());
        self
    }

    /// Allow anonymous callers to satisfy the rule.
    #[must_use]
    pub fn allow_anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }

    /// Evaluate the rule for `identity`.
    ///
    /// Returns `None` when the identity does not satisfy the rule: anonymous
    /// caller on a non-anonymous rule, missing role, or missing attribute.
    #[must_use]
    pub fn grant(&self, identity: &Identity) -> Option<ScopeGrant> {
        if !self.anonymous && !identity.is_authenticated() {
            return None;
        }
        if let Some(role) = &self.requires_role
            && !identity.has_role(role)
        {
            return None;
        }

        match &self.predicate {
            ScopePredicate::Unrestricted => Some(ScopeGrant {
                token: ScopeToken::unbound(&self.name),
                visibility: AccessScope::allow_all(),
            }),
            ScopePredicate::SelfMatch { field, attribute } => {
                let value = identity.attribute(attribute)?;
                Some(ScopeGrant {
                    token: ScopeToken::bound(&self.name, value.as_binding()),
                    visibility: AccessScope::single(ScopeConstraint::new(vec![
                        ScopeFilter::eq(field, value.clone()),
                    ])),
                })
            }
            ScopePredicate::FieldEquals { field, value } => Some(ScopeGrant {
                token: ScopeToken::unbound(&self.name),
                visibility: AccessScope::single(ScopeConstraint::new(vec![ScopeFilter::eq(
                    field,
                    value.clone(),
                )])),
            }),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn role_rule_requires_role() {
        let rule = ScopeRule::role("admin", "admin");
        let admin = Identity::builder().subject_id(1).role("admin").build();
        let user = Identity::builder().subject_id(2).build();

        let grant = rule.grant(&admin).unwrap();
        assert_eq!(grant.token, ScopeToken::unbound("admin"));
        assert!(grant.visibility.is_unconstrained());
        assert!(rule.grant(&user).is_none());
    }

    #[test]
    fn self_match_binds_subject_id() {
        let rule = ScopeRule::self_match("user", "id");
        let caller = Identity::builder().subject_id(42).build();

        let grant = rule.grant(&caller).unwrap();
        assert_eq!(grant.token.to_string(), "user:42");
        assert!(grant.visibility.has_property("id"));
    }

    #[test]
    fn anonymous_callers_need_opt_in() {
        let public = ScopeRule::field_equals("public", "status", "published");
        assert!(public.grant(&Identity::anonymous()).is_none());
        assert!(
            public
                .clone()
                .allow_anonymous()
                .grant(&Identity::anonymous())
                .is_some()
        );
    }

    #[test]
    fn self_match_on_missing_attribute_grants_nothing() {
        let rule = ScopeRule {
            name: "tenant".to_owned(),
            requires_role: None,
            anonymous: false,
            predicate: ScopePredicate::SelfMatch {
                field: "tenant_id".to_owned(),
                attribute: "tenant".to_owned(),
            },
        };
        let caller = Identity::builder().subject_id(1).build();
        assert!(rule.grant(&caller).is_none());
    }

    #[test]
    fn rule_deserializes_from_tagged_form() {
        let rule: ScopeRule = serde_json::from_str(
            r#"{"name": "user", "predicate": {"kind": "self_match", "field": "id"}}"#,
        )
        .unwrap();
        assert_eq!(rule, ScopeRule::self_match("user", "id"));
    }
}
