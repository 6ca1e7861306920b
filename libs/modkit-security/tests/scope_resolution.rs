#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;

use modkit_security::{
    Identity, ScopePattern, ScopeRule, ScopeToken, ScopeValue, resolve_scope,
};

fn order_rules() -> Vec<ScopeRule> {
    vec![
        ScopeRule::role("admin", "admin"),
        ScopeRule::self_match("user", "customer_id"),
    ]
}

fn order(customer: i64) -> HashMap<&'static str, ScopeValue> {
    HashMap::from([("customer_id", ScopeValue::Int(customer))])
}

#[test]
fn self_scope_sees_only_own_rows() {
    let caller = Identity::builder().subject_id(42).build();
    let ctx = resolve_scope(&caller, "orders", &order_rules());

    let own = order(42);
    let foreign = order(7);
    assert!(ctx.visibility().matches(|p| own.get(p).cloned()));
    assert!(!ctx.visibility().matches(|p| foreign.get(p).cloned()));
}

#[test]
fn admin_or_self_sees_the_admin_view() {
    let caller = Identity::builder().subject_id(42).role("admin").build();
    let ctx = resolve_scope(&caller, "orders", &order_rules());

    assert!(ctx.holds(&ScopeToken::unbound("admin")));
    assert!(ctx.holds(&ScopeToken::bound("user", "42")));

    // A row only the admin predicate admits.
    let foreign = order(7);
    assert!(ctx.visibility().matches(|p| foreign.get(p).cloned()));
}

#[test]
fn permission_patterns_follow_the_granted_tokens() {
    let caller = Identity::builder().subject_id(42).build();
    let ctx = resolve_scope(&caller, "orders", &order_rules());

    let admin_only: Vec<ScopePattern> = vec!["admin".parse().unwrap()];
    let users: Vec<ScopePattern> = vec!["user:{id}".parse().unwrap()];
    let exact_other: Vec<ScopePattern> = vec!["user:7".parse().unwrap()];

    assert!(!ctx.allows(&admin_only));
    assert!(ctx.allows(&users));
    assert!(!ctx.allows(&exact_other));
}

#[test]
fn resource_without_rules_grants_nothing() {
    let caller = Identity::builder().subject_id(42).role("admin").build();
    let ctx = resolve_scope(&caller, "audit_log", &[]);

    assert!(ctx.is_empty());
    assert!(ctx.visibility().is_deny_all());
    assert_eq!(ctx.resource(), "audit_log");
}
