use std::fmt;

use modkit_security::{ScopeContext, ScopePattern};
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Declared kind of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Int,
    Str,
    Bool,
    Date,
    Enum,
    Password,
    Object,
    Array,
}

impl ValueKind {
    /// Coerce `value` into this kind.
    ///
    /// `Null` passes through untouched; nullability is the caller's concern.
    /// Dates accept ISO strings, enums accept only declared variants (when
    /// any are declared), integers accept integral floats.
    ///
    /// # Errors
    /// Returns a human-readable reason when the value does not fit.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn coerce(self, value: Value, variants: &[String]) -> Result<Value, String> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (Self::Int, v @ Value::Int(_)) => Ok(v),
            (Self::Int, Value::Float(x))
                if x.fract() == 0.0 && x >= i64::MIN as f64 && x <= i64::MAX as f64 =>
            {
                Ok(Value::Int(x as i64))
            }
            (Self::Str | Self::Password, v @ Value::Str(_))
            | (Self::Bool, v @ Value::Bool(_))
            | (Self::Date, v @ Value::Date(_))
            | (Self::Object, v @ Value::Object(_))
            | (Self::Array, v @ Value::Array(_)) => Ok(v),
            (Self::Date, Value::Str(s)) => Value::parse_date(&s),
            (Self::Enum, Value::Str(s)) => {
                if variants.is_empty() || variants.iter().any(|v| *v == s) {
                    Ok(Value::Str(s))
                } else {
                    Err(format!("'{s}' is not one of [{}]", variants.join(", ")))
                }
            }
            (kind, other) => Err(format!("expected {kind}, got {}", other.type_name())),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::Str => "str",
            Self::Bool => "bool",
            Self::Date => "date",
            Self::Enum => "enum",
            Self::Password => "password",
            Self::Object => "object",
            Self::Array => "array",
        };
        f.write_str(name)
    }
}

/// Direction a property can be accessed from the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    #[default]
    ReadWrite,
    /// Never accepted on writes; silently dropped from input.
    ReadOnly,
    /// Never projected, filtered or sorted (e.g. passwords).
    WriteOnly,
}

/// Relation cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    One,
    Many,
}

/// Relation to another resource, referenced by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Relation {
    pub target: String,
    pub cardinality: Cardinality,
}

/// Operation checked against the permission matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Write,
    Filter,
    Sort,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Filter => "filter",
            Self::Sort => "sort",
        };
        f.write_str(name)
    }
}

/// Property permission matrix: four independent pattern sets.
///
/// An empty set denies the operation to everyone.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Permissions {
    pub can_read: Vec<ScopePattern>,
    pub can_write: Vec<ScopePattern>,
    pub can_filter: Vec<ScopePattern>,
    pub can_sort: Vec<ScopePattern>,
}

impl Permissions {
    #[must_use]
    pub fn patterns(&self, op: Operation) -> &[ScopePattern] {
        match op {
            Operation::Read => &self.can_read,
            Operation::Write => &self.can_write,
            Operation::Filter => &self.can_filter,
            Operation::Sort => &self.can_sort,
        }
    }

    fn patterns_mut(&mut self, op: Operation) -> &mut Vec<ScopePattern> {
        match op {
            Operation::Read => &mut self.can_read,
            Operation::Write => &mut self.can_write,
            Operation::Filter => &mut self.can_filter,
            Operation::Sort => &mut self.can_sort,
        }
    }

    /// Returns `true` if `ctx` holds a token accepted for `op`.
    #[must_use]
    pub fn allows(&self, op: Operation, ctx: &ScopeContext) -> bool {
        ctx.allows(self.patterns(op))
    }
}

/// One declared property of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertyDefinition {
    name: String,
    kind: ValueKind,
    #[serde(default)]
    nullable: bool,
    #[serde(default)]
    default: Option<Value>,
    #[serde(default)]
    access: Access,
    /// Properties this one is derived from; non-empty means computed.
    #[serde(default)]
    depends_on: Vec<String>,
    /// Allowed values for `enum` properties.
    #[serde(default)]
    variants: Vec<String>,
    #[serde(default)]
    permissions: Permissions,
    #[serde(default)]
    relation: Option<Relation>,
}

impl PropertyDefinition {
    /// A non-nullable, read-write property that nobody may access yet.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            default: None,
            access: Access::ReadWrite,
            depends_on: Vec::new(),
            variants: Vec::new(),
            permissions: Permissions::default(),
            relation: None,
        }
    }

    /// Relation to a single record of `target`.
    #[must_use]
    pub fn has_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::relation(name, target, Cardinality::One, ValueKind::Object)
    }

    /// Relation to many records of `target`.
    #[must_use]
    pub fn has_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::relation(name, target, Cardinality::Many, ValueKind::Array)
    }

    fn relation(
        name: impl Into<String>,
        target: impl Into<String>,
        cardinality: Cardinality,
        kind: ValueKind,
    ) -> Self {
        let mut prop = Self::new(name, kind);
        prop.nullable = true;
        prop.access = Access::ReadOnly;
        prop.relation = Some(Relation {
            target: target.into(),
            cardinality,
        });
        prop
    }

    // ── Builder ─────────────────────────────────────────────────────

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.access = Access::ReadOnly;
        self
    }

    #[must_use]
    pub fn write_only(mut self) -> Self {
        self.access = Access::WriteOnly;
        self
    }

    #[must_use]
    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(names.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn variants<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variants.extend(values.into_iter().map(Into::into));
        self
    }

    /// Grant `op` to the given patterns (`"admin"`, `"user:{id}"`, `"*"`).
    #[must_use]
    pub fn permit<I, P>(mut self, op: Operation, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ScopePattern>,
    {
        self.permissions
            .patterns_mut(op)
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Grant read, write, filter and sort to the same patterns.
    #[must_use]
    pub fn permit_all<P>(self, patterns: &[P]) -> Self
    where
        P: Clone + Into<ScopePattern>,
    {
        self.permit(Operation::Read, patterns.iter().cloned())
            .permit(Operation::Write, patterns.iter().cloned())
            .permit(Operation::Filter, patterns.iter().cloned())
            .permit(Operation::Sort, patterns.iter().cloned())
    }

    #[must_use]
    pub fn readable_by<I, P>(self, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ScopePattern>,
    {
        self.permit(Operation::Read, patterns)
    }

    #[must_use]
    pub fn writable_by<I, P>(self, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ScopePattern>,
    {
        self.permit(Operation::Write, patterns)
    }

    #[must_use]
    pub fn filterable_by<I, P>(self, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ScopePattern>,
    {
        self.permit(Operation::Filter, patterns)
    }

    #[must_use]
    pub fn sortable_by<I, P>(self, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ScopePattern>,
    {
        self.permit(Operation::Sort, patterns)
    }

    // ── Accessors ───────────────────────────────────────────────────

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[must_use]
    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    #[must_use]
    pub fn access(&self) -> Access {
        self.access
    }

    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    #[must_use]
    pub fn enum_variants(&self) -> &[String] {
        &self.variants
    }

    #[must_use]
    pub fn permissions(&self) -> &Permissions {
        &self.permissions
    }

    #[must_use]
    pub fn relation_info(&self) -> Option<&Relation> {
        self.relation.as_ref()
    }

    #[must_use]
    pub fn is_relation(&self) -> bool {
        self.relation.is_some()
    }

    /// Derived from other properties; never writable.
    #[must_use]
    pub fn is_computed(&self) -> bool {
        !self.depends_on.is_empty()
    }

    /// Must be supplied on create: non-nullable, no default, client-writable.
    #[must_use]
    pub fn is_required(&self) -> bool {
        !self.nullable
            && self.default.is_none()
            && self.access != Access::ReadOnly
            && !self.is_computed()
            && !self.is_relation()
    }

    /// Returns `true` if `ctx` may perform `op` on this property.
    ///
    /// Write-only properties are never readable, filterable or sortable;
    /// read-only properties are never writable.
    #[must_use]
    pub fn allows(&self, op: Operation, ctx: &ScopeContext) -> bool {
        let blocked = match op {
            Operation::Read | Operation::Filter | Operation::Sort => {
                self.access == Access::WriteOnly
            }
            Operation::Write => {
                self.access == Access::ReadOnly || self.is_computed() || self.is_relation()
            }
        };
        !blocked && self.permissions.allows(op, ctx)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use modkit_security::{AccessScope, ScopeToken};

    fn ctx(tokens: &[ScopeToken]) -> ScopeContext {
        ScopeContext::new("users", tokens.iter().cloned(), AccessScope::allow_all())
    }

    #[test]
    fn coerce_checks_kinds() {
        assert_eq!(
            ValueKind::Int.coerce(Value::Float(3.0), &[]),
            Ok(Value::Int(3))
        );
        assert!(ValueKind::Int.coerce(Value::Float(3.5), &[]).is_err());
        assert!(ValueKind::Bool.coerce(Value::from("yes"), &[]).is_err());
        assert_eq!(ValueKind::Str.coerce(Value::Null, &[]), Ok(Value::Null));
        assert!(matches!(
            ValueKind::Date.coerce(Value::from("2024-01-31"), &[]),
            Ok(Value::Date(_))
        ));
    }

    #[test]
    fn coerce_enum_respects_variants() {
        let variants = vec!["new".to_owned(), "done".to_owned()];
        assert!(ValueKind::Enum.coerce(Value::from("new"), &variants).is_ok());
        let err = ValueKind::Enum
            .coerce(Value::from("lost"), &variants)
            .unwrap_err();
        assert!(err.contains("lost"), "unexpected message: {err}");
    }

    #[test]
    fn permission_matrix_is_per_operation() {
        let prop = PropertyDefinition::new("salary", ValueKind::Int)
            .readable_by(["admin"])
            .filterable_by(["admin"])
            .sortable_by(["*"]);

        let admin = ctx(&[ScopeToken::unbound("admin")]);
        let user = ctx(&[ScopeToken::bound("user", "42")]);

        assert!(prop.allows(Operation::Read, &admin));
        assert!(!prop.allows(Operation::Read, &user));
        assert!(!prop.allows(Operation::Filter, &user));
        assert!(prop.allows(Operation::Sort, &user));
        assert!(!prop.allows(Operation::Write, &admin));
    }

    #[test]
    fn access_flags_override_matrix() {
        let password = PropertyDefinition::new("password", ValueKind::Password)
            .write_only()
            .permit_all(&["*"]);
        let created = PropertyDefinition::new("created_at", ValueKind::Date)
            .read_only()
            .permit_all(&["*"]);
        let any = ctx(&[ScopeToken::unbound("admin")]);

        assert!(!password.allows(Operation::Read, &any));
        assert!(password.allows(Operation::Write, &any));
        assert!(created.allows(Operation::Read, &any));
        assert!(!created.allows(Operation::Write, &any));
    }

    #[test]
    fn required_excludes_defaults_and_derived() {
        assert!(PropertyDefinition::new("email", ValueKind::Str).is_required());
        assert!(
            !PropertyDefinition::new("status", ValueKind::Str)
                .default_value("new")
                .is_required()
        );
        assert!(
            !PropertyDefinition::new("full_name", ValueKind::Str)
                .depends_on(["first_name", "last_name"])
                .is_required()
        );
        assert!(!PropertyDefinition::has_one("company", "companies").is_required());
    }

    #[test]
    fn deserializes_with_defaults() {
        let prop: PropertyDefinition = serde_json::from_value(serde_json::json!({
            "name": "status",
            "kind": "enum",
            "variants": ["new", "done"],
            "permissions": {"can_read": ["*"], "can_filter": ["user:{id}"]}
        }))
        .unwrap();

        assert_eq!(prop.kind(), ValueKind::Enum);
        assert_eq!(prop.enum_variants().len(), 2);
        assert!(prop.permissions().can_write.is_empty());
        assert_eq!(
            prop.permissions().can_filter,
            vec![ScopePattern::Rule("user".to_owned())]
        );
    }
}
