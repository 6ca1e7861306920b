use std::fmt;

use serde::{Deserialize, Serialize};

/// Scalar compared against record fields when deciding row visibility.
///
/// Also the value type of identity attributes. Record values are converted
/// into it by the record provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl ScopeValue {
    /// Token binding form (`42`, `acme`, `true`).
    #[must_use]
    pub fn as_binding(&self) -> String {
        self.to_string()
    }

    /// Equality that lets `"42"` match `42`.
    ///
    /// Identity attributes often arrive as strings while the guarded column
    /// is an integer.
    #[must_use]
    pub fn loosely_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(n), Self::String(s)) | (Self::String(s), Self::Int(n)) => {
                s.parse::<i64>().is_ok_and(|parsed| parsed == *n)
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for ScopeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<String> for ScopeValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for ScopeValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<i64> for ScopeValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for ScopeValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Predicate on one record field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScopeFilter {
    /// `field = value`
    Eq { property: String, value: ScopeValue },
    /// `field IN (values)`; an empty list admits nothing.
    In {
        property: String,
        values: Vec<ScopeValue>,
    },
}

impl ScopeFilter {
    #[must_use]
    pub fn eq(property: impl Into<String>, value: impl Into<ScopeValue>) -> Self {
        Self::Eq {
            property: property.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn any_of<V: Into<ScopeValue>>(
        property: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In {
            property: property.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn property(&self) -> &str {
        match self {
            Self::Eq { property, .. } | Self::In { property, .. } => property,
        }
    }

    /// Accepted values; one element for `Eq`.
    #[must_use]
    pub fn values(&self) -> &[ScopeValue] {
        match self {
            Self::Eq { value, .. } => std::slice::from_ref(value),
            Self::In { values, .. } => values,
        }
    }

    #[must_use]
    pub fn accepts(&self, candidate: &ScopeValue) -> bool {
        self.values().iter().any(|v| v.loosely_eq(candidate))
    }
}

/// Filters that must all hold for a row to pass.
#[derive(Clone, Debug, PartialEq)]
pub struct ScopeConstraint {
    filters: Vec<ScopeFilter>,
}

impl ScopeConstraint {
    #[must_use]
    pub fn new(filters: Vec<ScopeFilter>) -> Self {
        Self { filters }
    }

    #[must_use]
    pub fn filters(&self) -> &[ScopeFilter] {
        &self.filters
    }

    /// No filters: every row passes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Check a row; a field the row does not expose fails the filter.
    pub fn matches<F>(&self, lookup: &mut F) -> bool
    where
        F: FnMut(&str) -> Option<ScopeValue>,
    {
        self.filters
            .iter()
            .all(|filter| lookup(filter.property()).is_some_and(|v| filter.accepts(&v)))
    }
}

/// Row visibility for one caller on one resource.
///
/// A row is visible when any constraint matches it. The unconstrained scope
/// sees every row; the default scope sees none.
///
/// ```
/// use modkit_security::{AccessScope, ScopeConstraint, ScopeFilter, ScopeValue};
///
/// let nobody = AccessScope::deny_all();
/// assert!(nobody.is_deny_all());
///
/// let own = AccessScope::single(ScopeConstraint::new(vec![ScopeFilter::eq("owner_id", 42)]));
/// assert!(own.matches(|field| (field == "owner_id").then_some(ScopeValue::Int(42))));
///
/// assert!(own.union(AccessScope::allow_all()).is_unconstrained());
/// ```
#[derive(Clone, Debug, PartialEq, Default)]
pub struct AccessScope {
    constraints: Vec<ScopeConstraint>,
    unconstrained: bool,
}

impl AccessScope {
    #[must_use]
    pub fn single(constraint: ScopeConstraint) -> Self {
        Self {
            constraints: vec![constraint],
            unconstrained: false,
        }
    }

    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            constraints: Vec::new(),
            unconstrained: true,
        }
    }

    #[must_use]
    pub fn deny_all() -> Self {
        Self::default()
    }

    /// OR of two scopes. Allow-all absorbs everything, deny-all is neutral.
    #[must_use]
    pub fn union(mut self, other: Self) -> Self {
        if self.unconstrained || other.unconstrained {
            return Self::allow_all();
        }
        self.constraints.extend(other.constraints);
        if self.constraints.iter().any(ScopeConstraint::is_empty) {
            return Self::allow_all();
        }
        self
    }

    #[must_use]
    pub fn constraints(&self) -> &[ScopeConstraint] {
        &self.constraints
    }

    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.unconstrained
    }

    #[must_use]
    pub fn is_deny_all(&self) -> bool {
        !self.unconstrained && self.constraints.is_empty()
    }

    #[must_use]
    pub fn has_property(&self, property: &str) -> bool {
        self.properties().contains(&property)
    }

    /// Fields the scope inspects, first occurrence order.
    #[must_use]
    pub fn properties(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for filter in self.constraints.iter().flat_map(ScopeConstraint::filters) {
            if !out.contains(&filter.property()) {
                out.push(filter.property());
            }
        }
        out
    }

    /// Check a row whose fields are read through `lookup`.
    pub fn matches<F>(&self, mut lookup: F) -> bool
    where
        F: FnMut(&str) -> Option<ScopeValue>,
    {
        self.unconstrained || self.constraints.iter().any(|c| c.matches(&mut lookup))
    }
}
