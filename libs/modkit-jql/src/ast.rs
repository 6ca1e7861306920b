//! Abstract query produced by the parser.
//!
//! Field paths stay raw dotted names; nothing here has been checked against
//! a schema. `Display` renders the canonical JQL form, so
//! `parse(aq.to_string())` yields an equal query.

use std::fmt;

/// `@name(.name)*`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    #[must_use]
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Dotted form without the `@` sigil (`company.name`).
    #[must_use]
    pub fn dotted(&self) -> String {
        self.0.join(".")
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.dotted())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparator {
    /// Ordering comparators are meaningless against `null`.
    #[must_use]
    pub fn is_ordering(self) -> bool {
        matches!(self, Self::Gt | Self::Ge | Self::Lt | Self::Le)
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) if x.fract() == 0.0 && x.is_finite() => write!(f, "{x:.1}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        c => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

/// `@path <op> literal`
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub path: FieldPath,
    pub op: Comparator,
    pub literal: Literal,
}

/// Filter expression tree.
///
/// The parser flattens nested groups of the same combinator, so an `And`
/// never directly contains an `And` (likewise for `Or`).
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Compare(Comparison),
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
}

impl FilterExpr {
    /// Nesting depth; a single comparison has depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Compare(_) => 1,
            Self::And(children) | Self::Or(children) => {
                1 + children.iter().map(Self::depth).max().unwrap_or(0)
            }
        }
    }

    /// Every field path referenced by the tree, left to right.
    #[must_use]
    pub fn paths(&self) -> Vec<&FieldPath> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a FieldPath>) {
        match self {
            Self::Compare(c) => out.push(&c.path),
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_paths(out);
                }
            }
        }
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>, parent_and: bool) -> fmt::Result {
        match self {
            Self::Compare(c) => write!(f, "{} {} {}", c.path, c.op, c.literal),
            Self::And(children) => join(f, children, ", ", true),
            Self::Or(children) if parent_and => {
                f.write_str("(")?;
                join(f, children, " | ", false)?;
                f.write_str(")")
            }
            Self::Or(children) => join(f, children, " | ", false),
        }
    }
}

fn join(
    f: &mut fmt::Formatter<'_>,
    children: &[FilterExpr],
    sep: &str,
    and: bool,
) -> fmt::Result {
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        child.fmt_nested(f, and)?;
    }
    Ok(())
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_nested(f, false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub path: FieldPath,
    pub direction: Direction,
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.direction {
            Direction::Asc => '+',
            Direction::Desc => '-',
        };
        write!(f, "{}{sign}", self.path)
    }
}

/// Pagination window. `None` means "not specified".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slice {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl Slice {
    #[must_use]
    pub fn is_unspecified(&self) -> bool {
        self.offset.is_none() && self.limit.is_none()
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = self.offset.unwrap_or(0);
        if self.offset.is_some() {
            write!(f, "{start}")?;
        }
        f.write_str(":")?;
        if let Some(limit) = self.limit {
            write!(f, "{}", start.saturating_add(limit))?;
        }
        Ok(())
    }
}

/// One projected field, optionally with a nested relation projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionField {
    pub name: String,
    pub nested: Option<Projection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub fields: Vec<ProjectionField>,
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&field.name)?;
            if let Some(nested) = &field.nested {
                write!(f, "{nested}")?;
            }
        }
        f.write_str("}")
    }
}

/// Parsed, schema-agnostic query against one root resource.
#[derive(Debug, Clone, PartialEq)]
pub struct AbstractQuery {
    pub resource: String,
    pub filter: Option<FilterExpr>,
    pub sort: Vec<SortKey>,
    pub slice: Slice,
    /// `None` selects the default projection.
    pub projection: Option<Projection>,
}

impl AbstractQuery {
    /// No filter, no sort, default slice, default projection.
    #[must_use]
    pub fn all(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            filter: None,
            sort: Vec::new(),
            slice: Slice::default(),
            projection: None,
        }
    }
}

impl fmt::Display for AbstractQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        let mut parts = Vec::new();
        if let Some(filter) = &self.filter {
            parts.push(format!("?({filter})"));
        }
        if !self.sort.is_empty() {
            let keys: Vec<String> = self.sort.iter().map(ToString::to_string).collect();
            parts.push(format!("^({})", keys.join(", ")));
        }
        if !self.slice.is_unspecified() {
            parts.push(self.slice.to_string());
        }
        if !parts.is_empty() {
            write!(f, "[{}]", parts.join(", "))?;
        }
        if let Some(projection) = &self.projection {
            write!(f, "{projection}")?;
        }
        Ok(())
    }
}
