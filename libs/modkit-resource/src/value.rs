use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use modkit_security::ScopeValue;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

/// ISO-8601 calendar date (`2024-03-01`), the only date form accepted.
pub const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// A field value as seen by the query engine.
///
/// JSON conversion happens at the record-provider and CLI boundaries; dates
/// arrive as strings and become [`Value::Date`] once a schema says so.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(Date),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the variant, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Date(_) => "date",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Order two values of compatible types.
    ///
    /// Integers and floats compare numerically, strings ordinally (byte-wise,
    /// case-sensitive), dates chronologically. Anything else, including
    /// `Null`, is incomparable.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Float(b)) => compare_int_float(*a, *b),
            (Self::Float(a), Self::Int(b)) => compare_int_float(*b, *a).map(Ordering::reverse),
            (Self::Str(a), Self::Str(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Exact equality used by `=` / `!=`; numeric types compare across variants.
    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                self.compare(other) == Some(Ordering::Equal)
            }
            _ => self == other,
        }
    }

    /// Convert from JSON. Integral numbers become `Int`, others `Float`.
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to JSON. Non-finite floats become `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(n) => serde_json::Value::from(*n),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::Date(_) => serde_json::Value::String(self.to_string()),
            Self::Array(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Scalar view used when matching row-visibility filters.
    #[must_use]
    pub fn to_scope_value(&self) -> Option<ScopeValue> {
        match self {
            Self::Bool(b) => Some(ScopeValue::Bool(*b)),
            Self::Int(n) => Some(ScopeValue::Int(*n)),
            Self::Str(s) => Some(ScopeValue::String(s.clone())),
            Self::Date(_) => Some(ScopeValue::String(self.to_string())),
            Self::Null | Self::Float(_) | Self::Array(_) | Self::Object(_) => None,
        }
    }

    /// Parse an ISO-8601 date string.
    ///
    /// # Errors
    /// Returns the parser message when `raw` is not `YYYY-MM-DD`.
    pub fn parse_date(raw: &str) -> Result<Self, String> {
        Date::parse(raw, DATE_FORMAT)
            .map(Self::Date)
            .map_err(|e| e.to_string())
    }
}

/// `2^63`, exactly representable as `f64`.
const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

/// Exact `int <=> float` without rounding the integer through `f64`.
#[allow(clippy::cast_possible_truncation)]
fn compare_int_float(int: i64, float: f64) -> Option<Ordering> {
    if float.is_nan() {
        return None;
    }
    if float >= TWO_POW_63 {
        return Some(Ordering::Less);
    }
    if float < -TWO_POW_63 {
        return Some(Ordering::Greater);
    }
    // In [-2^63, 2^63) the truncated float is an exact i64.
    let whole = float.trunc();
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(float - whole)),
        ord => Some(ord),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Date(d) => match d.format(DATE_FORMAT) {
                Ok(s) => f.write_str(&s),
                Err(_) => write!(f, "{d}"),
            },
            Self::Array(_) | Self::Object(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<ScopeValue> for Value {
    fn from(v: ScopeValue) -> Self {
        match v {
            ScopeValue::Bool(b) => Self::Bool(b),
            ScopeValue::Int(n) => Self::Int(n),
            ScopeValue::String(s) => Self::Str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from_json)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_values_compare_across_variants() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Some(Ordering::Less));
        assert!(Value::Int(3).equals(&Value::Float(3.0)));
        assert!(!Value::Int(3).equals(&Value::Str("3".to_owned())));
    }

    #[test]
    fn large_integers_compare_exactly_with_floats() {
        let big = Value::Int(9_007_199_254_740_993); // 2^53 + 1
        let float = Value::Float(9_007_199_254_740_992.0); // 2^53
        assert_eq!(big.compare(&float), Some(Ordering::Greater));
        assert_eq!(float.compare(&big), Some(Ordering::Less));
        assert!(!big.equals(&float));

        // transitive across the mixed pair
        let smaller = Value::Int(9_007_199_254_740_992);
        assert_eq!(smaller.compare(&float), Some(Ordering::Equal));
        assert_eq!(smaller.compare(&big), Some(Ordering::Less));

        assert_eq!(Value::Int(i64::MAX).compare(&Value::Float(TWO_POW_63)), Some(Ordering::Less));
        assert_eq!(Value::Int(i64::MIN).compare(&Value::Float(-TWO_POW_63)), Some(Ordering::Equal));
        assert_eq!(Value::Int(-3).compare(&Value::Float(-2.5)), Some(Ordering::Less));
        assert_eq!(Value::Int(-2).compare(&Value::Float(-2.5)), Some(Ordering::Greater));
        assert_eq!(Value::Int(1).compare(&Value::Float(f64::NAN)), None);
        assert_eq!(Value::Int(1).compare(&Value::Float(f64::INFINITY)), Some(Ordering::Less));
    }

    #[test]
    fn strings_compare_case_sensitively() {
        let upper = Value::from("Zed");
        let lower = Value::from("abe");
        assert_eq!(upper.compare(&lower), Some(Ordering::Less));
        assert!(!Value::from("new").equals(&Value::from("New")));
    }

    #[test]
    fn null_is_incomparable() {
        assert_eq!(Value::Null.compare(&Value::Int(1)), None);
        assert_eq!(Value::Int(1).compare(&Value::from("1")), None);
    }

    #[test]
    fn dates_parse_and_render_iso() {
        let d = Value::parse_date("2024-03-01").unwrap();
        assert_eq!(d.to_string(), "2024-03-01");
        assert_eq!(d.to_json(), json!("2024-03-01"));
        let later = Value::parse_date("2024-12-31").unwrap();
        assert_eq!(d.compare(&later), Some(Ordering::Less));
        assert!(Value::parse_date("03/01/2024").is_err());
    }

    #[test]
    fn json_conversion_keeps_integers_integral() {
        let v = Value::from_json(json!({"n": 5, "x": 1.5, "tags": ["a"], "none": null}));
        let Value::Object(map) = &v else {
            panic!("expected object, got {v:?}");
        };
        assert_eq!(map["n"], Value::Int(5));
        assert_eq!(map["x"], Value::Float(1.5));
        assert_eq!(map["tags"], Value::Array(vec![Value::from("a")]));
        assert!(map["none"].is_null());
        assert_eq!(v.to_json(), json!({"n": 5, "x": 1.5, "tags": ["a"], "none": null}));
    }

    #[test]
    fn scope_value_view() {
        assert_eq!(Value::Int(42).to_scope_value(), Some(ScopeValue::Int(42)));
        assert_eq!(Value::Float(1.0).to_scope_value(), None);
        assert_eq!(Value::from(ScopeValue::from("x")), Value::from("x"));
    }
}
