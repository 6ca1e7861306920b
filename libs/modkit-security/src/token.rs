//! Scope tokens and the patterns permission matrices are written in.
//!
//! A token is what a caller *holds* (`admin`, `user:42`); a pattern is what a
//! property *accepts* (`*`, `admin`, `user`, `user:{id}`, `user:42`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Pattern accepting any granted token.
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenParseError {
    #[error("scope token is empty")]
    Empty,
    #[error("scope token '{0}' has an empty rule name")]
    EmptyRule(String),
    #[error("scope token '{0}' contains whitespace")]
    Whitespace(String),
}

/// A granted scope token: a rule name with an optional binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScopeToken {
    rule: String,
    binding: Option<String>,
}

impl ScopeToken {
    /// Token without a binding (`admin`).
    #[must_use]
    pub fn unbound(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            binding: None,
        }
    }

    /// Token bound to a value (`user:42`).
    #[must_use]
    pub fn bound(rule: impl Into<String>, binding: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            binding: Some(binding.into()),
        }
    }

    #[must_use]
    pub fn rule(&self) -> &str {
        &self.rule
    }

    #[must_use]
    pub fn binding(&self) -> Option<&str> {
        self.binding.as_deref()
    }
}

impl fmt::Display for ScopeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.binding {
            Some(binding) => write!(f, "{}:{binding}", self.rule),
            None => f.write_str(&self.rule),
        }
    }
}

fn split_token(raw: &str) -> Result<(&str, Option<&str>), TokenParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(TokenParseError::Empty);
    }
    if raw.chars().any(char::is_whitespace) {
        return Err(TokenParseError::Whitespace(raw.to_owned()));
    }
    let (rule, binding) = match raw.split_once(':') {
        Some((rule, binding)) => (rule, Some(binding)),
        None => (raw, None),
    };
    if rule.is_empty() {
        return Err(TokenParseError::EmptyRule(raw.to_owned()));
    }
    Ok((rule, binding.filter(|b| !b.is_empty())))
}

impl FromStr for ScopeToken {
    type Err = TokenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rule, binding) = split_token(s)?;
        Ok(Self {
            rule: rule.to_owned(),
            binding: binding.map(str::to_owned),
        })
    }
}

impl TryFrom<String> for ScopeToken {
    type Error = TokenParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScopeToken> for String {
    fn from(token: ScopeToken) -> Self {
        token.to_string()
    }
}

/// An entry of a property permission set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScopePattern {
    /// `*`: any token held by an authenticated caller (enforced by `ScopeContext::allows`).
    Any,
    /// `user` or `user:{id}`: any token of the named rule.
    Rule(String),
    /// `user:42`: exactly this token.
    Exact(ScopeToken),
}

impl ScopePattern {
    /// Returns `true` if the pattern accepts `token`.
    #[must_use]
    pub fn accepts(&self, token: &ScopeToken) -> bool {
        match self {
            Self::Any => true,
            Self::Rule(rule) => token.rule() == rule,
            Self::Exact(exact) => exact == token,
        }
    }
}

impl fmt::Display for ScopePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str(WILDCARD),
            Self::Rule(rule) => f.write_str(rule),
            Self::Exact(token) => write!(f, "{token}"),
        }
    }
}

impl FromStr for ScopePattern {
    type Err = TokenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == WILDCARD {
            return Ok(Self::Any);
        }
        let (rule, binding) = split_token(s)?;
        match binding {
            Some(b) if !(b.starts_with('{') && b.ends_with('}')) => {
                Ok(Self::Exact(ScopeToken::bound(rule, b)))
            }
            _ => Ok(Self::Rule(rule.to_owned())),
        }
    }
}

/// Lenient conversion used by schema builders.
///
/// Malformed input yields a pattern no token can satisfy.
impl From<&str> for ScopePattern {
    fn from(raw: &str) -> Self {
        raw.parse()
            .unwrap_or_else(|_| Self::Rule(raw.trim().to_owned()))
    }
}

impl TryFrom<String> for ScopePattern {
    type Error = TokenParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScopePattern> for String {
    fn from(pattern: ScopePattern) -> Self {
        pattern.to_string()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn token_parses_rule_and_binding() {
        let token: ScopeToken = "user:42".parse().unwrap();
        assert_eq!(token.rule(), "user");
        assert_eq!(token.binding(), Some("42"));
        assert_eq!(token.to_string(), "user:42");

        let admin: ScopeToken = "admin".parse().unwrap();
        assert_eq!(admin, ScopeToken::unbound("admin"));
    }

    #[test]
    fn token_rejects_malformed_input() {
        assert_eq!("".parse::<ScopeToken>(), Err(TokenParseError::Empty));
        assert!(matches!(
            ":42".parse::<ScopeToken>(),
            Err(TokenParseError::EmptyRule(_))
        ));
        assert!(matches!(
            "user 42".parse::<ScopeToken>(),
            Err(TokenParseError::Whitespace(_))
        ));
    }

    #[test]
    fn pattern_forms() {
        assert_eq!("*".parse::<ScopePattern>().unwrap(), ScopePattern::Any);
        assert_eq!(
            "user".parse::<ScopePattern>().unwrap(),
            ScopePattern::Rule("user".to_owned())
        );
        assert_eq!(
            "user:{id}".parse::<ScopePattern>().unwrap(),
            ScopePattern::Rule("user".to_owned())
        );
        assert_eq!(
            "user:42".parse::<ScopePattern>().unwrap(),
            ScopePattern::Exact(ScopeToken::bound("user", "42"))
        );
    }

    #[test]
    fn pattern_matching() {
        let user42 = ScopeToken::bound("user", "42");
        let admin = ScopeToken::unbound("admin");

        assert!(ScopePattern::Any.accepts(&user42));
        assert!(ScopePattern::Rule("user".to_owned()).accepts(&user42));
        assert!(!ScopePattern::Rule("admin".to_owned()).accepts(&user42));
        assert!(ScopePattern::Rule("admin".to_owned()).accepts(&admin));
        assert!(!ScopePattern::Exact(ScopeToken::bound("user", "7")).accepts(&user42));
    }

    #[test]
    fn pattern_serde_uses_string_form() {
        let patterns: Vec<ScopePattern> =
            serde_json::from_str(r#"["admin", "user:{id}", "*"]"#).unwrap();
        assert_eq!(patterns.len(), 3);
        let json = serde_json::to_string(&patterns).unwrap();
        assert_eq!(json, r#"["admin","user","*"]"#);
    }
}
