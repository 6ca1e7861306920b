//! Error taxonomy of the query and write pipeline.
//!
//! | error           | raised by     | surfaced as  |
//! |-----------------|---------------|--------------|
//! | `ParseError`    | parser        | client error |
//! | `PlanError`     | planner       | client error |
//! | `EvalError`     | evaluator     | server error |
//! | `MutationError` | mutation gate | client error (server error for provider failures) |

use modkit_resource::Operation;
use thiserror::Error;

use crate::provider::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    Syntax,
    /// A group that must hold at least one element is empty: `?()`, `^()`, `{}`.
    EmptyQuery,
}

/// Malformed query text. `position` is a byte offset into the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at position {position}")]
pub struct ParseError {
    kind: ParseErrorKind,
    position: usize,
    message: String,
}

impl ParseError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self {
            kind: ParseErrorKind::Syntax,
            position,
            message: message.into(),
        }
    }

    pub(crate) fn empty(position: usize, message: impl Into<String>) -> Self {
        Self {
            kind: ParseErrorKind::EmptyQuery,
            position,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanErrorKind {
    UnknownResource,
    UnknownField,
    Forbidden,
    InvalidPath,
    TypeMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("unknown resource '{0}'")]
    UnknownResource(String),

    #[error("unknown field '{path}'")]
    UnknownField { path: String },

    #[error("{operation} on '{path}' is not permitted")]
    Forbidden { path: String, operation: Operation },

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("'{path}' cannot be compared with {literal}: expected {expected}")]
    TypeMismatch {
        path: String,
        literal: String,
        expected: String,
    },
}

impl PlanError {
    #[must_use]
    pub fn kind(&self) -> PlanErrorKind {
        match self {
            Self::UnknownResource(_) => PlanErrorKind::UnknownResource,
            Self::UnknownField { .. } => PlanErrorKind::UnknownField,
            Self::Forbidden { .. } => PlanErrorKind::Forbidden,
            Self::InvalidPath { .. } => PlanErrorKind::InvalidPath,
            Self::TypeMismatch { .. } => PlanErrorKind::TypeMismatch,
        }
    }

    /// Offending path, when the error concerns one.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::UnknownResource(_) => None,
            Self::UnknownField { path }
            | Self::Forbidden { path, .. }
            | Self::InvalidPath { path, .. }
            | Self::TypeMismatch { path, .. } => Some(path),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    ProviderFailure,
}

/// The only way a planned query fails: the record provider did.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("record provider failed")]
    ProviderFailure {
        #[from]
        source: ProviderError,
    },
}

impl EvalError {
    #[must_use]
    pub fn kind(&self) -> EvalErrorKind {
        match self {
            Self::ProviderFailure { .. } => EvalErrorKind::ProviderFailure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationErrorKind {
    UnknownField,
    Forbidden,
    MissingRequired,
    InvalidValue,
    ProviderFailure,
}

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("unknown field '{field}'")]
    UnknownField { field: String },

    #[error("writing '{field}' is not permitted")]
    Forbidden { field: String },

    #[error("required field '{field}' is missing")]
    MissingRequired { field: String },

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("record provider rejected the write")]
    ProviderFailure {
        #[from]
        source: ProviderError,
    },
}

impl MutationError {
    #[must_use]
    pub fn kind(&self) -> MutationErrorKind {
        match self {
            Self::UnknownField { .. } => MutationErrorKind::UnknownField,
            Self::Forbidden { .. } => MutationErrorKind::Forbidden,
            Self::MissingRequired { .. } => MutationErrorKind::MissingRequired,
            Self::InvalidValue { .. } => MutationErrorKind::InvalidValue,
            Self::ProviderFailure { .. } => MutationErrorKind::ProviderFailure,
        }
    }

    /// Offending field, when the error concerns one.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::UnknownField { field }
            | Self::Forbidden { field }
            | Self::MissingRequired { field }
            | Self::InvalidValue { field, .. } => Some(field),
            Self::ProviderFailure { .. } => None,
        }
    }
}
