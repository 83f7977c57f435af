//! Error types for actions

use statemig_state::AddressError;

/// Errors applying an action to a working state
///
/// Any of these aborts the run before anything durable is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// The action refers to something the state does not track
    #[error("{action}: nothing tracked at {address}")]
    AddressNotFound { action: String, address: String },

    /// The destination is already tracked
    #[error("{action}: {address} is already tracked")]
    AddressAlreadyExists { action: String, address: String },

    /// The action is not a legal edit
    #[error("{action}: {reason}")]
    InvalidTransition { action: String, reason: String },
}

impl ActionError {
    pub(crate) fn not_found(action: impl ToString, address: impl ToString) -> Self {
        Self::AddressNotFound {
            action: action.to_string(),
            address: address.to_string(),
        }
    }

    pub(crate) fn already_exists(action: impl ToString, address: impl ToString) -> Self {
        Self::AddressAlreadyExists {
            action: action.to_string(),
            address: address.to_string(),
        }
    }

    pub(crate) fn invalid(action: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidTransition {
            action: action.to_string(),
            reason: reason.into(),
        }
    }

    /// Short label for logs and reports
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddressNotFound { .. } => "address_not_found",
            Self::AddressAlreadyExists { .. } => "address_already_exists",
            Self::InvalidTransition { .. } => "invalid_transition",
        }
    }
}

/// Errors reading an action string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionParseError {
    /// Blank line
    #[error("empty action")]
    Empty,

    /// First word is not a known command
    #[error("unknown action `{0}` (expected mv, import, rm, forget, xmv or replace-provider)")]
    UnknownVerb(String),

    /// Wrong number of arguments
    #[error("`{verb}` takes {expected}, got {found} argument(s)")]
    Arity {
        verb: String,
        expected: &'static str,
        found: usize,
    },

    /// Quote opened and never closed
    #[error("unterminated quote in `{0}`")]
    UnbalancedQuote(String),

    /// Trailing backslash
    #[error("dangling escape at end of `{0}`")]
    DanglingEscape(String),

    /// Argument is not a resource address
    #[error(transparent)]
    Address(#[from] AddressError),

    /// Wildcard pattern or template is unusable
    #[error("invalid wildcard move `{pattern}` -> `{template}`: {reason}")]
    Wildcard {
        pattern: String,
        template: String,
        reason: String,
    },
}
