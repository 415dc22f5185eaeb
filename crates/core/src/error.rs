//! Errors shared by every document type.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Business-rule failures. Storage and I/O errors live in each crate's own
/// error type and wrap this one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Shown to the user as is.
    #[error("{0}")]
    Validation(String),

    /// A name was empty or otherwise unusable as an identifier.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// A referenced document does not exist.
    #[error("{doctype} {name} not found")]
    NotFound { doctype: &'static str, name: String },

    /// The document is not in a state that allows the requested transition.
    #[error("cannot {action} {doctype} in state {status}")]
    InvalidTransition {
        doctype: &'static str,
        action: &'static str,
        status: crate::DocStatus,
    },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_name(msg: impl Into<String>) -> Self {
        Self::InvalidName(msg.into())
    }

    pub fn not_found(doctype: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            doctype,
            name: name.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
