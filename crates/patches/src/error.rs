use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("property setter {0} not found")]
    PropertySetterNotFound(String),

    #[error("patch {patch} failed: {message}")]
    Failed { patch: String, message: String },

    #[error("metadata storage error: {0}")]
    Storage(String),
}
