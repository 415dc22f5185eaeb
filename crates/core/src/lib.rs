//! `acctkit-core`: shared document building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! document names, the draft/submitted/cancelled lifecycle and the domain error model.

pub mod document;
pub mod error;
pub mod id;

pub use document::{DocStatus, Document};
pub use error::{DomainError, DomainResult};
pub use id::{AccountId, CompanyId, DocName};
