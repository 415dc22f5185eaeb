//! `acctkit-patches`: metadata patches run once per site.

pub mod closing_reference;
pub mod error;
pub mod meta;
pub mod options;
pub mod patch;

pub use closing_reference::SetupClosingReferenceType;
pub use error::PatchError;
pub use meta::{FieldMeta, InMemoryMetaStore, MetaStore, PropertySetter};
pub use options::merge_options;
pub use patch::{Patch, PatchLog, PatchOutcome};
