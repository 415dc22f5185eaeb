//! Process-wide tracing setup shared by the binaries.

pub mod tracing;

pub use crate::tracing::{ENV_LOG_FORMAT, LogFormat};

/// Initialize logging with the format chosen by `ACCTKIT_LOG_FORMAT`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}
