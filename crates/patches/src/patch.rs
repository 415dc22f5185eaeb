//! One-off metadata migrations.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::PatchError;
use crate::meta::MetaStore;

/// What a patch run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied { detail: String },
    /// Nothing to change, e.g. the target field does not exist.
    Skipped { reason: String },
}

pub trait Patch: Send + Sync {
    /// Stable name under which the run is recorded.
    fn name(&self) -> &'static str;

    fn apply(&self, store: &dyn MetaStore) -> Result<PatchOutcome, PatchError>;
}

/// Records which patches have run so each runs at most once.
///
/// Failed runs are not recorded.
#[derive(Debug, Default)]
pub struct PatchLog {
    applied: RwLock<BTreeMap<String, DateTime<Utc>>>,
}

impl PatchLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_run(&self, name: &str) -> Result<bool, PatchError> {
        let applied = self
            .applied
            .read()
            .map_err(|_| PatchError::Storage("patch log lock poisoned".into()))?;
        Ok(applied.contains_key(name))
    }

    /// Run `patch` unless it ran before. `None` means it was already recorded.
    pub fn run(&self, patch: &dyn Patch, store: &dyn MetaStore) -> Result<Option<PatchOutcome>, PatchError> {
        let mut applied = self
            .applied
            .write()
            .map_err(|_| PatchError::Storage("patch log lock poisoned".into()))?;
        if applied.contains_key(patch.name()) {
            debug!(patch = patch.name(), "patch already applied");
            return Ok(None);
        }

        let outcome = patch.apply(store)?;
        applied.insert(patch.name().to_string(), Utc::now());
        info!(patch = patch.name(), ?outcome, "patch executed");
        Ok(Some(outcome))
    }

    /// Run each patch in order, stopping at the first failure.
    pub fn run_all(
        &self,
        patches: &[&dyn Patch],
        store: &dyn MetaStore,
    ) -> Result<Vec<(&'static str, Option<PatchOutcome>)>, PatchError> {
        patches
            .iter()
            .map(|patch| Ok((patch.name(), self.run(*patch, store)?)))
            .collect()
    }
}
