//! Document lifecycle shared by every stored record.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::DocName;

/// Two-stage lifecycle: drafts are freely editable and deletable, submitted
/// records are immutable except through cancellation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocStatus {
    #[default]
    Draft,
    Submitted,
    Cancelled,
}

impl DocStatus {
    pub fn is_draft(self) -> bool {
        self == DocStatus::Draft
    }

    pub fn is_submitted(self) -> bool {
        self == DocStatus::Submitted
    }

    /// Numeric form used by import/export files (0 = draft, 1 = submitted, 2 = cancelled).
    pub fn as_index(self) -> u8 {
        match self {
            DocStatus::Draft => 0,
            DocStatus::Submitted => 1,
            DocStatus::Cancelled => 2,
        }
    }
}

impl core::fmt::Display for DocStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            DocStatus::Draft => "draft",
            DocStatus::Submitted => "submitted",
            DocStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A named record with a lifecycle status.
pub trait Document {
    /// Document type name as stored in back-references (e.g. `"Journal Entry"`).
    const DOCTYPE: &'static str;

    fn name(&self) -> &DocName;

    fn docstatus(&self) -> DocStatus;

    /// Draft → Submitted.
    fn ensure_submittable(&self) -> DomainResult<()> {
        self.ensure_status(DocStatus::Draft, "submit")
    }

    /// Submitted → Cancelled.
    fn ensure_cancellable(&self) -> DomainResult<()> {
        self.ensure_status(DocStatus::Submitted, "cancel")
    }

    fn ensure_status(&self, expected: DocStatus, action: &'static str) -> DomainResult<()> {
        let status = self.docstatus();
        if status != expected {
            return Err(DomainError::InvalidTransition {
                doctype: Self::DOCTYPE,
                action,
                status,
            });
        }
        Ok(())
    }
}
