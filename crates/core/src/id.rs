//! Strongly-typed document names.
//!
//! Records are addressed by human-readable names ("Cash - LC", "JV-00001"),
//! so identifiers wrap a `String` rather than a UUID.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Name of a ledger account (e.g. `"Travel Advances - LC"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

/// Name of the owning legal entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(String);

/// Name of any stored document (voucher, journal entry, receipt, price record).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocName(String);

macro_rules! impl_name_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Wrap a name. Surrounding whitespace is not significant and is dropped.
            pub fn new(name: impl Into<String>) -> Self {
                let name = name.into();
                let trimmed = name.trim();
                if trimmed.len() == name.len() {
                    Self(name)
                } else {
                    Self(trimmed.to_string())
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $t {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $t {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.trim().is_empty() {
                    return Err(DomainError::invalid_name(format!("{}: empty", $name)));
                }
                Ok(Self::new(s))
            }
        }
    };
}

impl_name_newtype!(AccountId, "AccountId");
impl_name_newtype!(CompanyId, "CompanyId");
impl_name_newtype!(DocName, "DocName");
