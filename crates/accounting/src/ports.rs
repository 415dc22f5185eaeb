//! Collaborator interfaces the closing processor depends on.
//!
//! The host ledger (account chart, balance computation, journal persistence)
//! and the background queue are reached only through these traits.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use acctkit_core::{AccountId, CompanyId, DocName, DomainError};
use acctkit_jobs::JobId;

use crate::account::AccountMeta;
use crate::journal::{DocReference, JournalEntry, JournalError};
use crate::voucher::ClosingVoucher;

/// Failure to read ledger data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("account {0} not found")]
    UnknownAccount(AccountId),

    #[error("ledger storage error: {0}")]
    Storage(String),
}

/// Failure to create, post, cancel or delete a journal entry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PostingError {
    #[error("accounting period is closed up to {locked_until}; cannot post on {posting_date}")]
    PeriodClosed {
        locked_until: NaiveDate,
        posting_date: NaiveDate,
    },

    #[error("account {0} is frozen")]
    AccountFrozen(AccountId),

    #[error("account {0} cannot be posted to")]
    NotPostable(AccountId),

    #[error(transparent)]
    Invalid(#[from] JournalError),

    #[error("journal entry {0} not found")]
    NotFound(DocName),

    #[error("journal entry {entry} is linked from {linked_from}")]
    Linked { entry: DocName, linked_from: DocName },

    #[error(transparent)]
    Lifecycle(#[from] DomainError),

    #[error("ledger storage error: {0}")]
    Storage(String),
}

/// Failure to hand a job to the background queue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to enqueue job: {0}")]
pub struct QueueError(pub String);

/// Batch account-metadata lookup.
pub trait AccountDirectory: Send + Sync {
    /// Metadata for the requested accounts, in no particular order.
    ///
    /// Unknown accounts are omitted rather than reported as errors.
    fn accounts(&self, names: &[AccountId]) -> Result<Vec<AccountMeta>, LookupError>;
}

/// Ledger balance computation.
pub trait BalanceSource: Send + Sync {
    /// Signed balance (positive = net debit) of `account` for `company` as of
    /// `date`, inclusive.
    fn balance_on(
        &self,
        account: &AccountId,
        company: &CompanyId,
        date: NaiveDate,
    ) -> Result<Decimal, LookupError>;
}

/// Journal entry persistence.
pub trait JournalBook: Send + Sync {
    /// Create and post (submit) an entry in one step. Returns the assigned name.
    fn submit(&self, entry: JournalEntry) -> Result<DocName, PostingError>;

    fn get(&self, name: &DocName) -> Result<Option<JournalEntry>, PostingError>;

    /// Parent entry names of every line referencing `reference`.
    ///
    /// One name per matching line, so an entry may appear more than once.
    fn referencing(&self, reference: &DocReference) -> Result<Vec<DocName>, PostingError>;

    /// Reverse a submitted entry.
    fn cancel(&self, name: &DocName) -> Result<(), PostingError>;

    /// Delete a draft (or cancelled) entry. `ignore_links` skips the check for
    /// other documents pointing at it.
    fn delete(&self, name: &DocName, ignore_links: bool) -> Result<(), PostingError>;
}

/// Everything the closing processor needs from the host ledger.
pub trait Ledger: AccountDirectory + BalanceSource + JournalBook {}

impl<T: AccountDirectory + BalanceSource + JournalBook> Ledger for T {}

/// Deferred entry generation for one voucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingJob {
    pub voucher: ClosingVoucher,
}

/// Fire-and-forget background queue.
pub trait ClosingQueue: Send + Sync {
    fn enqueue(&self, job: ClosingJob, queue: &str, timeout: Duration) -> Result<JobId, QueueError>;
}

impl<S: AccountDirectory + ?Sized> AccountDirectory for Arc<S> {
    fn accounts(&self, names: &[AccountId]) -> Result<Vec<AccountMeta>, LookupError> {
        (**self).accounts(names)
    }
}

impl<S: BalanceSource + ?Sized> BalanceSource for Arc<S> {
    fn balance_on(
        &self,
        account: &AccountId,
        company: &CompanyId,
        date: NaiveDate,
    ) -> Result<Decimal, LookupError> {
        (**self).balance_on(account, company, date)
    }
}

impl<S: JournalBook + ?Sized> JournalBook for Arc<S> {
    fn submit(&self, entry: JournalEntry) -> Result<DocName, PostingError> {
        (**self).submit(entry)
    }

    fn get(&self, name: &DocName) -> Result<Option<JournalEntry>, PostingError> {
        (**self).get(name)
    }

    fn referencing(&self, reference: &DocReference) -> Result<Vec<DocName>, PostingError> {
        (**self).referencing(reference)
    }

    fn cancel(&self, name: &DocName) -> Result<(), PostingError> {
        (**self).cancel(name)
    }

    fn delete(&self, name: &DocName, ignore_links: bool) -> Result<(), PostingError> {
        (**self).delete(name, ignore_links)
    }
}

impl<S: ClosingQueue + ?Sized> ClosingQueue for Arc<S> {
    fn enqueue(&self, job: ClosingJob, queue: &str, timeout: Duration) -> Result<JobId, QueueError> {
        (**self).enqueue(job, queue, timeout)
    }
}
