//! Accounting module: account closing vouchers over a double-entry journal.
//!
//! Domain logic is pure; the ledger, balance computation and background queue
//! are reached through the traits in [`ports`]. [`memory`] provides in-memory
//! implementations for tests and the demo driver.

pub mod account;
pub mod closing;
pub mod config;
pub mod journal;
pub mod memory;
pub mod ports;
pub mod queue;
pub mod voucher;

pub use account::{AccountMeta, ReportType};
pub use closing::{
    AccountOutcome, ClosingError, ClosingReport, ClosingVoucherProcessor, Dispatch, OutcomeStatus,
    TeardownReport, closing_entry,
};
pub use config::{ClosingConfig, FailurePolicy};
pub use journal::{DocReference, JournalEntry, JournalEntryAccount, JournalError};
pub use memory::InMemoryLedger;
pub use ports::{
    AccountDirectory, BalanceSource, ClosingJob, ClosingQueue, JournalBook, Ledger, LookupError,
    PostingError, QueueError,
};
pub use queue::{CLOSING_JOB_KIND, JobQueue, register_closing_handler};
pub use voucher::{AccountToClose, ClosingVoucher};
