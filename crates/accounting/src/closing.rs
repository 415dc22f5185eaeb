//! Account closing voucher processing.
//!
//! The host drives a voucher through an explicit state machine:
//!
//! - `validate` on every save (read-only)
//! - `submit` validates, then generates entries inline or hands the voucher to
//!   the background queue depending on its size
//! - `cancel` flags the voucher so link checks are skipped
//! - `delete` removes still-draft generated entries

use std::collections::{BTreeSet, HashMap};

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use acctkit_core::{AccountId, DocName, DocStatus, Document, DomainError};
use acctkit_jobs::{CancelToken, JobId};

use crate::account::AccountMeta;
use crate::config::{ClosingConfig, FailurePolicy};
use crate::journal::{JournalEntry, JournalEntryAccount};
use crate::ports::{ClosingJob, ClosingQueue, Ledger, LookupError, PostingError, QueueError};
use crate::voucher::ClosingVoucher;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClosingError {
    /// User-correctable rule violation or invalid lifecycle transition.
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("failed to post closing entry for {account}: {source}")]
    Posting {
        account: AccountId,
        #[source]
        source: PostingError,
    },

    /// Generation stopped on request before every account was handled.
    #[error("closing entry generation for {voucher} cancelled after {posted} posted entries")]
    Cancelled { voucher: DocName, posted: usize },

    #[error("failed to find entries referencing {voucher}: {source}")]
    References {
        voucher: DocName,
        #[source]
        source: PostingError,
    },

    #[error("failed to remove closing entry {entry}: {source}")]
    Teardown {
        entry: DocName,
        #[source]
        source: PostingError,
    },

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl ClosingError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ClosingError::Domain(e) if e.is_validation())
    }
}

/// What happened to one account of the voucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Posted { entry: DocName },
    /// Nothing to close.
    SkippedZeroBalance,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountOutcome {
    pub account: AccountId,
    /// Balance before closing; `None` when the lookup itself failed.
    pub balance: Option<Decimal>,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

/// Per-account result of entry generation, in table order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClosingReport {
    pub voucher: Option<DocName>,
    pub outcomes: Vec<AccountOutcome>,
}

impl ClosingReport {
    pub fn posted(&self) -> impl Iterator<Item = &DocName> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            OutcomeStatus::Posted { entry } => Some(entry),
            _ => None,
        })
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::SkippedZeroBalance)
            .count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &AccountOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Failed { .. }))
    }

    pub fn is_complete(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Result of submitting a voucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "dispatch", rename_all = "snake_case")]
pub enum Dispatch {
    /// Entries were generated as part of the submit.
    Completed { report: ClosingReport },
    /// Generation was handed to the background queue.
    Enqueued { job_id: JobId, queue: String },
}

/// Entries found and handled while deleting a voucher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub deleted: Vec<DocName>,
    /// Submitted entries, left untouched.
    pub retained: Vec<DocName>,
}

/// Build the two-line entry that moves `balance` from `account` into the
/// voucher's closing account. Returns `None` for a zero balance.
///
/// A positive (debit) balance is credited on the source account and debited on
/// the closing account; a negative balance the other way round. The closing
/// line is in the voucher's closing account currency.
pub fn closing_entry(
    voucher: &ClosingVoucher,
    account: &AccountId,
    account_currency: &str,
    balance: Decimal,
) -> Option<JournalEntry> {
    if balance.is_zero() {
        return None;
    }

    let amount = balance.abs();
    let reference = voucher.reference();
    let closing_currency = voucher.closing_account_currency.as_str();

    let (source, closing) = if balance < Decimal::ZERO {
        (
            JournalEntryAccount::debit(account.clone(), amount, account_currency),
            JournalEntryAccount::credit(voucher.closing_account.clone(), amount, closing_currency),
        )
    } else {
        (
            JournalEntryAccount::credit(account.clone(), amount, account_currency),
            JournalEntryAccount::debit(voucher.closing_account.clone(), amount, closing_currency),
        )
    };

    Some(
        JournalEntry::new(voucher.company.clone(), voucher.posting_date)
            .with_remark(voucher.remarks.clone())
            .with_line(source.with_reference(reference.clone()))
            .with_line(closing.with_reference(reference)),
    )
}

/// Closing voucher state machine over a host ledger and a background queue.
pub struct ClosingVoucherProcessor<L, Q> {
    ledger: L,
    queue: Q,
    config: ClosingConfig,
}

impl<L: Ledger, Q: ClosingQueue> ClosingVoucherProcessor<L, Q> {
    pub fn new(ledger: L, queue: Q, config: ClosingConfig) -> Self {
        Self {
            ledger,
            queue,
            config,
        }
    }

    pub fn config(&self) -> &ClosingConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Check the voucher's accounts. Performs no writes.
    ///
    /// Metadata for all listed accounts is fetched in a single lookup.
    pub fn validate(&self, voucher: &ClosingVoucher) -> Result<(), ClosingError> {
        let metas = self.ledger.accounts(&voucher.account_names())?;
        voucher.check_accounts(&metas)?;
        Ok(())
    }

    /// Validate and submit a draft voucher, then generate its entries inline or
    /// in the background.
    ///
    /// The voucher only becomes submitted once dispatch succeeded. Under
    /// [`FailurePolicy::Propagate`] entries posted before a failure remain.
    pub fn submit(&self, voucher: &mut ClosingVoucher) -> Result<Dispatch, ClosingError> {
        voucher.ensure_submittable()?;
        self.validate(voucher)?;

        let accounts = voucher.accounts_to_close.len();
        let dispatch = if self.config.should_defer(accounts) {
            let mut submitted = voucher.clone();
            submitted.docstatus = DocStatus::Submitted;
            let job_id = self.queue.enqueue(
                ClosingJob { voucher: submitted },
                &self.config.queue_name,
                self.config.queue_timeout,
            )?;
            info!(
                voucher = %voucher.name,
                accounts,
                job_id = %job_id,
                queue = %self.config.queue_name,
                "closing entries enqueued"
            );
            Dispatch::Enqueued {
                job_id,
                queue: self.config.queue_name.clone(),
            }
        } else {
            let report = self.generate_entries(voucher)?;
            Dispatch::Completed { report }
        };

        voucher.docstatus = DocStatus::Submitted;
        Ok(dispatch)
    }

    /// Post one closing entry per listed account with a non-zero balance, in
    /// table order, according to the configured failure policy.
    pub fn generate_entries(&self, voucher: &ClosingVoucher) -> Result<ClosingReport, ClosingError> {
        self.generate_entries_until(voucher, &CancelToken::new())
    }

    /// [`generate_entries`](Self::generate_entries) that checks `cancel`
    /// before every posting and stops with [`ClosingError::Cancelled`] once it
    /// is set. Under [`FailurePolicy::AllOrNothing`] the entries posted so far
    /// are cancelled as well.
    pub fn generate_entries_until(
        &self,
        voucher: &ClosingVoucher,
        cancel: &CancelToken,
    ) -> Result<ClosingReport, ClosingError> {
        let currencies = self.account_currencies(voucher)?;

        let report = match self.config.failure_policy {
            FailurePolicy::Propagate => self.generate_propagating(voucher, &currencies, cancel)?,
            FailurePolicy::AllOrNothing => {
                self.generate_all_or_nothing(voucher, &currencies, cancel)?
            }
            FailurePolicy::BestEffort => self.generate_best_effort(voucher, &currencies, cancel)?,
        };

        info!(
            voucher = %voucher.name,
            posted = report.posted().count(),
            skipped = report.skipped(),
            failed = report.failed().count(),
            "closing entries generated"
        );
        Ok(report)
    }

    /// Cancel a submitted voucher. Generated entries are not reversed.
    pub fn cancel(&self, voucher: &mut ClosingVoucher) -> Result<(), ClosingError> {
        voucher.ensure_cancellable()?;
        voucher.ignore_links = true;
        voucher.docstatus = DocStatus::Cancelled;
        info!(voucher = %voucher.name, "closing voucher cancelled");
        Ok(())
    }

    /// Delete a draft or cancelled voucher, removing every referencing entry
    /// that is not submitted. Submitted entries are left in place and listed in
    /// the report.
    pub fn delete(&self, voucher: &ClosingVoucher) -> Result<TeardownReport, ClosingError> {
        if voucher.docstatus.is_submitted() {
            return Err(DomainError::InvalidTransition {
                doctype: ClosingVoucher::DOCTYPE,
                action: "delete",
                status: voucher.docstatus,
            }
            .into());
        }

        let reference = voucher.reference();
        let parents: BTreeSet<DocName> = self
            .ledger
            .referencing(&reference)
            .map_err(|source| ClosingError::References {
                voucher: voucher.name.clone(),
                source,
            })?
            .into_iter()
            .collect();

        let mut report = TeardownReport::default();
        for name in parents {
            let teardown = |source| ClosingError::Teardown {
                entry: name.clone(),
                source,
            };
            let Some(entry) = self.ledger.get(&name).map_err(teardown)? else {
                continue;
            };

            if entry.docstatus.is_submitted() {
                report.retained.push(name);
                continue;
            }

            self.ledger.delete(&name, true).map_err(teardown)?;
            report.deleted.push(name);
        }

        if !report.retained.is_empty() {
            warn!(
                voucher = %voucher.name,
                retained = report.retained.len(),
                "submitted closing entries left in place"
            );
        }
        info!(voucher = %voucher.name, deleted = report.deleted.len(), "closing voucher deleted");
        Ok(report)
    }

    fn account_currencies(
        &self,
        voucher: &ClosingVoucher,
    ) -> Result<HashMap<AccountId, String>, ClosingError> {
        let mut names = voucher.account_names();
        names.push(voucher.closing_account.clone());
        let metas = self.ledger.accounts(&names)?;
        Ok(metas
            .into_iter()
            .map(|AccountMeta { name, account_currency, .. }| (name, account_currency))
            .collect())
    }

    fn prepare(
        &self,
        voucher: &ClosingVoucher,
        account: &AccountId,
        currencies: &HashMap<AccountId, String>,
    ) -> Result<(Decimal, Option<JournalEntry>), LookupError> {
        let currency = currencies
            .get(account)
            .ok_or_else(|| LookupError::UnknownAccount(account.clone()))?;
        let balance = self
            .ledger
            .balance_on(account, &voucher.company, voucher.posting_date)?;
        debug!(voucher = %voucher.name, account = %account, balance = %balance, "balance computed");
        let entry = closing_entry(voucher, account, currency, balance).map(|mut entry| {
            if let (Some(currency), Some(line)) =
                (currencies.get(&voucher.closing_account), entry.accounts.get_mut(1))
            {
                line.account_currency = currency.clone();
            }
            entry
        });
        Ok((balance, entry))
    }

    fn generate_propagating(
        &self,
        voucher: &ClosingVoucher,
        currencies: &HashMap<AccountId, String>,
        cancel: &CancelToken,
    ) -> Result<ClosingReport, ClosingError> {
        let mut report = ClosingReport {
            voucher: Some(voucher.name.clone()),
            outcomes: Vec::with_capacity(voucher.accounts_to_close.len()),
        };

        for row in &voucher.accounts_to_close {
            let (balance, entry) = self.prepare(voucher, &row.account, currencies)?;
            let status = match entry {
                None => OutcomeStatus::SkippedZeroBalance,
                Some(entry) => {
                    check_running(voucher, cancel, report.posted().count())?;
                    let name = self.ledger.submit(entry).map_err(|source| {
                        error!(voucher = %voucher.name, account = %row.account, error = %source, "closing entry failed");
                        ClosingError::Posting {
                            account: row.account.clone(),
                            source,
                        }
                    })?;
                    OutcomeStatus::Posted { entry: name }
                }
            };
            report.outcomes.push(AccountOutcome {
                account: row.account.clone(),
                balance: Some(balance),
                status,
            });
        }

        Ok(report)
    }

    fn generate_all_or_nothing(
        &self,
        voucher: &ClosingVoucher,
        currencies: &HashMap<AccountId, String>,
        cancel: &CancelToken,
    ) -> Result<ClosingReport, ClosingError> {
        let mut planned = Vec::with_capacity(voucher.accounts_to_close.len());
        for row in &voucher.accounts_to_close {
            let (balance, entry) = self.prepare(voucher, &row.account, currencies)?;
            if let Some(entry) = &entry {
                entry.validate().map_err(|e| ClosingError::Posting {
                    account: row.account.clone(),
                    source: e.into(),
                })?;
            }
            planned.push((row.account.clone(), balance, entry));
        }

        let mut posted: Vec<DocName> = Vec::new();
        let mut report = ClosingReport {
            voucher: Some(voucher.name.clone()),
            outcomes: Vec::with_capacity(planned.len()),
        };

        for (account, balance, entry) in planned {
            if let Err(e) = check_running(voucher, cancel, posted.len()) {
                self.roll_back(voucher, &posted);
                return Err(e);
            }
            let status = match entry {
                None => OutcomeStatus::SkippedZeroBalance,
                Some(entry) => match self.ledger.submit(entry) {
                    Ok(name) => {
                        posted.push(name.clone());
                        OutcomeStatus::Posted { entry: name }
                    }
                    Err(source) => {
                        error!(voucher = %voucher.name, account = %account, error = %source, "closing entry failed; rolling back");
                        self.roll_back(voucher, &posted);
                        return Err(ClosingError::Posting { account, source });
                    }
                },
            };
            report.outcomes.push(AccountOutcome {
                account,
                balance: Some(balance),
                status,
            });
        }

        Ok(report)
    }

    fn roll_back(&self, voucher: &ClosingVoucher, posted: &[DocName]) {
        for name in posted.iter().rev() {
            if let Err(e) = self.ledger.cancel(name) {
                error!(voucher = %voucher.name, entry = %name, error = %e, "failed to cancel closing entry during rollback");
            }
        }
    }

    fn generate_best_effort(
        &self,
        voucher: &ClosingVoucher,
        currencies: &HashMap<AccountId, String>,
        cancel: &CancelToken,
    ) -> Result<ClosingReport, ClosingError> {
        let mut report = ClosingReport {
            voucher: Some(voucher.name.clone()),
            outcomes: Vec::with_capacity(voucher.accounts_to_close.len()),
        };

        for row in &voucher.accounts_to_close {
            let account = row.account.clone();
            let (balance, entry) = match self.prepare(voucher, &account, currencies) {
                Ok(prepared) => prepared,
                Err(e) => {
                    warn!(voucher = %voucher.name, account = %account, error = %e, "balance lookup failed");
                    report.outcomes.push(AccountOutcome {
                        account,
                        balance: None,
                        status: OutcomeStatus::Failed { error: e.to_string() },
                    });
                    continue;
                }
            };

            let status = match entry {
                None => OutcomeStatus::SkippedZeroBalance,
                Some(entry) => {
                    check_running(voucher, cancel, report.posted().count())?;
                    match self.ledger.submit(entry) {
                        Ok(name) => OutcomeStatus::Posted { entry: name },
                        Err(e) => {
                            warn!(voucher = %voucher.name, account = %account, error = %e, "closing entry failed");
                            OutcomeStatus::Failed { error: e.to_string() }
                        }
                    }
                }
            };
            report.outcomes.push(AccountOutcome {
                account,
                balance: Some(balance),
                status,
            });
        }

        Ok(report)
    }
}

fn check_running(voucher: &ClosingVoucher, cancel: &CancelToken, posted: usize) -> Result<(), ClosingError> {
    if cancel.is_cancelled() {
        warn!(voucher = %voucher.name, posted, "closing entry generation cancelled");
        return Err(ClosingError::Cancelled {
            voucher: voucher.name.clone(),
            posted,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn voucher() -> ClosingVoucher {
        ClosingVoucher::new(
            "ACV-0001",
            "Libya Company",
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            "Suspense - LC",
            "LYD",
        )
        .with_remarks("year end")
    }

    #[test]
    fn debit_balance_is_credited_on_source() {
        let v = voucher();
        let entry = closing_entry(&v, &AccountId::new("Travel Advances - LC"), "LYD", dec!(1250.00)).unwrap();

        assert_eq!(entry.accounts.len(), 2);
        let (source, closing) = (&entry.accounts[0], &entry.accounts[1]);
        assert_eq!(source.account.as_str(), "Travel Advances - LC");
        assert_eq!(source.credit, dec!(1250.00));
        assert_eq!(source.credit_in_account_currency, dec!(1250.00));
        assert!(source.debit.is_zero());
        assert_eq!(closing.account.as_str(), "Suspense - LC");
        assert_eq!(closing.debit, dec!(1250.00));
        assert!(closing.credit.is_zero());
        assert_eq!(source.reference, Some(v.reference()));
        assert_eq!(closing.reference, Some(v.reference()));
        assert_eq!(entry.user_remark.as_deref(), Some("year end"));
        assert_eq!(entry.posting_date, v.posting_date);
    }

    #[test]
    fn credit_balance_is_debited_on_source() {
        let entry = closing_entry(&voucher(), &AccountId::new("Customer Deposits - LC"), "LYD", dec!(-80.5)).unwrap();
        assert_eq!(entry.accounts[0].debit, dec!(80.5));
        assert_eq!(entry.accounts[1].credit, dec!(80.5));
    }

    #[test]
    fn zero_balance_produces_no_entry() {
        assert!(closing_entry(&voucher(), &AccountId::new("Cash - LC"), "LYD", Decimal::ZERO).is_none());
    }

    proptest! {
        #[test]
        fn closing_entry_is_balanced(cents in prop::num::i64::ANY.prop_filter("non-zero", |c| *c != 0 && *c != i64::MIN)) {
            let balance = Decimal::new(cents, 2);
            let entry = closing_entry(&voucher(), &AccountId::new("Cash - LC"), "LYD", balance).unwrap();

            prop_assert_eq!(entry.validate(), Ok(()));
            prop_assert_eq!(entry.accounts[0].debit + entry.accounts[0].credit, balance.abs());
            prop_assert_eq!(entry.accounts[1].debit + entry.accounts[1].credit, balance.abs());
            // Closing moves the source account's balance to zero.
            prop_assert_eq!(balance + entry.accounts[0].signed_amount(), Decimal::ZERO);
        }

        #[test]
        fn opposite_balances_swap_sides(cents in 1i64..1_000_000_000i64) {
            let v = voucher();
            let account = AccountId::new("Cash - LC");
            let pos = closing_entry(&v, &account, "LYD", Decimal::new(cents, 2)).unwrap();
            let neg = closing_entry(&v, &account, "LYD", Decimal::new(-cents, 2)).unwrap();

            for (p, n) in pos.accounts.iter().zip(&neg.accounts) {
                prop_assert_eq!(p.account.clone(), n.account.clone());
                prop_assert_eq!(p.debit, n.credit);
                prop_assert_eq!(p.credit, n.debit);
            }
        }
    }
}
