use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use acctkit_core::{AccountId, CompanyId, DocName, DocStatus};

/// Back-reference from a journal line to the document that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocReference {
    pub reference_type: String,
    pub reference_name: DocName,
}

impl DocReference {
    pub fn new(reference_type: impl Into<String>, reference_name: DocName) -> Self {
        Self {
            reference_type: reference_type.into(),
            reference_name,
        }
    }
}

/// One line of a journal entry.
///
/// Exactly one of `debit`/`credit` is non-zero. The account-currency amounts
/// mirror the base amounts (single-currency postings).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryAccount {
    pub account: AccountId,
    pub debit: Decimal,
    pub debit_in_account_currency: Decimal,
    pub credit: Decimal,
    pub credit_in_account_currency: Decimal,
    pub account_currency: String,
    #[serde(default)]
    pub reference: Option<DocReference>,
}

impl JournalEntryAccount {
    pub fn debit(account: AccountId, amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            account,
            debit: amount,
            debit_in_account_currency: amount,
            credit: Decimal::ZERO,
            credit_in_account_currency: Decimal::ZERO,
            account_currency: currency.into(),
            reference: None,
        }
    }

    pub fn credit(account: AccountId, amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            account,
            debit: Decimal::ZERO,
            debit_in_account_currency: Decimal::ZERO,
            credit: amount,
            credit_in_account_currency: amount,
            account_currency: currency.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: DocReference) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Debit minus credit.
    pub fn signed_amount(&self) -> Decimal {
        self.debit - self.credit
    }
}

/// A balanced set of debit/credit lines, posted atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Assigned by the journal book on first save.
    #[serde(default)]
    pub name: Option<DocName>,
    pub company: CompanyId,
    pub posting_date: NaiveDate,
    #[serde(default)]
    pub user_remark: Option<String>,
    pub accounts: Vec<JournalEntryAccount>,
    #[serde(default)]
    pub docstatus: DocStatus,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JournalError {
    #[error("journal entry must have at least two lines")]
    TooFewLines,

    #[error("amounts cannot be negative (account {0})")]
    NegativeAmount(AccountId),

    #[error("line for account {0} must have either a debit or a credit")]
    EmptyLine(AccountId),

    #[error("line for account {0} cannot have both debit and credit")]
    DoubleSided(AccountId),

    #[error("total debit {debit} does not equal total credit {credit}")]
    Unbalanced { debit: Decimal, credit: Decimal },
}

impl JournalEntry {
    pub const DOCTYPE: &'static str = "Journal Entry";

    pub fn new(company: CompanyId, posting_date: NaiveDate) -> Self {
        Self {
            name: None,
            company,
            posting_date,
            user_remark: None,
            accounts: Vec::new(),
            docstatus: DocStatus::Draft,
        }
    }

    pub fn with_line(mut self, line: JournalEntryAccount) -> Self {
        self.accounts.push(line);
        self
    }

    pub fn with_remark(mut self, remark: Option<String>) -> Self {
        self.user_remark = remark;
        self
    }

    pub fn total_debit(&self) -> Decimal {
        self.accounts.iter().map(|l| l.debit).sum()
    }

    pub fn total_credit(&self) -> Decimal {
        self.accounts.iter().map(|l| l.credit).sum()
    }

    /// Whether any line points back at `reference`.
    pub fn references(&self, reference: &DocReference) -> bool {
        self.accounts
            .iter()
            .any(|l| l.reference.as_ref() == Some(reference))
    }

    /// Double-entry checks run before posting.
    pub fn validate(&self) -> Result<(), JournalError> {
        if self.accounts.len() < 2 {
            return Err(JournalError::TooFewLines);
        }

        for line in &self.accounts {
            if line.debit < Decimal::ZERO || line.credit < Decimal::ZERO {
                return Err(JournalError::NegativeAmount(line.account.clone()));
            }
            match (line.debit.is_zero(), line.credit.is_zero()) {
                (true, true) => return Err(JournalError::EmptyLine(line.account.clone())),
                (false, false) => return Err(JournalError::DoubleSided(line.account.clone())),
                _ => {}
            }
        }

        let debit = self.total_debit();
        let credit = self.total_credit();
        if debit != credit {
            return Err(JournalError::Unbalanced { debit, credit });
        }

        Ok(())
    }
}
