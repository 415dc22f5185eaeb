use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use acctkit_core::{AccountId, CompanyId, DocName, DocStatus, Document, DomainError, DomainResult};

use crate::account::{AccountMeta, ReportType};
use crate::journal::DocReference;

/// One row of the accounts-to-close table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountToClose {
    pub account: AccountId,
}

/// Bulk account-closing voucher.
///
/// Moves the balance of every listed account into `closing_account` as of
/// `posting_date`, one journal entry per account with a non-zero balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingVoucher {
    pub name: DocName,
    pub company: CompanyId,
    pub posting_date: NaiveDate,
    pub closing_account: AccountId,
    pub closing_account_currency: String,
    pub accounts_to_close: Vec<AccountToClose>,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub docstatus: DocStatus,
    /// Set on cancel so link checks against this voucher are skipped.
    #[serde(default)]
    pub ignore_links: bool,
}

impl Document for ClosingVoucher {
    const DOCTYPE: &'static str = "Account Closing Voucher";

    fn name(&self) -> &DocName {
        &self.name
    }

    fn docstatus(&self) -> DocStatus {
        self.docstatus
    }
}

impl ClosingVoucher {
    pub fn new(
        name: impl Into<DocName>,
        company: impl Into<CompanyId>,
        posting_date: NaiveDate,
        closing_account: impl Into<AccountId>,
        closing_account_currency: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            company: company.into(),
            posting_date,
            closing_account: closing_account.into(),
            closing_account_currency: closing_account_currency.into(),
            accounts_to_close: Vec::new(),
            remarks: None,
            docstatus: DocStatus::Draft,
            ignore_links: false,
        }
    }

    pub fn with_account(mut self, account: impl Into<AccountId>) -> Self {
        self.accounts_to_close.push(AccountToClose {
            account: account.into(),
        });
        self
    }

    pub fn with_accounts<I, A>(mut self, accounts: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<AccountId>,
    {
        self.accounts_to_close
            .extend(accounts.into_iter().map(|a| AccountToClose { account: a.into() }));
        self
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    /// Account names in table order.
    pub fn account_names(&self) -> Vec<AccountId> {
        self.accounts_to_close.iter().map(|r| r.account.clone()).collect()
    }

    /// Back-reference stamped on every generated journal line.
    pub fn reference(&self) -> DocReference {
        DocReference::new(Self::DOCTYPE, self.name.clone())
    }

    /// Check the listed accounts against their metadata.
    ///
    /// Rows are checked in table order and the first violation is returned.
    pub fn check_accounts(&self, metas: &[AccountMeta]) -> DomainResult<()> {
        if self
            .accounts_to_close
            .iter()
            .any(|row| row.account == self.closing_account)
        {
            return Err(DomainError::validation(
                "Closing account cannot be in the list of accounts to close",
            ));
        }

        let by_name: HashMap<&AccountId, &AccountMeta> =
            metas.iter().map(|m| (&m.name, m)).collect();

        for row in &self.accounts_to_close {
            let Some(meta) = by_name.get(&row.account) else {
                return Err(DomainError::validation(format!(
                    "Account {} does not exist",
                    row.account
                )));
            };
            self.check_account(meta)?;
        }

        Ok(())
    }

    fn check_account(&self, account: &AccountMeta) -> DomainResult<()> {
        if account.report_type != ReportType::BalanceSheet {
            return Err(DomainError::validation(format!(
                "Account {} is not a balance sheet account",
                account.name
            )));
        }
        if account.is_group {
            return Err(DomainError::validation(format!(
                "Account {} is a group account",
                account.name
            )));
        }
        if account.account_currency != self.closing_account_currency {
            return Err(DomainError::validation(format!(
                "Account {} currency does not match closing account currency",
                account.name
            )));
        }
        Ok(())
    }
}
