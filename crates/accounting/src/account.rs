use serde::{Deserialize, Serialize};

use acctkit_core::{AccountId, CompanyId};

/// Statement an account reports on (determines whether it carries a balance
/// across periods).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportType {
    /// Asset, liability or equity.
    #[serde(rename = "Balance Sheet")]
    BalanceSheet,
    /// Income or expense.
    #[serde(rename = "Profit and Loss")]
    ProfitAndLoss,
}

impl core::fmt::Display for ReportType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ReportType::BalanceSheet => f.write_str("Balance Sheet"),
            ReportType::ProfitAndLoss => f.write_str("Profit and Loss"),
        }
    }
}

/// Classification metadata for one ledger account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMeta {
    pub name: AccountId,
    pub company: CompanyId,
    pub report_type: ReportType,
    /// Roll-up account; cannot hold postings directly.
    #[serde(default)]
    pub is_group: bool,
    pub account_currency: String,
}

impl AccountMeta {
    /// Postable balance-sheet account.
    pub fn balance_sheet(
        name: impl Into<AccountId>,
        company: impl Into<CompanyId>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            company: company.into(),
            report_type: ReportType::BalanceSheet,
            is_group: false,
            account_currency: currency.into(),
        }
    }

    pub fn profit_and_loss(
        name: impl Into<AccountId>,
        company: impl Into<CompanyId>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            report_type: ReportType::ProfitAndLoss,
            ..Self::balance_sheet(name, company, currency)
        }
    }

    pub fn group(mut self) -> Self {
        self.is_group = true;
        self
    }
}
