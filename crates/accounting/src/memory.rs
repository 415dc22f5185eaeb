//! In-memory ledger for tests/dev.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use acctkit_core::{AccountId, CompanyId, DocName, DocStatus, DomainError};

use crate::account::AccountMeta;
use crate::journal::{DocReference, JournalEntry};
use crate::ports::{AccountDirectory, BalanceSource, JournalBook, LookupError, PostingError};

/// One posted line, as it affects account balances.
#[derive(Debug, Clone)]
struct GlEntry {
    entry: Option<DocName>,
    account: AccountId,
    company: CompanyId,
    posting_date: NaiveDate,
    debit: Decimal,
    credit: Decimal,
    is_cancelled: bool,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<AccountId, AccountMeta>,
    entries: BTreeMap<DocName, JournalEntry>,
    gl: Vec<GlEntry>,
    next_entry: u64,
    locked_until: Option<NaiveDate>,
    frozen: HashSet<AccountId>,
}

impl LedgerState {
    /// Next `JV-NNNNN` not already taken by a caller-named entry.
    fn next_name(&mut self) -> DocName {
        loop {
            self.next_entry += 1;
            let name = DocName::new(format!("JV-{:05}", self.next_entry));
            if !self.entries.contains_key(&name) {
                return name;
            }
        }
    }

    fn check_postable(&self, entry: &JournalEntry) -> Result<(), PostingError> {
        entry.validate()?;

        if let Some(locked_until) = self.locked_until {
            if entry.posting_date <= locked_until {
                return Err(PostingError::PeriodClosed {
                    locked_until,
                    posting_date: entry.posting_date,
                });
            }
        }

        for line in &entry.accounts {
            match self.accounts.get(&line.account) {
                None => return Err(PostingError::NotPostable(line.account.clone())),
                Some(meta) if meta.is_group || meta.company != entry.company => {
                    return Err(PostingError::NotPostable(line.account.clone()));
                }
                Some(_) => {}
            }
            if self.frozen.contains(&line.account) {
                return Err(PostingError::AccountFrozen(line.account.clone()));
            }
        }

        Ok(())
    }
}

/// Chart of accounts, journal and general ledger held in memory.
///
/// Supports a period lock date and frozen accounts so posting failures can be
/// exercised.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, String> {
        self.state.read().map_err(|_| "ledger lock poisoned".to_string())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, String> {
        self.state.write().map_err(|_| "ledger lock poisoned".to_string())
    }

    pub fn add_account(&self, meta: AccountMeta) -> Result<(), LookupError> {
        let mut state = self.write().map_err(LookupError::Storage)?;
        state.accounts.insert(meta.name.clone(), meta);
        Ok(())
    }

    /// Record an opening balance (positive = debit) without a journal entry.
    pub fn post_opening(
        &self,
        account: &AccountId,
        date: NaiveDate,
        amount: Decimal,
    ) -> Result<(), LookupError> {
        let mut state = self.write().map_err(LookupError::Storage)?;
        let company = state
            .accounts
            .get(account)
            .map(|m| m.company.clone())
            .ok_or_else(|| LookupError::UnknownAccount(account.clone()))?;
        state.gl.push(GlEntry {
            entry: None,
            account: account.clone(),
            company,
            posting_date: date,
            debit: amount.max(Decimal::ZERO),
            credit: (-amount).max(Decimal::ZERO),
            is_cancelled: false,
        });
        Ok(())
    }

    /// Save an entry as draft. Returns the assigned name.
    pub fn insert_draft(&self, mut entry: JournalEntry) -> Result<DocName, PostingError> {
        let mut state = self.write().map_err(PostingError::Storage)?;
        let name = match entry.name.clone() {
            Some(name) => name,
            None => state.next_name(),
        };
        entry.name = Some(name.clone());
        entry.docstatus = DocStatus::Draft;
        state.entries.insert(name.clone(), entry);
        Ok(name)
    }

    /// Refuse postings dated on or before `date`.
    pub fn lock_period_until(&self, date: NaiveDate) -> Result<(), PostingError> {
        self.write().map_err(PostingError::Storage)?.locked_until = Some(date);
        Ok(())
    }

    pub fn freeze_account(&self, account: &AccountId) -> Result<(), PostingError> {
        self.write()
            .map_err(PostingError::Storage)?
            .frozen
            .insert(account.clone());
        Ok(())
    }

    /// All stored entries, by name.
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.read()
            .map(|s| s.entries.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count_by_status(&self, status: DocStatus) -> usize {
        self.read()
            .map(|s| s.entries.values().filter(|e| e.docstatus == status).count())
            .unwrap_or(0)
    }
}

impl AccountDirectory for InMemoryLedger {
    fn accounts(&self, names: &[AccountId]) -> Result<Vec<AccountMeta>, LookupError> {
        let state = self.read().map_err(LookupError::Storage)?;
        let wanted: HashSet<&AccountId> = names.iter().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|name| state.accounts.get(name).cloned())
            .collect())
    }
}

impl BalanceSource for InMemoryLedger {
    fn balance_on(
        &self,
        account: &AccountId,
        company: &CompanyId,
        date: NaiveDate,
    ) -> Result<Decimal, LookupError> {
        let state = self.read().map_err(LookupError::Storage)?;
        if !state.accounts.contains_key(account) {
            return Err(LookupError::UnknownAccount(account.clone()));
        }
        Ok(state
            .gl
            .iter()
            .filter(|g| {
                !g.is_cancelled
                    && &g.account == account
                    && &g.company == company
                    && g.posting_date <= date
            })
            .map(|g| g.debit - g.credit)
            .sum())
    }
}

impl JournalBook for InMemoryLedger {
    fn submit(&self, mut entry: JournalEntry) -> Result<DocName, PostingError> {
        let mut state = self.write().map_err(PostingError::Storage)?;
        state.check_postable(&entry)?;

        let name = match entry.name.clone() {
            Some(name) => {
                if let Some(existing) = state.entries.get(&name) {
                    if !existing.docstatus.is_draft() {
                        return Err(DomainError::InvalidTransition {
                            doctype: JournalEntry::DOCTYPE,
                            action: "submit",
                            status: existing.docstatus,
                        }
                        .into());
                    }
                }
                name
            }
            None => state.next_name(),
        };

        entry.name = Some(name.clone());
        entry.docstatus = DocStatus::Submitted;

        let lines: Vec<GlEntry> = entry
            .accounts
            .iter()
            .map(|line| GlEntry {
                entry: Some(name.clone()),
                account: line.account.clone(),
                company: entry.company.clone(),
                posting_date: entry.posting_date,
                debit: line.debit,
                credit: line.credit,
                is_cancelled: false,
            })
            .collect();
        state.gl.extend(lines);
        state.entries.insert(name.clone(), entry);
        Ok(name)
    }

    fn get(&self, name: &DocName) -> Result<Option<JournalEntry>, PostingError> {
        let state = self.read().map_err(PostingError::Storage)?;
        Ok(state.entries.get(name).cloned())
    }

    fn referencing(&self, reference: &DocReference) -> Result<Vec<DocName>, PostingError> {
        let state = self.read().map_err(PostingError::Storage)?;
        Ok(state
            .entries
            .iter()
            .flat_map(|(name, entry)| {
                entry
                    .accounts
                    .iter()
                    .filter(|l| l.reference.as_ref() == Some(reference))
                    .map(move |_| name.clone())
            })
            .collect())
    }

    fn cancel(&self, name: &DocName) -> Result<(), PostingError> {
        let mut state = self.write().map_err(PostingError::Storage)?;
        let entry = state
            .entries
            .get_mut(name)
            .ok_or_else(|| PostingError::NotFound(name.clone()))?;
        if !entry.docstatus.is_submitted() {
            return Err(DomainError::InvalidTransition {
                doctype: JournalEntry::DOCTYPE,
                action: "cancel",
                status: entry.docstatus,
            }
            .into());
        }
        entry.docstatus = DocStatus::Cancelled;

        for g in state.gl.iter_mut().filter(|g| g.entry.as_ref() == Some(name)) {
            g.is_cancelled = true;
        }
        Ok(())
    }

    fn delete(&self, name: &DocName, ignore_links: bool) -> Result<(), PostingError> {
        let mut state = self.write().map_err(PostingError::Storage)?;
        let entry = state
            .entries
            .get(name)
            .ok_or_else(|| PostingError::NotFound(name.clone()))?;
        if entry.docstatus.is_submitted() {
            return Err(DomainError::InvalidTransition {
                doctype: JournalEntry::DOCTYPE,
                action: "delete",
                status: entry.docstatus,
            }
            .into());
        }

        if !ignore_links {
            let link = DocReference::new(JournalEntry::DOCTYPE, name.clone());
            if let Some((other, _)) = state
                .entries
                .iter()
                .find(|(other, e)| *other != name && e.references(&link))
            {
                return Err(PostingError::Linked {
                    entry: name.clone(),
                    linked_from: other.clone(),
                });
            }
        }

        state.entries.remove(name);
        state.gl.retain(|g| g.entry.as_ref() != Some(name));
        Ok(())
    }
}
