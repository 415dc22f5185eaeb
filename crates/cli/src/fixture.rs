//! Closing a voucher described by a JSON fixture against an in-memory ledger.

use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use acctkit_accounting::{
    AccountMeta, ClosingConfig, ClosingVoucher, ClosingVoucherProcessor, Dispatch, InMemoryLedger,
    JobQueue, JournalEntry, register_closing_handler,
};
use acctkit_core::{AccountId, DocStatus};
use acctkit_jobs::{InMemoryJobStore, JobExecutor, JobStats, JobStatus, JobStore};

#[derive(Debug, Clone, Deserialize)]
pub struct OpeningBalance {
    pub account: AccountId,
    pub posting_date: NaiveDate,
    /// Positive for a debit balance.
    pub amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    pub accounts: Vec<AccountMeta>,
    #[serde(default)]
    pub opening_balances: Vec<OpeningBalance>,
    pub voucher: ClosingVoucher,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub voucher: ClosingVoucher,
    pub dispatch: Dispatch,
    /// Final state of the background job, when one was enqueued.
    pub job: Option<JobStatus>,
    pub jobs: JobStats,
    pub entries: Vec<JournalEntry>,
}

pub fn load(path: &str) -> anyhow::Result<Fixture> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read fixture {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse fixture {path}"))
}

/// Seed a ledger from the fixture, submit its voucher and drain the job queue.
pub fn run(fixture: Fixture, config: ClosingConfig) -> anyhow::Result<RunSummary> {
    let ledger = Arc::new(InMemoryLedger::new());
    for account in fixture.accounts {
        ledger.add_account(account)?;
    }
    for opening in &fixture.opening_balances {
        ledger
            .post_opening(&opening.account, opening.posting_date, opening.amount)
            .with_context(|| format!("failed to seed opening balance for {}", opening.account))?;
    }

    let jobs = InMemoryJobStore::arc();
    let queue = config.queue_name.clone();
    let processor = Arc::new(ClosingVoucherProcessor::new(
        ledger.clone(),
        JobQueue::new(jobs.clone()),
        config,
    ));

    let mut executor = JobExecutor::new(jobs.clone());
    register_closing_handler(&mut executor, processor.clone());

    let mut voucher = fixture.voucher;
    let dispatch = processor
        .submit(&mut voucher)
        .with_context(|| format!("failed to submit {}", voucher.name))?;

    let job = match &dispatch {
        Dispatch::Enqueued { job_id, .. } => {
            let executed = executor.run_pending(Some(&queue))?;
            info!(executed, "background jobs drained");
            jobs.get(*job_id)?.map(|job| job.status)
        }
        Dispatch::Completed { .. } => None,
    };

    Ok(RunSummary {
        jobs: jobs.stats()?,
        entries: ledger
            .entries()
            .into_iter()
            .filter(|e| e.docstatus == DocStatus::Submitted)
            .collect(),
        voucher,
        dispatch,
        job,
    })
}
