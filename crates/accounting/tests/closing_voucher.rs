use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use acctkit_accounting::{
    AccountDirectory, AccountMeta, BalanceSource, ClosingConfig, ClosingError, ClosingVoucher,
    ClosingVoucherProcessor, Dispatch, DocReference, FailurePolicy, InMemoryLedger, JobQueue,
    JournalBook, JournalEntry, JournalEntryAccount, LookupError, OutcomeStatus, PostingError,
    register_closing_handler,
};
use acctkit_core::{AccountId, CompanyId, DocName, DocStatus, DomainError};
use acctkit_jobs::{InMemoryJobStore, JobExecutor, JobStatus, JobStore};

const COMPANY: &str = "Libya Company";

type Processor = ClosingVoucherProcessor<Arc<InMemoryLedger>, JobQueue<Arc<InMemoryJobStore>>>;

struct Harness {
    ledger: Arc<InMemoryLedger>,
    jobs: Arc<InMemoryJobStore>,
    processor: Arc<Processor>,
}

impl Harness {
    fn new(config: ClosingConfig) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger
            .add_account(AccountMeta::balance_sheet("Suspense - LC", COMPANY, "LYD"))
            .unwrap();
        let jobs = InMemoryJobStore::arc();
        let processor = Arc::new(ClosingVoucherProcessor::new(
            ledger.clone(),
            JobQueue::new(jobs.clone()),
            config,
        ));
        Self {
            ledger,
            jobs,
            processor,
        }
    }

    fn account(&self, name: &str, opening: Decimal) -> &Self {
        self.ledger
            .add_account(AccountMeta::balance_sheet(name, COMPANY, "LYD"))
            .unwrap();
        if !opening.is_zero() {
            self.ledger
                .post_opening(&AccountId::new(name), date(1), opening)
                .unwrap();
        }
        self
    }

    fn balance(&self, name: &str) -> Decimal {
        self.ledger
            .balance_on(&AccountId::new(name), &CompanyId::new(COMPANY), date(31))
            .unwrap()
    }

    fn run_background_jobs(&self) -> usize {
        let mut executor = JobExecutor::new(self.jobs.clone());
        register_closing_handler(&mut executor, self.processor.clone());
        executor.run_pending(Some("long")).unwrap()
    }
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
}

fn voucher() -> ClosingVoucher {
    ClosingVoucher::new("ACV-0001", COMPANY, date(31), "Suspense - LC", "LYD")
        .with_remarks("Close travel advances")
}

fn completed(dispatch: Dispatch) -> acctkit_accounting::ClosingReport {
    match dispatch {
        Dispatch::Completed { report } => report,
        other => panic!("expected inline processing, got {other:?}"),
    }
}

#[test]
fn travel_advances_close_into_suspense() {
    let h = Harness::new(ClosingConfig::default());
    h.account("Travel Advances - LC", dec!(1250.00));

    let mut v = voucher().with_account("Travel Advances - LC");
    let report = completed(h.processor.submit(&mut v).unwrap());

    assert_eq!(v.docstatus, DocStatus::Submitted);
    let names: Vec<_> = report.posted().cloned().collect();
    assert_eq!(names.len(), 1);

    let entry = h.ledger.get(&names[0]).unwrap().unwrap();
    assert_eq!(entry.docstatus, DocStatus::Submitted);
    assert_eq!(entry.user_remark.as_deref(), Some("Close travel advances"));
    assert_eq!(entry.accounts[0].account.as_str(), "Travel Advances - LC");
    assert_eq!(entry.accounts[0].credit, dec!(1250.00));
    assert_eq!(entry.accounts[1].account.as_str(), "Suspense - LC");
    assert_eq!(entry.accounts[1].debit, dec!(1250.00));
    assert!(entry.accounts.iter().all(|l| l.reference == Some(v.reference())));
    assert_eq!(entry.accounts[0].reference.as_ref().unwrap().reference_type, "Account Closing Voucher");

    assert_eq!(h.balance("Travel Advances - LC"), Decimal::ZERO);
    assert_eq!(h.balance("Suspense - LC"), dec!(1250.00));
    assert!(entry.accounts.iter().all(|l| l.account_currency == "LYD"));
}

#[test]
fn credit_balances_close_the_other_way() {
    let h = Harness::new(ClosingConfig::default());
    h.account("Customer Deposits - LC", dec!(-300));

    let mut v = voucher().with_account("Customer Deposits - LC");
    let report = completed(h.processor.submit(&mut v).unwrap());

    let name = report.posted().next().unwrap().clone();
    let entry = h.ledger.get(&name).unwrap().unwrap();
    assert_eq!(entry.accounts[0].debit, dec!(300));
    assert_eq!(entry.accounts[1].credit, dec!(300));
    assert_eq!(h.balance("Customer Deposits - LC"), Decimal::ZERO);
    assert_eq!(h.balance("Suspense - LC"), dec!(-300));
}

#[test]
fn zero_balance_accounts_are_skipped() {
    let h = Harness::new(ClosingConfig::default());
    h.account("Petty Cash - LC", Decimal::ZERO)
        .account("Staff Loans - LC", dec!(10));

    let mut v = voucher().with_accounts(["Petty Cash - LC", "Staff Loans - LC"]);
    let report = completed(h.processor.submit(&mut v).unwrap());

    assert_eq!(report.outcomes[0].status, OutcomeStatus::SkippedZeroBalance);
    assert!(matches!(report.outcomes[1].status, OutcomeStatus::Posted { .. }));
    assert_eq!(h.ledger.entries().len(), 1);
}

#[test]
fn closing_account_in_list_fails_without_writes() {
    let h = Harness::new(ClosingConfig::default());
    h.account("Travel Advances - LC", dec!(5));

    let mut v = voucher().with_accounts(["Travel Advances - LC", "Suspense - LC"]);
    let err = h.processor.submit(&mut v).unwrap_err();

    assert!(err.is_validation());
    assert_eq!(
        err.to_string(),
        "Closing account cannot be in the list of accounts to close"
    );
    assert_eq!(v.docstatus, DocStatus::Draft);
    assert!(h.ledger.entries().is_empty());
}

#[test]
fn validation_rejects_misclassified_accounts() {
    let h = Harness::new(ClosingConfig::default());
    h.ledger
        .add_account(AccountMeta::profit_and_loss("Travel Expense - LC", COMPANY, "LYD"))
        .unwrap();
    h.ledger
        .add_account(AccountMeta::balance_sheet("Current Assets - LC", COMPANY, "LYD").group())
        .unwrap();
    h.ledger
        .add_account(AccountMeta::balance_sheet("USD Cash - LC", COMPANY, "USD"))
        .unwrap();

    let cases = [
        ("Travel Expense - LC", "Account Travel Expense - LC is not a balance sheet account"),
        ("Current Assets - LC", "Account Current Assets - LC is a group account"),
        ("USD Cash - LC", "Account USD Cash - LC currency does not match closing account currency"),
    ];

    for (account, message) in cases {
        let v = voucher().with_account(account);
        let err = h.processor.validate(&v).unwrap_err();
        assert_eq!(err, ClosingError::Domain(DomainError::validation(message)));
    }
}

#[test]
fn valid_voucher_passes_validation() {
    let h = Harness::new(ClosingConfig::default());
    h.account("Travel Advances - LC", dec!(1))
        .account("Staff Loans - LC", dec!(2));

    let v = voucher().with_accounts(["Travel Advances - LC", "Staff Loans - LC"]);
    assert_eq!(h.processor.validate(&v), Ok(()));
}

fn voucher_with(h: &Harness, count: usize) -> ClosingVoucher {
    let names: Vec<String> = (1..=count).map(|i| format!("Advance {i:03} - LC")).collect();
    for name in &names {
        h.account(name, dec!(10));
    }
    voucher().with_accounts(names)
}

#[test]
fn forty_accounts_process_synchronously() {
    let h = Harness::new(ClosingConfig::default());
    let mut v = voucher_with(&h, 40);

    let report = completed(h.processor.submit(&mut v).unwrap());

    assert_eq!(report.posted().count(), 40);
    assert_eq!(h.jobs.stats().unwrap().queued, 0);
}

#[test]
fn forty_one_accounts_are_deferred() {
    let h = Harness::new(ClosingConfig::default());
    let mut v = voucher_with(&h, 41);

    let dispatch = h.processor.submit(&mut v).unwrap();

    let Dispatch::Enqueued { job_id, queue } = dispatch else {
        panic!("expected background dispatch");
    };
    assert_eq!(queue, "long");
    assert_eq!(v.docstatus, DocStatus::Submitted);
    assert!(h.ledger.entries().is_empty());

    let job = h.jobs.get(job_id).unwrap().unwrap();
    assert_eq!(job.timeout, std::time::Duration::from_secs(600));

    assert_eq!(h.run_background_jobs(), 1);
    assert_eq!(h.ledger.count_by_status(DocStatus::Submitted), 41);
    assert!(matches!(
        h.jobs.get(job_id).unwrap().unwrap().status,
        JobStatus::Completed
    ));
}

#[test]
fn threshold_is_configurable() {
    let h = Harness::new(ClosingConfig::default().with_sync_threshold(1));
    let mut v = voucher_with(&h, 2);

    assert!(matches!(
        h.processor.submit(&mut v).unwrap(),
        Dispatch::Enqueued { .. }
    ));
}

#[test]
fn background_failure_is_recorded_on_the_job() {
    let h = Harness::new(ClosingConfig::default().with_sync_threshold(1));
    let mut v = voucher_with(&h, 2);
    h.ledger.lock_period_until(date(31)).unwrap();

    h.processor.submit(&mut v).unwrap();
    h.run_background_jobs();

    let failures = h.jobs.failures(10).unwrap();
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        &failures[0].status,
        JobStatus::Failed { error } if error.contains("accounting period is closed")
    ));
}

#[test]
fn posting_failure_propagates_and_keeps_earlier_entries() {
    let h = Harness::new(ClosingConfig::default());
    h.account("A - LC", dec!(1))
        .account("B - LC", dec!(2))
        .account("C - LC", dec!(3));
    h.ledger.freeze_account(&AccountId::new("B - LC")).unwrap();

    let mut v = voucher().with_accounts(["A - LC", "B - LC", "C - LC"]);
    let err = h.processor.submit(&mut v).unwrap_err();

    assert_eq!(
        err,
        ClosingError::Posting {
            account: AccountId::new("B - LC"),
            source: PostingError::AccountFrozen(AccountId::new("B - LC")),
        }
    );
    assert_eq!(v.docstatus, DocStatus::Draft);
    // A was posted before the failure; C was never attempted.
    assert_eq!(h.ledger.count_by_status(DocStatus::Submitted), 1);
    assert_eq!(h.balance("A - LC"), Decimal::ZERO);
    assert_eq!(h.balance("C - LC"), dec!(3));
}

#[test]
fn all_or_nothing_cancels_posted_entries_on_failure() {
    let h = Harness::new(ClosingConfig::default().with_failure_policy(FailurePolicy::AllOrNothing));
    h.account("A - LC", dec!(1))
        .account("B - LC", dec!(2))
        .account("C - LC", dec!(3));
    h.ledger.freeze_account(&AccountId::new("C - LC")).unwrap();

    let mut v = voucher().with_accounts(["A - LC", "B - LC", "C - LC"]);
    assert!(matches!(
        h.processor.submit(&mut v),
        Err(ClosingError::Posting { .. })
    ));

    assert_eq!(h.ledger.count_by_status(DocStatus::Submitted), 0);
    assert_eq!(h.ledger.count_by_status(DocStatus::Cancelled), 2);
    assert_eq!(h.balance("A - LC"), dec!(1));
    assert_eq!(h.balance("B - LC"), dec!(2));
    assert_eq!(h.balance("Suspense - LC"), Decimal::ZERO);
}

#[test]
fn all_or_nothing_posts_everything_when_nothing_fails() {
    let h = Harness::new(ClosingConfig::default().with_failure_policy(FailurePolicy::AllOrNothing));
    h.account("A - LC", dec!(1)).account("B - LC", dec!(-2));

    let mut v = voucher().with_accounts(["A - LC", "B - LC"]);
    let report = completed(h.processor.submit(&mut v).unwrap());

    assert_eq!(report.posted().count(), 2);
    assert_eq!(h.balance("Suspense - LC"), dec!(-1));
}

#[test]
fn best_effort_reports_each_account() {
    let h = Harness::new(ClosingConfig::default().with_failure_policy(FailurePolicy::BestEffort));
    h.account("A - LC", dec!(1))
        .account("B - LC", dec!(2))
        .account("C - LC", Decimal::ZERO)
        .account("D - LC", dec!(4));
    h.ledger.freeze_account(&AccountId::new("B - LC")).unwrap();

    let mut v = voucher().with_accounts(["A - LC", "B - LC", "C - LC", "D - LC"]);
    let report = completed(h.processor.submit(&mut v).unwrap());

    assert_eq!(v.docstatus, DocStatus::Submitted);
    assert!(matches!(report.outcomes[0].status, OutcomeStatus::Posted { .. }));
    assert!(matches!(
        &report.outcomes[1].status,
        OutcomeStatus::Failed { error } if error == "account B - LC is frozen"
    ));
    assert_eq!(report.outcomes[2].status, OutcomeStatus::SkippedZeroBalance);
    assert!(matches!(report.outcomes[3].status, OutcomeStatus::Posted { .. }));
    assert!(!report.is_complete());
}

#[test]
fn delete_removes_drafts_and_keeps_submitted_entries() {
    let h = Harness::new(ClosingConfig::default());
    h.account("A - LC", dec!(5)).account("B - LC", dec!(6));

    let mut v = voucher().with_accounts(["A - LC", "B - LC"]);
    h.processor.submit(&mut v).unwrap();

    // A draft copy of a closing entry, e.g. an amended one never posted.
    let draft = JournalEntry::new(CompanyId::new(COMPANY), date(31))
        .with_line(JournalEntryAccount::debit(AccountId::new("A - LC"), dec!(1), "LYD").with_reference(v.reference()))
        .with_line(JournalEntryAccount::credit(AccountId::new("Suspense - LC"), dec!(1), "LYD").with_reference(v.reference()));
    let draft_name = h.ledger.insert_draft(draft).unwrap();

    // Submitted vouchers must be cancelled first.
    assert!(matches!(
        h.processor.delete(&v),
        Err(ClosingError::Domain(DomainError::InvalidTransition { .. }))
    ));

    h.processor.cancel(&mut v).unwrap();
    assert!(v.ignore_links);
    assert_eq!(v.docstatus, DocStatus::Cancelled);

    let report = h.processor.delete(&v).unwrap();

    assert_eq!(report.deleted, vec![draft_name.clone()]);
    assert_eq!(report.retained.len(), 2);
    assert!(h.ledger.get(&draft_name).unwrap().is_none());
    assert_eq!(h.ledger.count_by_status(DocStatus::Submitted), 2);
    assert_eq!(h.ledger.count_by_status(DocStatus::Draft), 0);
}

#[test]
fn delete_of_draft_voucher_without_entries_is_a_no_op() {
    let h = Harness::new(ClosingConfig::default());
    h.account("A - LC", dec!(5));

    let v = voucher().with_account("A - LC");
    let report = h.processor.delete(&v).unwrap();

    assert!(report.deleted.is_empty());
    assert!(report.retained.is_empty());
}

#[test]
fn voucher_is_submitted_only_once() {
    let h = Harness::new(ClosingConfig::default());
    h.account("A - LC", dec!(5));

    let mut v = voucher().with_account("A - LC");
    h.processor.submit(&mut v).unwrap();

    assert!(matches!(
        h.processor.submit(&mut v),
        Err(ClosingError::Domain(DomainError::InvalidTransition { .. }))
    ));
    assert_eq!(h.ledger.entries().len(), 1);
}

#[test]
fn draft_voucher_cannot_be_cancelled() {
    let h = Harness::new(ClosingConfig::default());
    let mut v = voucher();
    assert!(h.processor.cancel(&mut v).is_err());
}

/// Ledger whose balance lookups are slow and whose reference index can fail.
struct ScriptedLedger {
    inner: Arc<InMemoryLedger>,
    balance_delay: Duration,
    references_offline: bool,
}

impl AccountDirectory for ScriptedLedger {
    fn accounts(&self, names: &[AccountId]) -> Result<Vec<AccountMeta>, LookupError> {
        self.inner.accounts(names)
    }
}

impl BalanceSource for ScriptedLedger {
    fn balance_on(
        &self,
        account: &AccountId,
        company: &CompanyId,
        date: NaiveDate,
    ) -> Result<Decimal, LookupError> {
        thread::sleep(self.balance_delay);
        self.inner.balance_on(account, company, date)
    }
}

impl JournalBook for ScriptedLedger {
    fn submit(&self, entry: JournalEntry) -> Result<DocName, PostingError> {
        self.inner.submit(entry)
    }

    fn get(&self, name: &DocName) -> Result<Option<JournalEntry>, PostingError> {
        self.inner.get(name)
    }

    fn referencing(&self, reference: &DocReference) -> Result<Vec<DocName>, PostingError> {
        if self.references_offline {
            return Err(PostingError::Storage("reference index offline".into()));
        }
        self.inner.referencing(reference)
    }

    fn cancel(&self, name: &DocName) -> Result<(), PostingError> {
        self.inner.cancel(name)
    }

    fn delete(&self, name: &DocName, ignore_links: bool) -> Result<(), PostingError> {
        self.inner.delete(name, ignore_links)
    }
}

fn scripted(
    balance_delay: Duration,
    references_offline: bool,
    config: ClosingConfig,
) -> (
    Arc<InMemoryLedger>,
    Arc<InMemoryJobStore>,
    Arc<ClosingVoucherProcessor<Arc<ScriptedLedger>, JobQueue<Arc<InMemoryJobStore>>>>,
) {
    let inner = Arc::new(InMemoryLedger::new());
    for name in ["Suspense - LC", "A - LC", "B - LC", "C - LC"] {
        inner
            .add_account(AccountMeta::balance_sheet(name, COMPANY, "LYD"))
            .unwrap();
    }
    for name in ["A - LC", "B - LC", "C - LC"] {
        inner.post_opening(&AccountId::new(name), date(1), dec!(100)).unwrap();
    }
    let ledger = Arc::new(ScriptedLedger {
        inner: inner.clone(),
        balance_delay,
        references_offline,
    });
    let jobs = InMemoryJobStore::arc();
    let processor = Arc::new(ClosingVoucherProcessor::new(ledger, JobQueue::new(jobs.clone()), config));
    (inner, jobs, processor)
}

#[test]
fn timed_out_background_job_stops_posting() {
    let config = ClosingConfig::default()
        .with_sync_threshold(1)
        .with_queue("long", Duration::from_millis(20));
    let (ledger, jobs, processor) = scripted(Duration::from_millis(100), false, config);

    let mut v = voucher().with_accounts(["A - LC", "B - LC", "C - LC"]);
    let Dispatch::Enqueued { job_id, .. } = processor.submit(&mut v).unwrap() else {
        panic!("expected the voucher to be enqueued");
    };

    let mut executor = JobExecutor::new(jobs.clone());
    register_closing_handler(&mut executor, processor.clone());
    assert_eq!(executor.run_pending(Some("long")).unwrap(), 1);
    assert!(matches!(
        jobs.get(job_id).unwrap().unwrap().status,
        JobStatus::TimedOut { .. }
    ));

    // Long enough for the abandoned worker to finish every balance lookup.
    thread::sleep(Duration::from_millis(500));
    assert!(ledger.entries().is_empty());
    assert_eq!(
        ledger
            .balance_on(&AccountId::new("A - LC"), &CompanyId::new(COMPANY), date(31))
            .unwrap(),
        dec!(100)
    );
}

#[test]
fn cancelled_generation_reports_what_was_posted() {
    let (ledger, _, processor) = scripted(Duration::ZERO, false, ClosingConfig::default());
    let cancel = acctkit_jobs::CancelToken::new();
    cancel.cancel();

    let v = voucher().with_accounts(["A - LC", "B - LC"]);
    let err = processor.generate_entries_until(&v, &cancel).unwrap_err();

    assert_eq!(
        err,
        ClosingError::Cancelled {
            voucher: v.name.clone(),
            posted: 0
        }
    );
    assert!(ledger.entries().is_empty());
}

#[test]
fn failed_reference_lookup_names_the_voucher() {
    let (_, _, processor) = scripted(Duration::ZERO, true, ClosingConfig::default());
    let v = voucher().with_account("A - LC");

    let err = processor.delete(&v).unwrap_err();
    assert!(matches!(
        &err,
        ClosingError::References { voucher, .. } if voucher == &v.name
    ));
    assert!(err.to_string().starts_with("failed to find entries referencing ACV-0001"));
}
