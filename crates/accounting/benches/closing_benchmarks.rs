use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use acctkit_accounting::{
    AccountMeta, ClosingConfig, ClosingVoucher, ClosingVoucherProcessor, FailurePolicy,
    InMemoryLedger, JobQueue, closing_entry,
};
use acctkit_core::AccountId;
use acctkit_jobs::InMemoryJobStore;

const COMPANY: &str = "Bench Co";

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
}

/// Ledger with `count` balance sheet accounts, every one carrying a balance.
fn seeded(count: usize) -> (Arc<InMemoryLedger>, ClosingVoucher) {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger
        .add_account(AccountMeta::balance_sheet("Suspense - BC", COMPANY, "USD"))
        .unwrap();

    let mut voucher = ClosingVoucher::new("ACV-BENCH", COMPANY, date(31), "Suspense - BC", "USD");
    for i in 0..count {
        let name = format!("Advance {i:05} - BC");
        ledger
            .add_account(AccountMeta::balance_sheet(name.as_str(), COMPANY, "USD"))
            .unwrap();
        let amount = Decimal::new((i as i64 % 17 + 1) * if i % 2 == 0 { 100 } else { -100 }, 2);
        ledger
            .post_opening(&AccountId::new(name.as_str()), date(1), amount)
            .unwrap();
        voucher = voucher.with_account(name);
    }
    (ledger, voucher)
}

fn bench_closing_entry(c: &mut Criterion) {
    let voucher = ClosingVoucher::new("ACV-BENCH", COMPANY, date(31), "Suspense - BC", "USD");
    let account = AccountId::new("Travel Advances - BC");

    c.bench_function("closing_entry", |b| {
        b.iter(|| {
            black_box(closing_entry(
                &voucher,
                black_box(&account),
                "USD",
                black_box(Decimal::new(125000, 2)),
            ))
        })
    });
}

fn bench_generate_entries(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_entries");
    group.sample_size(20);

    for policy in [FailurePolicy::Propagate, FailurePolicy::AllOrNothing, FailurePolicy::BestEffort] {
        for size in [40usize, 1000] {
            group.throughput(Throughput::Elements(size as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("{policy:?}"), size),
                &size,
                |b, &size| {
                    b.iter_batched(
                        || {
                            let (ledger, voucher) = seeded(size);
                            let processor = ClosingVoucherProcessor::new(
                                ledger,
                                JobQueue::new(InMemoryJobStore::new()),
                                ClosingConfig::default().with_failure_policy(policy),
                            );
                            (processor, voucher)
                        },
                        |(processor, voucher)| black_box(processor.generate_entries(&voucher).unwrap()),
                        BatchSize::LargeInput,
                    );
                },
            );
        }
    }

    group.finish();
}

fn bench_validate(c: &mut Criterion) {
    let (ledger, voucher) = seeded(1000);
    let processor = ClosingVoucherProcessor::new(
        ledger,
        JobQueue::new(InMemoryJobStore::new()),
        ClosingConfig::default(),
    );

    c.bench_function("validate_1000_accounts", |b| {
        b.iter(|| processor.validate(black_box(&voucher)).unwrap())
    });
}

criterion_group!(benches, bench_closing_entry, bench_generate_entries, bench_validate);
criterion_main!(benches);
