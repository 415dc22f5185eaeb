use anyhow::Context;

use acctkit_accounting::ClosingConfig;

mod fixture;

fn main() -> anyhow::Result<()> {
    acctkit_observability::init();

    let path = std::env::args()
        .nth(1)
        .context("usage: acctkit <fixture.json>")?;

    let config = ClosingConfig::from_env();
    tracing::info!(
        fixture = %path,
        sync_threshold = config.sync_threshold,
        queue = %config.queue_name,
        policy = ?config.failure_policy,
        "closing voucher from fixture"
    );

    let summary = fixture::run(fixture::load(&path)?, config)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
