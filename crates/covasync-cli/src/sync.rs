//! Upstream sync command handlers.
//!
//! Record-level failures are logged by the engine and show up as counts in
//! the printed summary. A failed stage makes the command exit non-zero after
//! the summary is printed.

use covasync_core::AppConfig;
use covasync_sync::{
    OrchestratorSettings, PgStore, StageReport, SyncOptions, SyncOrchestrator, SyncReport,
    TriggerSource,
};
use covasync_upstream::UpstreamClient;
use sqlx::PgPool;

pub(crate) fn store(pool: &PgPool, config: &AppConfig) -> PgStore {
    PgStore::new(pool.clone(), config.event_log_retention)
}

fn upstream(config: &AppConfig) -> anyhow::Result<UpstreamClient> {
    UpstreamClient::from_settings(&config.upstream)
        .map_err(|e| anyhow::anyhow!("failed to build upstream client: {e}"))
}

/// Full or incremental sync, optionally followed by a publish of every
/// stored product.
pub(crate) async fn run_sync(
    pool: &PgPool,
    config: &AppConfig,
    force_full: bool,
    publish_after: bool,
) -> anyhow::Result<()> {
    let client = upstream(config)?;
    let store = store(pool, config);
    let orchestrator =
        SyncOrchestrator::new(&client, &store, OrchestratorSettings::from_app_config(config));

    let report = orchestrator
        .run(SyncOptions {
            force_full,
            trigger: TriggerSource::Cli,
        })
        .await?;
    print_report(&report);
    ensure_success(&report)?;

    if publish_after {
        crate::publish::run_publish(pool, config, &[], None, false).await?;
    }
    Ok(())
}

pub(crate) async fn run_prices(pool: &PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let client = upstream(config)?;
    let store = store(pool, config);
    let report = SyncOrchestrator::new(&client, &store, OrchestratorSettings::from_app_config(config))
        .run_prices(TriggerSource::Cli)
        .await?;
    print_report(&report);
    ensure_success(&report)
}

pub(crate) async fn run_inventory(pool: &PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let client = upstream(config)?;
    let store = store(pool, config);
    let report = SyncOrchestrator::new(&client, &store, OrchestratorSettings::from_app_config(config))
        .run_inventory(TriggerSource::Cli)
        .await?;
    print_report(&report);
    ensure_success(&report)
}

pub(crate) async fn run_product(
    pool: &PgPool,
    config: &AppConfig,
    product_id: &str,
) -> anyhow::Result<()> {
    let client = upstream(config)?;
    let store = store(pool, config);
    let orchestrator =
        SyncOrchestrator::new(&client, &store, OrchestratorSettings::from_app_config(config));

    match orchestrator.sync_product(product_id).await? {
        Some(done) => {
            println!(
                "{}: {:?} (sku: {}, stock: {}, prices +{}, inventory rows +{})",
                done.product.product_id,
                done.outcome,
                done.product.catalog_sku.as_deref().unwrap_or("none"),
                done.product.stock_quantity,
                done.prices.changed(),
                done.inventory.changed(),
            );
            Ok(())
        }
        None => anyhow::bail!("upstream has no product '{product_id}'"),
    }
}

/// Prints the upstream tax configuration. Nothing is stored.
pub(crate) async fn run_taxes(config: &AppConfig) -> anyhow::Result<()> {
    let client = upstream(config)?;
    let rates = client.fetch_tax_rates().await?;
    let pricing = client.fetch_tax_configuration().await?;
    println!("tax rates:\n{}", serde_json::to_string_pretty(&rates)?);
    println!("tax pricing configuration:\n{}", serde_json::to_string_pretty(&pricing)?);
    Ok(())
}

fn print_report(report: &SyncReport) {
    let mode = report
        .mode
        .map_or_else(String::new, |m| format!(" ({m:?})").to_lowercase());
    println!("run {}{mode}", report.run_id);
    for stage in &report.stages {
        print_stage(stage);
    }
    let counts = report.counts();
    println!(
        "processed {} record(s), {} skipped, in {}s",
        counts.processed,
        counts.failed,
        (report.finished_at - report.started_at).num_seconds()
    );
}

fn print_stage(stage: &StageReport) {
    let stats = &stage.stats;
    let status = stage
        .error
        .as_deref()
        .map_or_else(|| "ok".to_string(), |e| format!("FAILED: {e}"));
    println!(
        "  {:<10} inserted {:>5}  updated {:>5}  unchanged {:>5}  failed {:>4}  {status}",
        stage.stage.to_string(),
        stats.inserted,
        stats.updated,
        stats.unchanged,
        stats.failed,
    );
    if let Some(source) = &stage.source {
        println!("  {:<10} source: {source}", "");
    }
    if !stats.sku_fallbacks.is_empty() {
        println!(
            "  {:<10} {} product(s) without a merchant SKU",
            "",
            stats.sku_fallbacks.len()
        );
    }
}

fn ensure_success(report: &SyncReport) -> anyhow::Result<()> {
    if report.is_success() {
        Ok(())
    } else {
        anyhow::bail!("sync run {} finished with errors", report.run_id)
    }
}
