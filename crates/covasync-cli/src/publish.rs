//! Downstream publishing and image hand-off command handlers.

use covasync_core::{load_category_map, AppConfig};
use covasync_sync::{
    BatchImageJob, DownstreamPublisher, PublishSummary, PublisherSettings, TriggerSource,
    WebhookAssetSink, WooCommerceClient,
};
use sqlx::PgPool;

use crate::sync::store;

pub(crate) async fn run_publish(
    pool: &PgPool,
    config: &AppConfig,
    ids: &[String],
    category: Option<i64>,
    clear_first: bool,
) -> anyhow::Result<()> {
    let store = store(pool, config);
    let downstream = WooCommerceClient::from_config(config)?;
    let assets = WebhookAssetSink::from_config(config)?;
    let categories = load_category_map(&config.publish.category_map_path)?;
    let publisher = DownstreamPublisher::new(
        &store,
        &downstream,
        &assets,
        &categories,
        PublisherSettings::from_app_config(config),
    );

    if clear_first {
        let cleared = publisher.clear_linked().await?;
        println!(
            "cleared {} downstream record(s) ({} already gone, {} error(s))",
            cleared.deleted, cleared.already_missing, cleared.errors
        );
    }

    let summary = if ids.is_empty() {
        publisher.publish_all(TriggerSource::Cli).await?
    } else {
        publisher
            .publish_selected(ids, category, TriggerSource::Cli)
            .await?
    };
    print_summary(&summary);

    if summary.errors > 0 && summary.synced() == 0 {
        anyhow::bail!("every product failed to publish");
    }
    Ok(())
}

pub(crate) async fn run_clear(pool: &PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let store = store(pool, config);
    let downstream = WooCommerceClient::from_config(config)?;
    let categories = load_category_map(&config.publish.category_map_path)?;
    let no_assets: Option<WebhookAssetSink> = None;
    let publisher = DownstreamPublisher::new(
        &store,
        &downstream,
        &no_assets,
        &categories,
        PublisherSettings::from_app_config(config),
    );

    let summary = publisher.clear_linked().await?;
    println!(
        "deleted {} downstream record(s); {} were already gone; {} error(s)",
        summary.deleted, summary.already_missing, summary.errors
    );
    Ok(())
}

pub(crate) async fn run_repair_skus(pool: &PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let store = store(pool, config);
    let downstream = WooCommerceClient::from_config(config)?;
    let categories = load_category_map(&config.publish.category_map_path)?;
    let no_assets: Option<WebhookAssetSink> = None;
    let publisher = DownstreamPublisher::new(
        &store,
        &downstream,
        &no_assets,
        &categories,
        PublisherSettings::from_app_config(config),
    );

    let stats = publisher.repair_skus().await?;
    println!(
        "checked {} linked record(s): {} updated ({} numeric), {} already ok, {} without upstream SKU, {} error(s)",
        stats.total,
        stats.updated,
        stats.numeric_skus_fixed,
        stats.already_ok,
        stats.missing_upstream_data,
        stats.errors
    );
    Ok(())
}

pub(crate) async fn run_images(pool: &PgPool, config: &AppConfig, reset: bool) -> anyhow::Result<()> {
    let store = store(pool, config);
    let Some(sink) = WebhookAssetSink::from_config(config)? else {
        anyhow::bail!("COVASYNC_ASSET_WEBHOOK_URL is not set");
    };
    let job = BatchImageJob::new(&store, &sink, config.image_batch_size);

    if reset {
        job.reset().await?;
        println!("image job reset");
        return Ok(());
    }

    let progress = job.run_batch().await?;
    println!(
        "images: {} submitted, {} already done, {} failed; {}% of {} products{}",
        progress.submitted,
        progress.skipped,
        progress.failed,
        progress.progress,
        progress.total,
        if progress.complete { " (complete)" } else { "" }
    );
    Ok(())
}

fn print_summary(summary: &PublishSummary) {
    println!(
        "published {} product(s): {} created, {} updated, {} skipped, {} error(s)",
        summary.total, summary.created, summary.updated, summary.skipped, summary.errors
    );
    if summary.unmapped_categories > 0 {
        println!(
            "{} product(s) had no category mapping",
            summary.unmapped_categories
        );
    }
}
