//! Shared handle for starting sync runs from the scheduler and the API.
//!
//! Only one orchestrated sync runs at a time per process. The lock is held
//! by the spawned task and released when the run finishes or is dropped on
//! shutdown. A successful run is followed by a downstream publish when
//! publishing is enabled and the downstream credentials are set.

use std::sync::Arc;

use covasync_core::{load_category_map, AppConfig};
use covasync_sync::{
    DownstreamPublisher, OrchestratorSettings, PgStore, PublishSummary, PublisherSettings,
    SyncOptions, SyncOrchestrator, TriggerSource, WebhookAssetSink, WooCommerceClient,
};
use covasync_upstream::UpstreamClient;
use sqlx::PgPool;
use tokio::{sync::Mutex, task::JoinHandle};

/// Whether a finished sync should be propagated downstream.
pub(crate) fn publishes_after_sync(config: &AppConfig) -> bool {
    let publish = &config.publish;
    publish.enabled
        && publish.woo_base_url.is_some()
        && publish.woo_consumer_key.is_some()
        && publish.woo_consumer_secret.is_some()
}

#[derive(Clone)]
pub struct SyncRunner {
    pool: PgPool,
    config: Arc<AppConfig>,
    upstream: Arc<UpstreamClient>,
    sync_lock: Arc<Mutex<()>>,
}

impl SyncRunner {
    /// # Errors
    ///
    /// Returns an error if the upstream HTTP client cannot be built from the
    /// configured settings.
    pub fn new(pool: PgPool, config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let upstream = UpstreamClient::from_settings(&config.upstream)
            .map_err(|e| anyhow::anyhow!("failed to build upstream client: {e}"))?;
        Ok(Self {
            pool,
            config,
            upstream: Arc::new(upstream),
            sync_lock: Arc::new(Mutex::new(())),
        })
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sync_lock.try_lock().is_err()
    }

    pub fn store(&self) -> PgStore {
        PgStore::new(self.pool.clone(), self.config.event_log_retention)
    }

    /// Starts a sync in the background.
    ///
    /// Returns `None` without starting anything when another sync is still
    /// in progress.
    pub fn spawn_sync(&self, force_full: bool, trigger: TriggerSource) -> Option<JoinHandle<()>> {
        let guard = Arc::clone(&self.sync_lock).try_lock_owned().ok()?;
        let runner = self.clone();
        Some(tokio::spawn(async move {
            runner.run_sync(force_full, trigger).await;
            drop(guard);
        }))
    }

    #[cfg(test)]
    pub(crate) fn hold_lock(&self) -> Option<tokio::sync::OwnedMutexGuard<()>> {
        Arc::clone(&self.sync_lock).try_lock_owned().ok()
    }

    async fn run_sync(&self, force_full: bool, trigger: TriggerSource) {
        let store = self.store();
        let orchestrator = SyncOrchestrator::new(
            &self.upstream,
            &store,
            OrchestratorSettings::from_app_config(&self.config),
        );

        match orchestrator
            .run(SyncOptions {
                force_full,
                trigger,
            })
            .await
        {
            Ok(report) if report.is_success() => {
                let counts = report.counts();
                tracing::info!(
                    run_id = report.run_id,
                    trigger = trigger.as_str(),
                    processed = counts.processed,
                    failed = counts.failed,
                    "sync run succeeded"
                );
                if publishes_after_sync(&self.config) {
                    if let Err(e) = self.publish_stored(trigger).await {
                        tracing::error!(
                            error = %e,
                            trigger = trigger.as_str(),
                            "downstream publish after sync failed"
                        );
                    }
                }
            }
            Ok(report) => {
                tracing::warn!(
                    run_id = report.run_id,
                    trigger = trigger.as_str(),
                    "sync run finished with stage errors"
                );
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    trigger = trigger.as_str(),
                    "sync run could not be recorded"
                );
            }
        }
    }

    async fn publish_stored(&self, trigger: TriggerSource) -> anyhow::Result<PublishSummary> {
        let store = self.store();
        let downstream = WooCommerceClient::from_config(&self.config)?;
        let assets = WebhookAssetSink::from_config(&self.config)?;
        let categories = load_category_map(&self.config.publish.category_map_path)?;
        let publisher = DownstreamPublisher::new(
            &store,
            &downstream,
            &assets,
            &categories,
            PublisherSettings::from_app_config(&self.config),
        );

        let summary = publisher.publish_all(trigger).await?;
        tracing::info!(
            trigger = trigger.as_str(),
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            errors = summary.errors,
            "downstream publish finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
