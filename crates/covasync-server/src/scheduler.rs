//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the
//! recurring incremental sync.

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use covasync_sync::TriggerSource;

use crate::runner::SyncRunner;

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    runner: SyncRunner,
    sync_cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_sync_job(&scheduler, runner, sync_cron).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the recurring incremental sync.
///
/// A tick that fires while another sync is still running (scheduled or
/// triggered through the API) is skipped, not queued.
async fn register_sync_job(
    scheduler: &JobScheduler,
    runner: SyncRunner,
    sync_cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(sync_cron, move |_uuid, _lock| {
        let runner = runner.clone();

        Box::pin(async move {
            let Some(handle) = runner.spawn_sync(false, TriggerSource::Scheduler) else {
                tracing::info!("scheduler: sync already in progress; skipping tick");
                return;
            };
            tracing::info!("scheduler: starting incremental sync");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "scheduler: sync task aborted");
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = sync_cron, "scheduler: registered sync job");
    Ok(())
}
