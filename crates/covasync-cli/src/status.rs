//! Read-only views of run history, checkpoints and the event log, plus
//! checkpoint reset.

use covasync_sync::{CATALOG_JOB, IMAGES_JOB, PUBLISH_JOB};
use sqlx::PgPool;

const JOBS: &[&str] = &[CATALOG_JOB, IMAGES_JOB, PUBLISH_JOB];

pub(crate) async fn run_checkpoint_show(pool: &PgPool, job: Option<&str>) -> anyhow::Result<()> {
    let jobs: Vec<&str> = job.map_or_else(|| JOBS.to_vec(), |j| vec![j]);
    for job in jobs {
        let checkpoint = covasync_db::load_checkpoint(pool, job).await?;
        let processed = covasync_db::count_processed_keys(pool, job).await?;
        println!(
            "{job:<10} last sync {:<25} offset {:>6}  processed keys {processed}",
            checkpoint
                .last_sync_at
                .map_or_else(|| "never".to_string(), |t| t.to_rfc3339()),
            checkpoint.batch_offset,
        );
    }
    Ok(())
}

pub(crate) async fn run_checkpoint_reset(pool: &PgPool, job: &str) -> anyhow::Result<()> {
    if !JOBS.contains(&job) {
        anyhow::bail!("unknown job '{job}' (expected one of: {})", JOBS.join(", "));
    }
    covasync_db::reset_checkpoint(pool, job).await?;
    println!("reset checkpoint for {job}");
    Ok(())
}

pub(crate) async fn run_runs(pool: &PgPool, run_type: Option<&str>, limit: i64) -> anyhow::Result<()> {
    let runs = covasync_db::list_sync_runs(pool, run_type, limit.clamp(1, 500)).await?;
    if runs.is_empty() {
        println!("no sync runs recorded");
        return Ok(());
    }
    for run in runs {
        println!(
            "#{:<6} {:<10} {:<10} {:<10} {:<25} processed {:>6} failed {:>5}{}",
            run.id,
            run.run_type,
            run.trigger_source,
            run.status,
            run.started_at
                .map_or_else(|| "-".to_string(), |t| t.to_rfc3339()),
            run.records_processed,
            run.records_failed,
            run.error_message
                .map(|e| format!("  {e}"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

pub(crate) async fn run_events(pool: &PgPool, limit: i64) -> anyhow::Result<()> {
    let events = covasync_db::list_sync_events(pool, limit.clamp(1, 500)).await?;
    for event in events {
        println!(
            "{} [{:<5}] {} {}",
            event.created_at.to_rfc3339(),
            event.level,
            event.message,
            event.context
        );
    }
    Ok(())
}
