mod api;
mod middleware;
mod runner;
mod scheduler;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
    runner::SyncRunner,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(covasync_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = covasync_db::PoolConfig::from_app_config(&config);
    let pool = covasync_db::connect_pool(&config.database_url, pool_config).await?;
    covasync_db::run_migrations(&pool).await?;

    let runner = SyncRunner::new(pool.clone(), Arc::clone(&config))?;
    let mut scheduler = scheduler::build_scheduler(runner.clone(), &config.sync_cron).await?;

    let assets = covasync_sync::WebhookAssetSink::from_config(&config)?.map(Arc::new);
    let auth = AuthState::from_env(matches!(
        config.env,
        covasync_core::Environment::Development
    ))?;
    let state = AppState {
        pool,
        config: Arc::clone(&config),
        runner,
        assets,
        image_lock: Arc::new(Mutex::new(())),
    };
    let app = build_app(state, auth, default_rate_limit_state());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight runs are dropped with the runtime; committed pages and
    // checkpoints stay valid for the next run.
    scheduler.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
