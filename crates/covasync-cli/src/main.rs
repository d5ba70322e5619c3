mod publish;
mod status;
mod sync;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "covasync")]
#[command(about = "Cova catalog sync command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sync catalog, prices and inventory from the upstream API
    Sync {
        /// Ignore the last-sync checkpoint and walk the whole catalog
        #[arg(long)]
        full: bool,
        /// Publish every stored product downstream after a successful sync
        #[arg(long)]
        publish: bool,
    },
    /// Sync only price rows
    Prices,
    /// Sync only inventory
    Inventory,
    /// Fetch and store a single product by upstream ID
    Product {
        /// Upstream product ID
        id: String,
    },
    /// Fetch the tax rates and tax pricing configuration
    Taxes,
    /// Publish stored products to the downstream catalog
    Publish {
        /// Only these product IDs (comma separated); all products when omitted
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,
        /// Downstream category ID applied to every published product
        #[arg(long)]
        category: Option<i64>,
        /// Delete every linked downstream record before publishing
        #[arg(long)]
        clear_first: bool,
    },
    /// Delete every linked downstream record
    ClearDownstream {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Replace missing or internal-ID SKUs on linked downstream records
    RepairSkus,
    /// Hand the next batch of product images to the asset collaborator
    Images {
        /// Restart the image job from the first product
        #[arg(long)]
        reset: bool,
    },
    /// Inspect or reset sync checkpoints
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },
    /// Show recent sync runs
    Runs {
        /// Only runs of this type (sync, prices, inventory, publish)
        #[arg(long = "type")]
        run_type: Option<String>,
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Show the newest entries of the sync event log
    Events {
        #[arg(long, default_value = "50")]
        limit: i64,
    },
    /// Database administration
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum CheckpointCommands {
    /// Show the checkpoint of every job, or of one job
    Show { job: Option<String> },
    /// Clear a job's checkpoint and processed keys
    Reset { job: String },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check the database connection
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("covasync: no command given (try --help)");
        return Ok(());
    };

    let config = covasync_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    tracing::debug!(?config, "loaded configuration");

    let pool_config = covasync_db::PoolConfig::from_app_config(&config);
    let pool = covasync_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Sync { full, publish } => sync::run_sync(&pool, &config, full, publish).await,
        Commands::Prices => sync::run_prices(&pool, &config).await,
        Commands::Inventory => sync::run_inventory(&pool, &config).await,
        Commands::Product { id } => sync::run_product(&pool, &config, &id).await,
        Commands::Taxes => sync::run_taxes(&config).await,
        Commands::Publish {
            ids,
            category,
            clear_first,
        } => publish::run_publish(&pool, &config, &ids, category, clear_first).await,
        Commands::ClearDownstream { yes } => {
            if !yes {
                anyhow::bail!("refusing to delete downstream records without --yes");
            }
            publish::run_clear(&pool, &config).await
        }
        Commands::RepairSkus => publish::run_repair_skus(&pool, &config).await,
        Commands::Images { reset } => publish::run_images(&pool, &config, reset).await,
        Commands::Checkpoint { command } => match command {
            CheckpointCommands::Show { job } => status::run_checkpoint_show(&pool, job.as_deref()).await,
            CheckpointCommands::Reset { job } => status::run_checkpoint_reset(&pool, &job).await,
        },
        Commands::Runs { run_type, limit } => {
            status::run_runs(&pool, run_type.as_deref(), limit).await
        }
        Commands::Events { limit } => status::run_events(&pool, limit).await,
        Commands::Db { command } => match command {
            DbCommands::Ping => {
                covasync_db::ping(&pool).await?;
                println!("database: ok");
                Ok(())
            }
            DbCommands::Migrate => {
                let applied = covasync_db::run_migrations(&pool).await?;
                println!("applied {applied} migration(s)");
                Ok(())
            }
        },
    }
}
