//! `metasync` command-line entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use metasync_core::SyncError;
use metasync_domain::{Config, PricingEntry, PricingModel, Provider, SyncStats};
use metasync_infra::config;
use metasync_infra::database::{DbManager, SqliteEventLog, SqlitePricingCatalog};
use metasync_infra::observability::metrics::CycleMetrics;
use metasync_infra::scheduling::{SyncScheduler, SyncSchedulerConfig};
use metasync_infra::sync::CycleRunner;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Fold execution logs into type, implementation and deployment aggregates.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON and reports as JSON documents
    #[arg(long, global = true)]
    json: bool,

    /// Explicit config file (.json or .toml)
    #[arg(long, global = true, env = "METASYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the periodic sync trigger until Ctrl-C
    Serve,
    /// Run one sync cycle now
    Sync,
    /// Apply the schema to both databases
    Migrate,
    /// Print execution log counts by status
    Status,
    /// Manage provider pricing
    Pricing {
        #[command(subcommand)]
        action: PricingAction,
    },
}

#[derive(Subcommand)]
enum PricingAction {
    /// Insert or replace the pricing of a provider
    Set {
        provider: Provider,
        /// Fee per invocation
        #[arg(long)]
        invocation_cost: f64,
        /// Cost per GB-second of memory
        #[arg(long)]
        gb_second: f64,
        /// Cost per GHz-second of allocated CPU
        #[arg(long)]
        ghz_second: Option<f64>,
        /// Runtime is rounded up to a multiple of this before billing
        #[arg(long, default_value_t = 100)]
        billing_unit_ms: i64,
        #[arg(long, default_value_t = PricingModel::Linear)]
        model: PricingModel,
    },
    /// List every pricing entry
    List,
}

/// Both databases, opened from the loaded config.
struct Stores {
    config: Config,
    event_db: Arc<DbManager>,
    metadata_db: Arc<DbManager>,
}

impl Stores {
    fn open(config: Config) -> Result<Self> {
        let event_db = DbManager::from_config(&config.event_log)
            .with_context(|| format!("opening event log {}", config.event_log.path))?;
        let metadata_db = DbManager::from_config(&config.metadata)
            .with_context(|| format!("opening metadata store {}", config.metadata.path))?;
        Ok(Self { config, event_db: Arc::new(event_db), metadata_db: Arc::new(metadata_db) })
    }

    fn migrate(&self) -> Result<()> {
        self.event_db.run_migrations().context("migrating event log")?;
        self.metadata_db.run_migrations().context("migrating metadata store")?;
        Ok(())
    }

    async fn runner(&self) -> Result<CycleRunner> {
        CycleRunner::from_managers(
            Arc::clone(&self.event_db),
            Arc::clone(&self.metadata_db),
            &self.config.sync,
            Arc::new(CycleMetrics::new()),
        )
        .await
        .context("opening sync runner")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Loaded before parsing so .env can supply METASYNC_CONFIG.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);
    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded .env"),
        Err(err) if err.not_found() => debug!("No .env file found"),
        Err(err) => warn!(error = %err, "Could not load .env file"),
    }

    let config = match &cli.config {
        Some(path) => config::load_from_file(Some(path.clone())),
        None => config::load(),
    }
    .context("loading configuration")?;
    let stores = Stores::open(config)?;

    match cli.command {
        Commands::Serve => serve(&stores).await,
        Commands::Sync => sync_once(&stores).await,
        Commands::Migrate => {
            stores.migrate()?;
            println!("Schema applied to both databases");
            Ok(())
        }
        Commands::Status => status(&stores, cli.json).await,
        Commands::Pricing { action } => pricing(&stores, action, cli.json).await,
    }
}

/// Logs go to stderr so reports on stdout stay clean for piping. `RUST_LOG`
/// overrides the level chosen by `-v`.
fn init_tracing(verbose: u8, json: bool) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,metasync={level}")));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn serve(stores: &Stores) -> Result<()> {
    stores.migrate()?;
    if !stores.config.sync.enabled {
        warn!("Sync trigger disabled in configuration; nothing to serve");
        return Ok(());
    }

    let runner = Arc::new(stores.runner().await?);
    startup_cycle(&runner).await;
    let mut scheduler = SyncScheduler::with_config(
        SyncSchedulerConfig::from(&stores.config.sync),
        runner.clone(),
    )
    .await?;
    scheduler.start().await?;

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("Shutdown requested");
    scheduler.stop().await?;

    let metrics = runner.metrics().snapshot();
    info!(
        completed = metrics.completed,
        failed = metrics.failed,
        timeouts = metrics.timeouts,
        updated = metrics.entries_updated,
        skipped = metrics.entries_skipped,
        "Sync scheduler finished"
    );
    Ok(())
}

/// Run one cycle right away so `serve` does not wait for the first cron
/// tick. Failures are logged; the scheduler retries on its next run.
async fn startup_cycle(runner: &CycleRunner) -> Option<SyncStats> {
    match runner.run_once().await {
        Ok(stats) => {
            info!(updated = stats.updated, skipped = stats.skipped, "Startup sync cycle finished");
            Some(stats)
        }
        Err(SyncError::CycleInProgress) => {
            info!("Startup sync cycle skipped; another cycle is running");
            None
        }
        Err(err) => {
            warn!(error = %err, "Startup sync cycle failed");
            None
        }
    }
}

async fn sync_once(stores: &Stores) -> Result<()> {
    stores.migrate()?;
    match stores.runner().await?.run_once().await {
        Ok(stats) => {
            println!("{stats}");
            Ok(())
        }
        Err(SyncError::CycleInProgress) => bail!("another sync cycle is running"),
        Err(err) => Err(err).context("sync cycle failed"),
    }
}

async fn status(stores: &Stores, json: bool) -> Result<()> {
    stores.migrate()?;
    let counts = SqliteEventLog::new(Arc::clone(&stores.event_db)).counts().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
    } else {
        println!("Pending: {}, Done: {}, Skipped: {}", counts.pending, counts.done, counts.skipped);
    }
    Ok(())
}

async fn pricing(stores: &Stores, action: PricingAction, json: bool) -> Result<()> {
    stores.migrate()?;
    let catalog = SqlitePricingCatalog::new(Arc::clone(&stores.metadata_db));
    match action {
        PricingAction::Set {
            provider,
            invocation_cost,
            gb_second,
            ghz_second,
            billing_unit_ms,
            model,
        } => {
            if model == PricingModel::LinearWithFrequencyTier && ghz_second.is_none() {
                bail!("--ghz-second is required for the {model} model");
            }
            let entry = PricingEntry {
                provider,
                invocation_cost,
                duration_cost_per_gb_second: gb_second,
                duration_cost_per_ghz_second: ghz_second,
                billing_unit_ms,
                model,
            };
            catalog.upsert(&entry).await?;
            println!("Pricing for {provider} saved");
        }
        PricingAction::List => {
            let entries = catalog.list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in entries {
                    println!(
                        "{}\t{}\tinvocation={}\tgb_s={}\tghz_s={}\tunit_ms={}",
                        entry.provider,
                        entry.model,
                        entry.invocation_cost,
                        entry.duration_cost_per_gb_second,
                        entry
                            .duration_cost_per_ghz_second
                            .map_or_else(|| "-".to_string(), |rate| rate.to_string()),
                        entry.billing_unit_ms,
                    );
                }
            }
        }
    }
    Ok(())
}
