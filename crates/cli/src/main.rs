//! `piano-workflows` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`: start the API server and the delay scheduler.
//! - `scheduler`: run only the delay scheduler.
//! - `migrate`: run pending database migrations.
//! - `validate`: validate a workflow definition JSON file.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use actions::{AdapterRegistry, DryRunAdapter};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use engine::store::{PgDefinitionStore, PgExecutionStore};
use engine::{DelayScheduler, EngineConfig, ExecutionEngine, RawDefinition, SchedulerConfig, SystemClock, WorkflowDefinition};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "piano-workflows",
    about = "Workflow automation engine for piano-service businesses",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server with the delay scheduler alongside it.
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
        /// Serve the API only; run `scheduler` elsewhere.
        #[arg(long)]
        no_scheduler: bool,
        #[command(flatten)]
        db: DbArgs,
        #[command(flatten)]
        runtime: RuntimeArgs,
    },
    /// Run the delay scheduler on its own.
    Scheduler {
        #[command(flatten)]
        db: DbArgs,
        #[command(flatten)]
        runtime: RuntimeArgs,
    },
    /// Run pending database migrations.
    Migrate {
        #[command(flatten)]
        db: DbArgs,
    },
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
}

#[derive(Args)]
struct DbArgs {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,
}

#[derive(Args)]
struct RuntimeArgs {
    /// Seconds between polls for elapsed delays.
    #[arg(long, env = "SCHEDULER_POLL_SECS", default_value_t = 5)]
    poll_secs: u64,
    /// Executions resumed concurrently per scheduler.
    #[arg(long, env = "SCHEDULER_CONCURRENCY", default_value_t = 8)]
    concurrency: usize,
    /// Fail actions with no registered integration instead of logging
    /// them as dry runs.
    #[arg(long, env = "STRICT_ACTIONS")]
    strict_actions: bool,
    /// Upper bound on a single action call; 0 disables the limit.
    #[arg(long, env = "ACTION_TIMEOUT_SECS", default_value_t = 30)]
    action_timeout_secs: u64,
}

impl RuntimeArgs {
    fn engine_config(&self) -> EngineConfig {
        let timeout = (self.action_timeout_secs > 0).then(|| Duration::from_secs(self.action_timeout_secs));
        EngineConfig::default().with_action_timeout(timeout)
    }

    /// Concrete integrations register their handlers here.
    fn adapter(&self) -> AdapterRegistry {
        let registry = AdapterRegistry::new();
        if self.strict_actions {
            registry
        } else {
            registry.with_fallback(Arc::new(DryRunAdapter))
        }
    }

    fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::new()
            .with_poll_interval(Duration::from_secs(self.poll_secs.max(1)))
            .with_max_concurrency(self.concurrency)
    }
}

async fn connect(db: &DbArgs) -> anyhow::Result<db::DbPool> {
    db::pool::create_pool(&db.database_url, db.max_connections)
        .await
        .context("failed to connect to database")
}

fn build_engine(pool: db::DbPool, runtime: &RuntimeArgs) -> ExecutionEngine {
    ExecutionEngine::new(
        Arc::new(PgExecutionStore::new(pool.clone())),
        Arc::new(PgDefinitionStore::new(pool)),
        Arc::new(runtime.adapter()),
        Arc::new(SystemClock),
        runtime.engine_config(),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            bind,
            no_scheduler,
            db,
            runtime,
        } => {
            let engine = build_engine(connect(&db).await?, &runtime);
            let (shutdown_tx, shutdown_rx) = watch::channel(false);

            let scheduler = (!no_scheduler).then(|| {
                let scheduler = DelayScheduler::new(engine.clone(), runtime.scheduler_config());
                tokio::spawn(async move { scheduler.run(shutdown_rx).await })
            });

            info!(%bind, "starting API server");
            tokio::select! {
                served = api::serve(bind, api::AppState::new(engine)) => served.context("api server failed")?,
                _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
            }

            let _ = shutdown_tx.send(true);
            if let Some(handle) = scheduler {
                handle.await.context("scheduler task failed")?;
            }
        }
        Command::Scheduler { db, runtime } => {
            let engine = build_engine(connect(&db).await?, &runtime);
            let scheduler = DelayScheduler::new(engine, runtime.scheduler_config());
            let (shutdown_tx, shutdown_rx) = watch::channel(false);

            let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });
            tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
            handle.await.context("scheduler task failed")?;
        }
        Command::Migrate { db } => {
            let pool = connect(&db).await?;
            db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("migrations applied successfully");
        }
        Command::Validate { path } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read file {}", path.display()))?;
            let raw: RawDefinition = serde_json::from_str(&content).context("invalid JSON")?;

            match WorkflowDefinition::from_raw(raw) {
                Ok(definition) => {
                    println!(
                        "✅ Workflow '{}' is valid: {} nodes, {} edges, trigger '{}'.",
                        definition.name,
                        definition.nodes.len(),
                        definition.edges.len(),
                        definition.trigger_type
                    );
                }
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
