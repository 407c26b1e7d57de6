use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pyrunner_core::{config::PyrunnerConfig, JobId};
use pyrunner_engine::{Dispatch, Executor};
use pyrunner_store::StoreRouter;
use tracing::{info, warn};

mod app;
mod http;

#[derive(Parser)]
#[command(name = "pyrunner")]
#[command(about = "Run versioned Python jobs in isolated runtimes", long_about = None)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("PYRUNNER_GIT_SHA"), ")"))]
struct Cli {
    /// Config file (defaults to $PYRUNNER_CONFIG, then ~/.pyrunner/pyrunner.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Execute one job in the foreground and print its run record
    Run {
        job_id: String,
        /// Input files passed to the script after the run id
        files: Vec<PathBuf>,
    },
    /// Show a job's most recent runs, newest first
    History {
        job_id: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// List registered jobs
    Jobs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pyrunner_gateway=info,pyrunner_engine=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > PYRUNNER_CONFIG env > ~/.pyrunner/pyrunner.toml
    let config_path = cli.config.or_else(|| std::env::var("PYRUNNER_CONFIG").ok());
    let config = PyrunnerConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        PyrunnerConfig::default()
    });

    ensure_parent_dir(&config.database.path);
    for path in config.database.aliases.values() {
        ensure_parent_dir(path);
    }
    let stores = StoreRouter::from_config(&config.database)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, stores).await,
        Command::Run { job_id, files } => run_once(config, stores, job_id.into(), files).await,
        Command::History { job_id, limit } => history(&stores, &job_id.into(), limit),
        Command::Jobs => list_jobs(&stores),
    }
}

async fn serve(config: PyrunnerConfig, stores: StoreRouter) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(config.execution, stores));
    let router = app::build_router(state);

    info!("pyrunner listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

async fn run_once(
    config: PyrunnerConfig,
    stores: StoreRouter,
    job_id: JobId,
    files: Vec<PathBuf>,
) -> anyhow::Result<()> {
    let executor = Executor::new(stores.clone(), config.execution);
    let dispatch = executor.execute_job(&job_id, files).await;
    println!("{}", serde_json::to_string_pretty(&dispatch)?);

    match dispatch {
        Dispatch::Ran {
            run_id: Some(run_id),
            ..
        } => {
            for store in stores.stores() {
                if let Some(run) = store.get_run(&run_id)? {
                    println!("{}", serde_json::to_string_pretty(&run)?);
                    break;
                }
            }
            Ok(())
        }
        Dispatch::Ran { .. } => Ok(()),
        other => anyhow::bail!("job {job_id} was not run: {other:?}"),
    }
}

fn history(stores: &StoreRouter, job_id: &JobId, limit: usize) -> anyhow::Result<()> {
    let job = stores
        .default_store()
        .get_job(job_id)?
        .ok_or_else(|| anyhow::anyhow!("job not found: {job_id}"))?;
    let runs = stores
        .for_alias(job.db_alias.as_deref())
        .list_runs(&job.id, limit)?;

    for run in runs {
        let finished = run
            .finished_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        let status = if run.success { "ok" } else { "FAILED" };
        let first_line = run.message.lines().next().unwrap_or_default();
        println!(
            "{}  {}  {:<6}  {}  {}",
            run.started_at.to_rfc3339(),
            finished,
            status,
            run.id,
            first_line
        );
    }
    Ok(())
}

fn list_jobs(stores: &StoreRouter) -> anyhow::Result<()> {
    for job in stores.default_store().list_jobs()? {
        let last_run = job
            .last_run
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{}  {:<24}  {:<8}  {:<8}  {}",
            job.id,
            job.name,
            if job.enabled { "enabled" } else { "disabled" },
            job.last_status.to_string(),
            last_run
        );
    }
    Ok(())
}

/// Create the parent directory of a database file if it doesn't exist.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), "could not create database directory: {e}");
            }
        }
    }
}
