//! rigd — the testrig daemon.
//!
//! Single binary that assembles the scheduler subsystems:
//! - Run store (redb): run records + durable pending queue
//! - Reservation ledger with configured pool capacities
//! - Component registry (built-ins; real deployments register more)
//! - Admission queue + scheduler driver
//!
//! # Usage
//!
//! ```text
//! rigd submit --data-dir /var/lib/testrig tests/cluster-smoke.toml
//! rigd standalone --data-dir /var/lib/testrig --pool openstack/perf=4
//! rigd status --data-dir /var/lib/testrig
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

use rig_core::{TestDefinition, TestRun};
use rig_queue::{QueueConfig, RunQueue};
use rig_registry::ComponentRegistry;
use rig_reserve::ReservationLedger;
use rig_runner::{RunUpdater, Scheduler, SchedulerConfig};
use rig_state::RunStore;

#[derive(Parser)]
#[command(name = "rigd", about = "testrig daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until interrupted, draining the pending queue.
    Standalone {
        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/testrig")]
        data_dir: PathBuf,

        /// Cooldown in seconds before a deferred run retries admission.
        #[arg(long, default_value = "60")]
        cooldown: u64,

        /// Admission retries granted after executor-creation faults.
        #[arg(long, default_value = "3")]
        max_requeues: u32,

        /// Shared pool capacity, e.g. `--pool openstack/perf=4`.
        /// Pools without a declared capacity are exclusive.
        #[arg(long = "pool")]
        pools: Vec<String>,
    },

    /// Submit a definition file (or every .toml in a directory).
    Submit {
        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/testrig")]
        data_dir: PathBuf,

        /// Owner recorded on the submitted runs.
        #[arg(long, default_value = "anonymous@localhost")]
        owner: String,

        /// Definition file (TOML) or a directory to scan.
        path: PathBuf,
    },

    /// List run records.
    Status {
        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/testrig")]
        data_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rigd=debug,rig=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Standalone {
            data_dir,
            cooldown,
            max_requeues,
            pools,
        } => run_standalone(data_dir, cooldown, max_requeues, pools).await,
        Command::Submit {
            data_dir,
            owner,
            path,
        } => submit(&data_dir, &owner, &path),
        Command::Status { data_dir } => status(&data_dir),
    }
}

async fn run_standalone(
    data_dir: PathBuf,
    cooldown: u64,
    max_requeues: u32,
    pools: Vec<String>,
) -> anyhow::Result<()> {
    info!("testrig daemon starting in standalone mode");

    let store = open_store(&data_dir)?;
    info!(pending = store.pending_len()?, "run store opened");

    // Reservation ledger with declared shared-pool capacities.
    let mut ledger = ReservationLedger::new();
    for spec in &pools {
        let (provider, pool, capacity) = parse_pool(spec)?;
        info!(pool = %format_args!("{provider}/{pool}"), capacity, "shared pool declared");
        ledger = ledger.with_capacity(provider, pool, capacity);
    }
    let ledger = Arc::new(ledger);

    // Component registry.
    let registry = Arc::new(ComponentRegistry::with_builtins());
    info!("component registry initialized");

    // Admission queue over the durable pending store.
    let queue = Arc::new(RunQueue::new(
        Arc::new(store.clone()),
        ledger.clone(),
        Arc::new(|run: &TestRun| run.declared_requirements()),
        QueueConfig {
            cooldown: Duration::from_secs(cooldown),
            ..QueueConfig::default()
        },
    ));
    info!(cooldown, "admission queue initialized");

    // Every status transition lands back in the store.
    let updater: RunUpdater = {
        let store = store.clone();
        Arc::new(move |run: &TestRun| {
            if let Err(e) = store.put_run(run) {
                error!(run = %run.id, error = %e, "failed to persist run record");
            }
        })
    };

    let scheduler = Arc::new(Scheduler::new(
        queue,
        ledger,
        registry,
        updater,
        SchedulerConfig { max_requeues },
    ));
    info!(max_requeues, "scheduler initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_handle = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            scheduler.run(shutdown_rx).await;
        })
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to install CTRL+C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    scheduler.abort_all();

    let _ = scheduler_handle.await;
    info!("testrig daemon stopped");
    Ok(())
}

fn submit(data_dir: &Path, owner: &str, path: &Path) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;

    let files: Vec<PathBuf> = if path.is_dir() {
        walkdir::WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "toml"))
            .map(|entry| entry.into_path())
            .collect()
    } else {
        vec![path.to_path_buf()]
    };
    anyhow::ensure!(!files.is_empty(), "no definition files under {path:?}");

    for file in files {
        let definition = TestDefinition::from_file(&file)
            .with_context(|| format!("loading definition {file:?}"))?;
        let run = TestRun::new(owner, definition);
        store.pending_push(&run)?;
        println!("submitted {} as run {}", run.test_name, run.id);
    }
    Ok(())
}

fn status(data_dir: &Path) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    let mut runs = store.list_runs()?;
    runs.sort_by_key(|run| run.created_at);

    for run in runs {
        println!(
            "{}  {:<9}  {}  ({})",
            run.id,
            format!("{:?}", run.status).to_lowercase(),
            run.test_name,
            run.owner
        );
    }
    Ok(())
}

fn open_store(data_dir: &Path) -> anyhow::Result<RunStore> {
    std::fs::create_dir_all(data_dir)?;
    Ok(RunStore::open(&data_dir.join("testrig.redb"))?)
}

/// Parse `provider/pool=capacity`.
fn parse_pool(spec: &str) -> anyhow::Result<(&str, &str, u32)> {
    let (pool, capacity) = spec
        .split_once('=')
        .with_context(|| format!("pool spec {spec:?} is missing '=capacity'"))?;
    let (provider, name) = pool
        .split_once('/')
        .with_context(|| format!("pool spec {spec:?} is missing 'provider/'"))?;
    let capacity = capacity
        .parse()
        .with_context(|| format!("pool spec {spec:?} has a non-numeric capacity"))?;
    Ok((provider, name, capacity))
}
