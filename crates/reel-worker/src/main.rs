//! Reel pipeline worker binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_models::RequestId;
use reel_store::{FirestoreStore, MemoryStore, Repository, Store};
use reel_worker::stages::{
    self, AssembleStage, ConvertStage, DescribeStage, ExtractStage, NarrateStage, ScriptStage,
    SpawnFormatStage, SpawnRequestStage,
};
use reel_worker::transitions;
use reel_worker::{
    create_request, finalize_request, register_upload, FfmpegMedia, LeaseSweeper,
    NewVideoRequest, ProviderAi, Stage, StageRunner, StoreBackend, WorkerConfig, WorkerContext,
};

#[derive(Parser, Debug)]
#[command(name = "reel-worker", version, about = "Short-form video pipeline workers")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Stop each stage after this many records
    #[arg(long, global = true, env = "WORKER_MAX_COUNT")]
    max_count: Option<usize>,

    /// Records claimed per poll
    #[arg(long, global = true, env = "WORKER_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Do not run the lease sweeper alongside the stages
    #[arg(long, global = true)]
    no_sweep: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Describe uploads (transcripts, descriptions, metadata)
    Describe,
    /// Convert uploads into per-aspect-ratio assets
    Convert,
    /// Spawn video jobs from finalized requests
    Spawn {
        /// Spawn from per-format records instead of whole requests
        #[arg(long)]
        per_format: bool,
    },
    /// Generate titles and scripts
    Script,
    /// Extract scene lists from scripts
    Extract,
    /// Synthesize scene narration
    Narrate,
    /// Expand, render and concatenate ready videos
    Assemble,
    /// Only reclaim expired leases
    Sweep,
    /// Run every stage in one process
    All,
    /// Create a request from a JSON file and register local uploads
    Submit {
        /// JSON request body: lang, topic, style, brand_link, formats
        request: PathBuf,
        /// Media files to register as uploads
        #[arg(long = "upload")]
        uploads: Vec<PathBuf>,
        /// Finalize the request after registering uploads
        #[arg(long)]
        finalize: bool,
    },
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::from_default_env().add_directive("reel=info".parse().expect("static directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn connect_store(backend: StoreBackend) -> anyhow::Result<Arc<dyn Store>> {
    Ok(match backend {
        StoreBackend::Firestore => Arc::new(
            FirestoreStore::from_env()
                .await
                .context("failed to connect to Firestore")?,
        ),
        StoreBackend::Memory => {
            warn!("Using the in-memory store; records do not outlive this process");
            Arc::new(MemoryStore::new())
        }
    })
}

async fn submit(repo: &Repository, request: PathBuf, uploads: Vec<PathBuf>, finalize: bool) -> anyhow::Result<()> {
    let body = tokio::fs::read_to_string(&request)
        .await
        .with_context(|| format!("failed to read {}", request.display()))?;
    let new: NewVideoRequest = serde_json::from_str(&body).context("invalid request JSON")?;
    let request_id: RequestId = create_request(repo, new).await?;

    for path in uploads {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", path.display()))?;
        // Kind detection falls back to the extension for opaque MIME types.
        register_upload(repo, &request_id, &filename, "application/octet-stream", &path.to_string_lossy()).await?;
    }

    if finalize {
        finalize_request(repo, &request_id).await?;
    }
    println!("{}", request_id);
    Ok(())
}

fn stages_for(command: &Command, ctx: &WorkerContext) -> Vec<Arc<dyn Stage>> {
    match command {
        Command::Describe => vec![Arc::new(DescribeStage::new(ctx.clone()))],
        Command::Convert => vec![Arc::new(ConvertStage::new(ctx.clone()))],
        Command::Spawn { per_format } if *per_format || ctx.config.spawn_per_format => {
            vec![Arc::new(SpawnFormatStage::new(ctx.clone()))]
        }
        Command::Spawn { .. } => vec![Arc::new(SpawnRequestStage::new(ctx.clone()))],
        Command::Script => vec![Arc::new(ScriptStage::new(ctx.clone()))],
        Command::Extract => vec![Arc::new(ExtractStage::new(ctx.clone()))],
        Command::Narrate => vec![Arc::new(NarrateStage::new(ctx.clone()))],
        Command::Assemble => vec![Arc::new(AssembleStage::new(ctx.clone()))],
        Command::All => stages::pipeline(ctx),
        Command::Sweep | Command::Submit { .. } => Vec::new(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = WorkerConfig::from_env()?;
    if let Some(max_count) = cli.max_count {
        config.max_count = Some(max_count);
    }
    if let Some(batch_size) = cli.batch_size.filter(|n| *n > 0) {
        config.batch_size = batch_size;
    }
    info!("Worker config: {:?}", config);

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        let addr: SocketAddr = addr.parse().context("invalid METRICS_ADDR")?;
        reel_worker::metrics::init_metrics(addr).context("failed to start metrics exporter")?;
        info!(%addr, "Serving Prometheus metrics");
    }

    let repo = Repository::new(connect_store(config.store_backend).await?);

    if let Command::Submit {
        request,
        uploads,
        finalize,
    } = &cli.command
    {
        return submit(&repo, request.clone(), uploads.clone(), *finalize).await;
    }

    let stages = if matches!(cli.command, Command::Sweep) {
        Vec::new()
    } else {
        let ai = ProviderAi::from_env().context("failed to configure AI providers")?;
        let ctx = WorkerContext::new(repo.clone(), Arc::new(FfmpegMedia), Arc::new(ai), config.clone());
        stages_for(&cli.command, &ctx)
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_tx.send(true).ok();
    });

    let mut tasks = JoinSet::new();
    let run_sweeper = !cli.no_sweep && (matches!(cli.command, Command::Sweep) || !stages.is_empty());
    if run_sweeper {
        let sweeper = LeaseSweeper::new(
            repo.clone(),
            transitions::ALL.to_vec(),
            config.max_attempts,
            config.sweep_interval,
        );
        let rx = shutdown_rx.clone();
        // Runs until shutdown or until the stages finish and the process exits.
        tokio::spawn(async move { sweeper.run(rx).await });
    }

    info!(stages = stages.len(), "Starting reel-worker");
    for stage in stages {
        let runner = StageRunner::new(stage, repo.clone(), config.clone());
        let rx = shutdown_rx.clone();
        tasks.spawn(async move {
            let name = runner.name();
            (name, runner.run(rx).await)
        });
    }

    if tasks.is_empty() {
        // Sweep-only mode runs until interrupted.
        let mut rx = shutdown_rx;
        while rx.changed().await.is_ok() && !*rx.borrow() {}
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((name, Ok(processed))) => info!(stage = name, processed, "Stage finished"),
            Ok((name, Err(e))) => error!(stage = name, "Stage stopped with error: {}", e),
            Err(e) => error!("Stage task panicked: {}", e),
        }
    }

    info!("Worker shutdown complete");
    Ok(())
}
