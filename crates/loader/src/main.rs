mod clients;
mod probe;

use anyhow::{Context, Result};
use clap::Parser;
use stats_core::{
    Aggregator, Clock, Config, LoopExit, Reporter, ReporterOptions, StopFlag, SystemClock,
    TickLoop,
};
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use clients::{run_client, split_clients, ClientContext, ClientTable};
use probe::{HttpProbe, MockProbe, Probe};

#[derive(Parser, Debug)]
#[command(name = "loader")]
#[command(about = "Load generator - drives virtual clients and reports interval statistics")]
struct Args {
    /// Path to batch configuration file
    #[arg(long, default_value = "config/batch.toml")]
    config: PathBuf,

    /// Request mode: mock or http
    #[arg(long, default_value = "mock")]
    mode: String,

    /// Batch name (overrides config)
    #[arg(long)]
    batch_name: Option<String>,

    /// Stop after N milliseconds (overrides config)
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Statistics interval in milliseconds (overrides config)
    #[arg(long)]
    interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr next to the console statistics; stdout carries JSON only
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    if let Some(name) = args.batch_name {
        config.batch.name = name;
    }
    if let Some(duration_ms) = args.duration_ms {
        config.batch.duration_ms = Some(duration_ms);
    }
    if let Some(interval_ms) = args.interval_ms {
        config.reporting.interval_ms = interval_ms;
    }
    config.validate()?;

    info!(
        "Starting batch '{}' in {} mode: {} clients over {} workers, {} URLs",
        config.batch.name,
        args.mode,
        config.batch.clients_max,
        config.batch.workers,
        config.urls.len()
    );

    let probe: Arc<dyn Probe> = match args.mode.as_str() {
        "mock" => Arc::new(MockProbe::new(5)),
        "http" => Arc::new(
            HttpProbe::new(config.target.timeout_ms).context("Failed to create HTTP probe")?,
        ),
        _ => anyhow::bail!("Invalid mode: {}, must be 'mock' or 'http'", args.mode),
    };
    info!("Using probe: {}", probe.name());

    match run_batch(config, probe).await? {
        LoopExit::Stopped => {
            info!("Batch stopped");
            // a stopped batch always ends the process with a failure status
            std::process::exit(1);
        }
    }
}

async fn run_batch(config: Config, probe: Arc<dyn Probe>) -> Result<LoopExit> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let urls = Arc::new(config.url_table());
    let mut aggregator = Aggregator::new(clock.now_ms()?, urls.clone())
        .context("Failed to initialise batch statistics")?;

    let stop = Arc::new(StopFlag::new());
    let active = Arc::new(AtomicU64::new(0));
    let client_table = ClientTable::new(config.batch.clients_max as usize);

    let mut slot = 0usize;
    for worker_idx in 0..config.batch.workers {
        let worker = aggregator
            .add_worker()
            .with_context(|| format!("Failed to allocate counters for worker {worker_idx}"))?;
        let ctx = ClientContext {
            worker,
            urls: urls.clone(),
            probe: probe.clone(),
            stop: stop.clone(),
            clients: client_table.clone(),
            active: active.clone(),
        };

        let n = split_clients(config.batch.clients_max, config.batch.workers, worker_idx);
        for _ in 0..n {
            tokio::spawn(run_client(slot, ctx.clone()));
            slot += 1;
        }
        info!("Worker {} started with {} clients", worker_idx, n);
    }

    {
        let stop = stop.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, stopping batch");
                    stop.trigger();
                }
                Err(e) => warn!("Failed to listen for interrupt: {}", e),
            }
        });
    }

    if let Some(duration_ms) = config.batch.duration_ms {
        let stop = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(duration_ms)).await;
            info!("Duration of {}ms reached, stopping batch", duration_ms);
            stop.trigger();
        });
    }

    let reporter = Reporter::open(ReporterOptions::from(&config));
    let tick_loop = TickLoop::new(
        aggregator,
        reporter,
        clock,
        stop,
        active,
        Box::new(client_table),
        Duration::from_millis(config.reporting.interval_ms),
    );

    Ok(tick_loop.run().await?)
}
