use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use spindle_core::app::TaskStats;
use spindle_core::domain::{RetryPolicy, TaskId, TaskRecord};
use spindle_core::handlers::Builtins;
use spindle_core::impls::InMemoryLedger;
use spindle_core::ports::{Clock, SystemClock};
use spindle_core::{
    Engine, EngineBuilder, EngineConfig, SubmitRequest, Submission, observability,
};

#[derive(Parser)]
#[command(
    name = "spindle",
    version,
    about = "Durable at-least-once background task engine"
)]
struct Cli {
    /// TOML file with engine settings (durations in *_ms fields)
    #[arg(long, global = true, env = "SPINDLE_CONFIG")]
    config: Option<PathBuf>,

    /// Number of worker loops
    #[arg(long, global = true, env = "SPINDLE_WORKERS")]
    workers: Option<usize>,

    /// Heartbeat age after which an IN_PROGRESS task is reclaimed
    #[arg(long, global = true, env = "SPINDLE_ZOMBIE_THRESHOLD_MS")]
    zombie_threshold_ms: Option<u64>,

    /// Reaper sweep interval
    #[arg(long, global = true, env = "SPINDLE_REAPER_INTERVAL_MS")]
    reaper_interval_ms: Option<u64>,

    /// First retry delay; later retries double it
    #[arg(long, global = true, env = "SPINDLE_RETRY_BASE_MS")]
    retry_base_ms: Option<u64>,

    /// Default max_attempts for submissions that do not set one
    #[arg(long, global = true, env = "SPINDLE_MAX_ATTEMPTS")]
    max_attempts: Option<u32>,

    /// Emit JSON logs
    #[arg(long, global = true, env = "SPINDLE_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start workers and the reaper; stop on Ctrl-C after in-flight tasks finish
    Run,
    /// Submit a sample batch, wait for every task to settle, print the records as JSON
    Demo {
        /// Give up waiting after this many seconds
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.log_json {
        observability::init_json();
    } else {
        observability::init();
    }

    let config = load_config(&cli)?;
    let engine = build_engine(config)?;

    match cli.command {
        Command::Run => run(engine).await,
        Command::Demo { timeout_secs } => demo(engine, Duration::from_secs(timeout_secs)).await,
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => read_config_file(path)?,
        None => EngineConfig::default(),
    };

    if let Some(workers) = cli.workers {
        config = config.workers(workers);
    }
    if let Some(ms) = cli.zombie_threshold_ms {
        config = config.zombie_threshold(Duration::from_millis(ms));
    }
    if let Some(ms) = cli.reaper_interval_ms {
        config = config.reaper_interval(Duration::from_millis(ms));
    }
    if let Some(ms) = cli.retry_base_ms {
        let retry = RetryPolicy {
            base_delay: Duration::from_millis(ms),
            ..config.retry.clone()
        };
        config = config.retry(retry);
    }
    if let Some(max_attempts) = cli.max_attempts {
        config = config.default_max_attempts(max_attempts);
    }
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<EngineConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
}

fn build_engine(config: EngineConfig) -> Result<Engine> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ledger = Arc::new(InMemoryLedger::new(Arc::clone(&clock)));
    let builtins = Builtins::new(ledger, Arc::clone(&clock));

    let engine = builtins
        .install(EngineBuilder::new())?
        .expect_tasks(&Builtins::TASK_TYPES)
        .config(config)
        .with_clock(clock)
        .build()?;
    Ok(engine)
}

async fn run(engine: Engine) -> Result<()> {
    let workers = engine.start();
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;

    info!("shutdown signal received; waiting for in-flight tasks");
    workers.shutdown_and_join().await;
    Ok(())
}

#[derive(Serialize)]
struct DemoReport {
    submissions: Vec<Submission>,
    tasks: Vec<TaskRecord>,
    stats: TaskStats,
}

async fn demo(engine: Engine, timeout: Duration) -> Result<()> {
    let workers = engine.start();
    let runtime = engine.runtime();

    let requests = vec![
        SubmitRequest::new("send_email", json!({ "to": "a@b.com", "subject": "Welcome" }), "k1"),
        // 同じ (type, submission_key): 既存の task が返る
        SubmitRequest::new("send_email", json!({ "to": "a@b.com", "subject": "Welcome" }), "k1"),
        SubmitRequest::new("process_payment", json!({ "amount": 42.5, "customerId": "cus_1" }), "pay-1"),
        SubmitRequest::new("resize_image", json!({ "url": "https://cdn/x.png", "sizes": [128, 512] }), "img-1"),
        SubmitRequest::new("generate_report", json!({ "userId": 7 }), "rep-1"),
        SubmitRequest::new("send_notification", json!({ "userId": 7, "message": "done" }), "note-1"),
        SubmitRequest::new("test_failure", json!({}), "fail-1").max_attempts(3),
        SubmitRequest::new("unknown_type", json!({}), "unknown-1"),
    ];

    let mut submissions = Vec::with_capacity(requests.len());
    for request in requests {
        submissions.push(runtime.submit(request).await?);
    }
    let mut ids: Vec<TaskId> = submissions.iter().map(|s| s.id).collect();
    ids.dedup();

    let settled = tokio::time::timeout(timeout, async {
        loop {
            let mut records = Vec::with_capacity(ids.len());
            for id in &ids {
                records.push(runtime.get_task(*id).await?);
            }
            if records.iter().all(|r| r.status.is_terminal()) {
                return Ok::<_, anyhow::Error>(records);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;
    workers.shutdown_and_join().await;

    let records = match settled {
        Ok(records) => records?,
        Err(_) => bail!("tasks did not settle within {timeout:?}"),
    };
    let stats = runtime.get_stats(Duration::from_secs(3600)).await?;

    let report = DemoReport {
        submissions,
        tasks: records,
        stats,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
