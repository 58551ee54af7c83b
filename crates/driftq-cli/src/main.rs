use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use clap::Parser;
use serde::Deserialize;
use tokio::time::{Duration, sleep};
use tracing::info;

use driftq_core::config::{CONFIG_ENV_VAR, QueueConfig};
use driftq_core::observability::init_logging;
use driftq_core::{Event, EventHandler, ExecutionMode, HandlerError, Payload, Priority, QueueBuilder};

/// Offline-aware event queue demo.
#[derive(Debug, Parser)]
#[command(name = "driftq", version)]
struct Args {
    /// TOML config file. Defaults are used when absent.
    #[arg(long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Override the configured execution strategy.
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// How many times the flaky handler fails before succeeding.
    #[arg(long, default_value_t = 2)]
    failures: u32,

    /// How long the demo stays offline.
    #[arg(long, default_value_t = 1500)]
    offline_ms: u64,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Mode {
    Cooperative,
    Dedicated,
}

impl From<Mode> for ExecutionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Cooperative => ExecutionMode::Cooperative,
            Mode::Dedicated => ExecutionMode::Dedicated,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LogPayload {
    message: String,
}

/// Fails a fixed number of times, then succeeds.
struct FlakyHandler {
    remaining_failures: AtomicU32,
}

#[async_trait]
impl EventHandler for FlakyHandler {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(format!("intentional failure (left={left})").into());
        }
        println!("processed {} ({})", event.event_type(), event.id());
        Ok(())
    }
}

/// Stands in for a remote log sink.
struct RemoteLogHandler;

#[async_trait]
impl EventHandler for RemoteLogHandler {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        let p: LogPayload = serde_json::from_value(event.payload().clone().into())?;
        println!("remote_log [{}]: {}", event.priority(), p.message);
        Ok(())
    }
}

fn payload(value: serde_json::Value) -> Payload {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Payload::new(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let args = Args::parse();

    // (A) 設定を読む（--config > DRIFTQ_CONFIG > デフォルト）
    let mut config = match &args.config {
        Some(path) => QueueConfig::load_from_file(path)?,
        None => QueueConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.execution = mode.into();
    }
    config.retry.base_delay_ms = config.retry.base_delay_ms.min(200);

    // (B) キューと processor を用意
    let queue = QueueBuilder::new()
        .with_config(config)
        .register(
            "api_call",
            FlakyHandler {
                remaining_failures: AtomicU32::new(args.failures),
            },
        )
        .register("remote_log", RemoteLogHandler)
        .expect_processors(&["api_call", "remote_log"])
        .build()?;
    info!(strategy = queue.strategy_name(), "queue ready");

    // (C) オフラインのままイベントを投入
    queue.set_online_status(false);
    queue.queue_event(
        "remote_log",
        payload(serde_json::json!({ "message": "device booted" })),
        Priority::Low,
    )?;
    queue.queue_event(
        "api_call",
        payload(serde_json::json!({ "endpoint": "/v1/heartbeat" })),
        Priority::High,
    )?;
    queue.queue_event("no_handler_registered", Payload::new(), Priority::Normal)?;
    sleep(Duration::from_millis(args.offline_ms)).await;
    println!("while offline: {}", serde_json::to_string_pretty(&queue.get_queue_stats())?);

    // (D) オンラインに戻して、キューが空になるまで待つ
    queue.set_online_status(true);
    for _ in 0..200 {
        let stats = queue.get_queue_stats();
        if stats.queue_size == 0 {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }
    println!("final: {}", serde_json::to_string_pretty(&queue.get_queue_stats())?);

    // (E) ループを止めて終了
    queue.shutdown().await;
    Ok(())
}
