//! workbridge CLI: drive the bridge end to end from a terminal.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use workbridge::config::Config;
use workbridge::event_loop::EventLoop;
use workbridge::model::{CompletionStatus, WorkSpec};
use workbridge::pool::{BlockingPool, WorkerPool};
use workbridge::telemetry::init_telemetry;

#[derive(Parser)]
#[command(name = "workbridge", about = "Async-work bridge demo host")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Push a batch of blocking jobs through the bridge
    Run {
        /// Work items to create and queue
        #[arg(long, default_value_t = 8)]
        items: usize,
        /// Cancel this many items right after queueing them
        #[arg(long, default_value_t = 0)]
        cancel: usize,
        /// Milliseconds each execute callback sleeps
        #[arg(long, default_value_t = 25)]
        sleep_ms: u64,
        /// Dump the bridge event stream as JSON lines when done
        #[arg(long)]
        events: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    init_telemetry(&config.log_level)?;

    match cli.command {
        Command::Run {
            items,
            cancel,
            sleep_ms,
            events,
        } => cmd_run(config, items, cancel, sleep_ms, events).await,
    }
}

async fn cmd_run(
    config: Config,
    items: usize,
    cancel: usize,
    sleep_ms: u64,
    dump_events: bool,
) -> anyhow::Result<()> {
    let pool = Arc::new(BlockingPool::spawn(config.workers));
    let (event_loop, manager) = EventLoop::with_event_capacity(pool.clone(), config.event_capacity);
    let loop_task = tokio::spawn(event_loop.run());

    let executed = Arc::new(AtomicUsize::new(0));
    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();

    let mut ids = Vec::with_capacity(items);
    for i in 0..items {
        let executed = Arc::clone(&executed);
        let done_tx = done_tx.clone();
        let spec = WorkSpec::new(format!("demo.job-{i}"))
            .resource_tag("demo-batch")
            .execute(move || {
                std::thread::sleep(Duration::from_millis(sleep_ms));
                executed.fetch_add(1, Ordering::SeqCst);
            })
            .complete(move |env, status| {
                env.create_value(serde_json::json!({ "job": i, "status": status.to_string() }));
                let _ = done_tx.send(status);
            });

        let id = manager.create(spec)?;
        manager.queue(id)?;
        if i < cancel {
            match manager.cancel(id) {
                Ok(()) => println!("job {i}: cancelled before start"),
                Err(err) => println!("job {i}: cancel rejected ({err})"),
            }
        }
        ids.push(id);
    }
    drop(done_tx);

    // Every item completes exactly once, cancelled ones included.
    let mut ok = 0usize;
    let mut cancelled = 0usize;
    let mut failed = 0usize;
    for _ in 0..items {
        match done_rx.recv().await {
            Some(CompletionStatus::Ok) => ok += 1,
            Some(CompletionStatus::Cancelled) => cancelled += 1,
            Some(CompletionStatus::GenericFailure) => failed += 1,
            None => break,
        }
    }

    for id in &ids {
        manager.delete(*id)?;
    }

    println!();
    println!("{:<16}  {}", "ok", ok);
    println!("{:<16}  {}", "cancelled", cancelled);
    println!("{:<16}  {}", "generic_failure", failed);
    println!("{:<16}  {}", "executed", executed.load(Ordering::SeqCst));
    println!("{:<16}  {}", "live handles", pool.live_handles());
    println!("{:<16}  {}", "live work", manager.live_work());

    if dump_events {
        println!();
        for event in manager.events_since(0) {
            println!("{}", serde_json::to_string(&event)?);
        }
    }

    manager.shutdown();
    loop_task.await.ok();
    Ok(())
}
