//! workq CLI: exercise the queue from the command line.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::task::LocalSet;
use workq::config::Config;
use workq::engine::{QueueService, ServiceConfig};
use workq::telemetry::{TelemetryConfig, init_telemetry};
use workq::{NodeError, WorkQueue, YieldPolicy};

#[derive(Parser)]
#[command(name = "workq", about = "Cooperative work queue")]
struct Cli {
    /// TOML config file (defaults to environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append one node, prepend five weighted nodes, and drain through a service
    Demo,
    /// Drain a synthetic workload and report the outcome
    Run {
        /// Nodes appended up front
        #[arg(long, default_value_t = 100)]
        nodes: usize,
        /// Children each node prepends while executing
        #[arg(long, default_value_t = 0)]
        fanout: usize,
        /// Fail every k-th top-level node (0 = never)
        #[arg(long, default_value_t = 0)]
        fail_every: usize,
        /// Yield policy: never, every-node, batch:N, slice:MS
        #[arg(long = "yield")]
        yield_policy: Option<YieldPolicy>,
        /// Print journaled events as JSON lines
        #[arg(long)]
        events: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => Config::load(path)?,
        None => Config::from_env()?,
    };

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "workq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    match cli.command {
        Command::Demo => cmd_demo(&config).await,
        Command::Run {
            nodes,
            fanout,
            fail_every,
            yield_policy,
            events,
        } => {
            let mut config = config;
            if let Some(policy) = yield_policy {
                config.yield_policy = policy;
            }
            if events && config.journal_capacity == 0 {
                config.journal_capacity = 10_000;
            }
            cmd_run(&config, nodes, fanout, fail_every, events).await
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    order: u64,
    sum: u64,
    executed: Vec<String>,
    observed: Option<u64>,
}

async fn cmd_demo(config: &Config) -> anyhow::Result<()> {
    let service = QueueService::new(Tally::default(), ServiceConfig::from(config));

    service.append_fn("sum worker", |cx| {
        let tally = cx.state();
        tally.executed.push("sum worker".to_string());
        tally.observed = Some(tally.sum);
        Ok(())
    });
    for value in [100_000, 10_000, 1_000, 100, 10] {
        service.prepend_fn(format!("prepend worker {value}"), move |cx| {
            let tally = cx.state();
            tally.order += 1;
            tally.sum += tally.order * value;
            tally.executed.push(value.to_string());
            Ok(())
        });
    }

    LocalSet::new()
        .run_until(async {
            let handle = service.spawn();
            service.wait_idle().await;
            service.shutdown();
            anyhow::Ok(handle.await??)
        })
        .await?;

    service.with_state(|tally| {
        println!("Order:    {}", tally.executed.join(" -> "));
        println!(
            "Sum:      {}",
            tally
                .observed
                .map(|sum| sum.to_string())
                .unwrap_or("-".to_string())
        );
    });
    Ok(())
}

async fn cmd_run(
    config: &Config,
    nodes: usize,
    fanout: usize,
    fail_every: usize,
    events: bool,
) -> anyhow::Result<()> {
    let mut queue: WorkQueue<u64> = WorkQueue::with_journal(config.journal_capacity);

    for i in 1..=nodes {
        queue.append_fn(format!("node {i}"), move |cx| {
            for child in (1..=fanout).rev() {
                cx.prepend_fn(format!("node {i}.{child}"), move |cx| {
                    *cx.state() += busy_work(child as u64);
                    Ok(())
                });
            }
            if fail_every > 0 && i % fail_every == 0 {
                return Err(NodeError::msg(format!("synthetic failure at node {i}")));
            }
            *cx.state() += busy_work(i as u64);
            Ok(())
        });
    }

    let mut checksum = 0;
    let mut budget = config.yield_policy.budget();
    let report = queue.drain_cooperative(&mut checksum, &mut budget).await;

    println!("Policy:   {}", config.yield_policy);
    println!("Executed: {}", report.executed);
    println!("Failed:   {}", report.failures.len());
    println!("Checksum: {checksum}");
    for failure in &report.failures {
        println!("  {}: {}", failure.description, failure.error);
    }

    if events {
        for event in queue.take_events() {
            println!("{}", serde_json::to_string(&event)?);
        }
    }

    Ok(())
}

fn busy_work(seed: u64) -> u64 {
    (0..1_000u64).fold(seed, |acc, n| acc.wrapping_mul(31).wrapping_add(n))
}
