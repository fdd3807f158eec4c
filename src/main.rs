//! Rivulet demo - Main Entry Point
//!
//! Runs small reactive pipelines that show demand, backpressure policies,
//! combinators and chunked downstream consumption.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rivulet::config::{self, BackpressurePolicy, EngineConfig, OverflowStrategy};
use rivulet::runtime::Engine;
use rivulet::stream::{
    Downstream, DownstreamSubscriber, Flux, StreamError, Subscriber, Subscription,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Pull-based reactive streams demo", long_about = None)]
struct Cli {
    /// Engine config file (TOML). Defaults to the platform config directory.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    scenario: Scenario,
}

#[derive(Subcommand, Debug)]
enum Scenario {
    /// Log every signal of a three-word stream
    Hello,
    /// Two ranges, one after the other
    Concat,
    /// Two interval streams interleaved on the worker pool
    Merge,
    /// A fast ticker against a consumer requesting one value per period
    Backpressure {
        #[arg(long, value_enum, default_value_t = PolicyArg::Drop)]
        policy: PolicyArg,
        /// Buffer capacity for the buffer policies
        #[arg(long, default_value_t = 50)]
        capacity: usize,
        /// Consumer period in milliseconds
        #[arg(long, default_value_t = 100)]
        millis: u64,
        /// Values to consume before cancelling
        #[arg(long, default_value_t = 10)]
        count: u64,
    },
    /// Generate customer records and write them in batches
    Seed {
        #[arg(long, default_value_t = 100_000)]
        records: u64,
        #[arg(long, default_value_t = 1000)]
        batch: usize,
    },
    /// Print the plan of a sample pipeline as JSON
    Plan,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    Unbounded,
    Drop,
    Buffer,
    DropLatest,
    DropOldest,
}

impl PolicyArg {
    fn policy(self, capacity: usize) -> BackpressurePolicy {
        match self {
            PolicyArg::Unbounded => BackpressurePolicy::Unbounded,
            PolicyArg::Drop => BackpressurePolicy::Drop,
            PolicyArg::Buffer => BackpressurePolicy::buffer(capacity, OverflowStrategy::Error),
            PolicyArg::DropLatest => {
                BackpressurePolicy::buffer(capacity, OverflowStrategy::DropLatest)
            }
            PolicyArg::DropOldest => {
                BackpressurePolicy::buffer(capacity, OverflowStrategy::DropOldest)
            }
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(config::default_config_path()
            .filter(|p| p.exists())
            .map(EngineConfig::load_or_default)
            .unwrap_or_default()),
    }
}

/// Install the global subscriber. The returned guard flushes the log file.
fn init_logging(
    config: &EngineConfig,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .context("Invalid log filter")?;

    let (file_layer, guard) = match &config.logging.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path
                .file_name()
                .context("Log file path has no file name")?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(guard)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let _guard = init_logging(&config)?;

    let engine = Engine::new(config).context("Failed to start engine")?;
    tracing::info!("Running scenario {:?}", cli.scenario);

    match cli.scenario {
        Scenario::Hello => hello()?,
        Scenario::Concat => concat()?,
        Scenario::Merge => merge(&engine)?,
        Scenario::Backpressure {
            policy,
            capacity,
            millis,
            count,
        } => backpressure(&engine, policy.policy(capacity), millis, count)?,
        Scenario::Seed { records, batch } => seed(&engine, records, batch)?,
        Scenario::Plan => plan()?,
    }
    Ok(())
}

// ── Scenarios ──

fn hello() -> Result<()> {
    let words = Flux::from_iterable(vec!["hello", "reactive", "world"])
        .log("hello")
        .map(str::to_uppercase)
        .collect_list()?;
    println!("{}", words.join(" "));
    Ok(())
}

fn concat() -> Result<()> {
    let values = Flux::range(1, 3)
        .concat_with(Flux::range(4, 3))
        .collect_list()?;
    println!("{:?}", values);
    Ok(())
}

fn merge(engine: &Engine) -> Result<()> {
    let fast = Flux::interval(Duration::from_millis(10))
        .take(5)
        .map(|i| format!("fast-{}", i));
    let slow = Flux::interval(Duration::from_millis(25))
        .take(5)
        .map(|i| format!("slow-{}", i));
    for value in fast.merge_with(slow).collect_list_on(&engine.pool())? {
        println!("{}", value);
    }
    Ok(())
}

/// Prints every value and hands its subscription to the main thread, which
/// requests one value per period.
struct PacedConsumer {
    started: Instant,
    subscriptions: crossbeam_channel::Sender<Subscription>,
    done: crossbeam_channel::Sender<Option<StreamError>>,
}

impl Subscriber<u64> for PacedConsumer {
    fn on_subscribe(&mut self, subscription: Subscription) {
        let _ = self.subscriptions.send(subscription);
    }

    fn on_next(&mut self, value: u64) {
        println!(
            "[{:>6} ms] consumer kept tick {}",
            self.started.elapsed().as_millis(),
            value
        );
    }

    fn on_complete(&mut self) {
        let _ = self.done.send(None);
    }

    fn on_error(&mut self, error: StreamError) {
        let _ = self.done.send(Some(error));
    }
}

fn backpressure(
    engine: &Engine,
    policy: BackpressurePolicy,
    millis: u64,
    count: u64,
) -> Result<()> {
    println!("policy {}, one request every {} ms", policy, millis);
    let (sub_tx, sub_rx) = crossbeam_channel::bounded(1);
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let consumer = PacedConsumer {
        started: Instant::now(),
        subscriptions: sub_tx,
        done: done_tx,
    };

    Flux::interval(Duration::from_millis(1))
        .on_backpressure(policy)
        .subscribe(&engine.dedicated("rivulet-ticker"), consumer);
    let subscription = sub_rx
        .recv_timeout(Duration::from_secs(5))
        .context("Ticker did not start")?;

    for _ in 0..count {
        subscription.request(1);
        if let Ok(outcome) = done_rx.recv_timeout(Duration::from_millis(millis)) {
            match outcome {
                Some(e) => println!("terminated: {}", e),
                None => println!("completed"),
            }
            return Ok(());
        }
    }
    subscription.cancel();
    println!("cancelled after {} requests", count);
    Ok(())
}

#[derive(Debug, Clone)]
struct Customer {
    name: String,
    job: String,
    orders: u32,
}

/// Pretends to insert batches into a database.
struct BatchWriter {
    inserted: u64,
    batches: u64,
    done: crossbeam_channel::Sender<Result<(u64, u64), StreamError>>,
}

impl Downstream<Vec<Customer>> for BatchWriter {
    fn submit(&mut self, batch: Vec<Customer>) {
        self.inserted += batch.len() as u64;
        self.batches += 1;
        let orders: u32 = batch.iter().map(|c| c.orders).sum();
        if let Some(last) = batch.last() {
            tracing::debug!(
                "Inserted batch {} ({} orders) up to {} ({})",
                self.batches,
                orders,
                last.name,
                last.job
            );
        }
    }

    fn complete(&mut self) {
        let _ = self.done.send(Ok((self.inserted, self.batches)));
    }

    fn error(&mut self, error: StreamError) {
        let _ = self.done.send(Err(error));
    }
}

fn seed(engine: &Engine, records: u64, batch: usize) -> Result<()> {
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let writer = BatchWriter {
        inserted: 0,
        batches: 0,
        done: done_tx,
    };
    let started = Instant::now();

    Flux::generate(move |i| {
        Ok((i < records).then(|| Customer {
            name: format!("Customer_{}", i),
            job: format!("Job_{}", i % 50),
            orders: 1 + (i % 3) as u32,
        }))
    })
    .buffer(batch)
    .subscribe(&engine.pool(), DownstreamSubscriber::new(writer, 4));

    let (inserted, batches) = done_rx
        .recv()
        .context("Seeder stopped without reporting")??;
    println!(
        "Finished seeding {} customers in {} batches ({:?})",
        inserted,
        batches,
        started.elapsed()
    );
    Ok(())
}

fn plan() -> Result<()> {
    let pipeline = Flux::range(1, 20)
        .skip_until(|v| v % 5 == 0)
        .merge_with(Flux::range(100, 3))
        .on_backpressure_buffer(64)
        .buffer(3);
    let json = serde_json::to_string_pretty(pipeline.plan()).context("Failed to encode plan")?;
    println!("{}", json);
    Ok(())
}
