//! bulkpost CLI: run, check, or preview a posting job described by a TOML
//! file.

use std::path::{Path, PathBuf};

use bulkpost::config::{Environment, RunConfig};
use bulkpost::engine::Dispatcher;
use bulkpost::factory::FIRST_LINE_TITLES;
use bulkpost::source::ItemSource;
use bulkpost::telemetry::{SERVICE_NAME, TelemetryConfig, init_telemetry};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "bulkpost", about = "Bulk posting with bounded concurrency")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate and execute every task in the config
    Run {
        /// Run configuration (TOML)
        config: PathBuf,
    },
    /// Load the config and all its sources without executing anything
    Check {
        /// Run configuration (TOML)
        config: PathBuf,
    },
    /// Print the first generated tasks with passwords redacted
    Preview {
        /// Run configuration (TOML)
        config: PathBuf,
        /// Number of tasks to show
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let env = Environment::from_env();

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: env.otel_endpoint.clone(),
        service_name: SERVICE_NAME.to_string(),
        log_level: env.log_level.clone(),
    })?;

    match cli.command {
        Command::Run { config } => cmd_run(&config).await,
        Command::Check { config } => cmd_check(&config),
        Command::Preview { config, count } => cmd_preview(&config, count),
    }
}

async fn cmd_run(path: &Path) -> anyhow::Result<()> {
    let config = RunConfig::load(path)?;
    let tasks = config.task_factory()?;
    let total = tasks.total();

    let mut dispatcher = Dispatcher::new(config.operation()?, config.dispatch_config()?);
    if let Some(sink) = config.output_sink() {
        info!(path = %sink.path_for(bulkpost::output::RESULT_EXT).display(), "writing results");
        dispatcher = dispatcher.with_reporter(sink);
    }

    let started = chrono::Local::now();
    info!(tasks = total, "run started at {}", started.format("%Y-%m-%d %H:%M:%S"));

    let summary = tokio::select! {
        summary = dispatcher.run(tasks) => summary,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, in-flight tasks abandoned");
            anyhow::bail!("interrupted");
        }
    };

    let elapsed = chrono::Local::now() - started;
    println!(
        "{} succeeded, {} failed, {} retried, {} pass(es) in {}s",
        summary.succeeded,
        summary.failed.len(),
        summary.retried,
        summary.passes,
        elapsed.num_seconds()
    );
    for dead in &summary.failed {
        println!(
            "  [{}] {} after {} attempt(s): {}",
            dead.index, dead.id, dead.attempts, dead.failure
        );
    }

    if !summary.is_clean() {
        anyhow::bail!("{} task(s) failed", summary.failed.len());
    }
    Ok(())
}

fn cmd_check(path: &Path) -> anyhow::Result<()> {
    let config = RunConfig::load(path)?;
    let tasks = &config.tasks;

    let format = config.account_format()?;
    let accounts = format.load_accounts(&config.resolve(&tasks.accounts))?;
    println!("accounts:  {} ({})", accounts.len(), format.name());

    match tasks.titles.as_deref() {
        Some(FIRST_LINE_TITLES) => println!("titles:    first line of content"),
        Some(titles) => {
            let titles = ItemSource::open(config.resolve(titles))?;
            println!("titles:    {}", titles.len());
        }
        None => println!("titles:    -"),
    }
    let content = ItemSource::open(config.resolve(&tasks.content))?;
    println!("content:   {}", content.len());
    if let Some(tags) = &tasks.tags {
        let tags = ItemSource::open(config.resolve(tags))?;
        println!("tags:      {}", tags.len());
    }

    // Builds the factory too, which catches content with no usable entries.
    config.task_factory()?;
    config.operation()?;
    println!("tasks:     {}", tasks.count);
    println!("config ok");
    Ok(())
}

fn cmd_preview(path: &Path, count: usize) -> anyhow::Result<()> {
    let config = RunConfig::load(path)?;
    for item in config.task_factory()?.take(count) {
        println!(
            "[{}] {}",
            item.index,
            serde_json::to_string_pretty(&item.payload.to_preview_json())?
        );
    }
    Ok(())
}
