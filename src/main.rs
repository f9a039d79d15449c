use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use testdeck::config::Config;
use testdeck::durations::DurationStore;
use testdeck::run::command::{CommandSpec, Platform};
use testdeck::run::registry::Registry;
use testdeck::run::supervisor::Supervisor;
use testdeck::run::RunStatus;

#[derive(Parser)]
#[command(
    name = "testdeck",
    about = "Run orchestration daemon for browser-driven UI test suites",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (default: TESTDECK_CONFIG, then
    /// ./testdeck.toml, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + scheduler)
    Serve {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },

    /// Run one test set immediately and stream its output
    Run {
        /// Target platform
        #[arg(long, value_enum)]
        platform: Platform,

        /// Path to the test-set file
        #[arg(long)]
        test_set: String,

        /// Target URL (required for the custom platform)
        #[arg(long)]
        url: Option<String>,

        /// Login username passed to the test executable
        #[arg(long)]
        username: Option<String>,

        /// Login password passed to the test executable
        #[arg(long)]
        password: Option<String>,

        /// Run the browser headless
        #[arg(long)]
        headless: bool,

        /// Save a screenshot for every step, not only failures
        #[arg(long)]
        save_all_screenshots: bool,

        /// Seconds to wait between steps
        #[arg(long)]
        wait_time: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(),
    };

    match cli.command {
        Commands::Serve { bind } => {
            tracing::info!(%bind, "starting testdeck daemon");
            testdeck::serve(&bind, config).await?;
        }
        Commands::Run {
            platform,
            test_set,
            url,
            username,
            password,
            headless,
            save_all_screenshots,
            wait_time,
        } => {
            let spec = CommandSpec {
                platform,
                test_set,
                url,
                username,
                password,
                headless,
                save_all_screenshots,
                wait_time,
            };
            let status = run_and_stream(&config, &spec).await?;
            if status != RunStatus::Completed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Start one run through the supervisor and mirror its output to the
/// terminal until it reaches a terminal state.
async fn run_and_stream(config: &Config, spec: &CommandSpec) -> Result<RunStatus> {
    let durations = DurationStore::load(&config.store.durations_file);
    let registry = Registry::new();
    let supervisor = Supervisor::new(registry.clone(), durations, config);

    let run_id = supervisor.start_run(spec).await?;
    println!("Test started with ID: {run_id}");

    let mut printed = 0;
    loop {
        tokio::time::sleep(Duration::from_millis(500)).await;

        let Some(record) = registry.snapshot(&run_id).await else {
            anyhow::bail!("run {run_id} disappeared from the registry");
        };
        for line in &record.output[printed..] {
            println!("{line}");
        }
        printed = record.output.len();

        if record.status.is_terminal() {
            println!(
                "Run {} {} in {:.1}s",
                run_id,
                record.status,
                record.duration_seconds.unwrap_or(0.0)
            );
            if let Some(file) = &record.results_file {
                println!("Results file: {file}");
            }
            return Ok(record.status);
        }
    }
}
