//! docstore-migrate CLI - migrate partitioned document collections.

use clap::{Args, Parser, Subcommand};
use docstore_migrate::{
    Config, MigrateError, MigrationReport, Orchestrator, ProgressStage, ProgressUpdate, RunStatus,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Capacity of the progress channel; updates beyond it are dropped.
const PROGRESS_CHANNEL_CAPACITY: usize = 1024;

#[derive(Parser)]
#[command(name = "docstore-migrate")]
#[command(about = "Migrate partitioned document collections between document stores")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Path to state file for resume capability
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Timeout in seconds for graceful shutdown (default: 60)
    #[arg(long, default_value = "60")]
    shutdown_timeout: u64,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new migration
    Run(RunArgs),

    /// Resume a previously interrupted migration
    Resume(RunArgs),

    /// Validate document counts between source and target
    Validate(ScopeArgs),

    /// Test source and target store connections
    HealthCheck,
}

/// Which collections a command touches.
#[derive(Args, Clone)]
struct ScopeArgs {
    /// Only migrate this database
    #[arg(long, env = "DATABASE")]
    database: Option<String>,

    /// Only migrate this collection (requires --database)
    #[arg(long, env = "CONTAINER")]
    container: Option<String>,

    /// Override the source snapshot path
    #[arg(long, env = "SOURCE_PATH")]
    source_path: Option<PathBuf>,

    /// Override the target snapshot path
    #[arg(long, env = "TARGET_PATH")]
    target_path: Option<PathBuf>,
}

#[derive(Args, Clone)]
struct RunArgs {
    #[command(flatten)]
    scope: ScopeArgs,

    /// Override the scan page size
    #[arg(long, env = "BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Override attempts per document write
    #[arg(long, env = "MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Replace sensitive fields with synthetic values
    #[arg(long, env = "SANITIZE")]
    sanitize: bool,

    /// Override number of collections migrated concurrently
    #[arg(long, env = "WORKERS")]
    workers: Option<usize>,

    /// Skip the post-migration count check
    #[arg(long)]
    no_verify: bool,

    /// Where to write the JSON summary report
    #[arg(long, default_value = "migration_summary.json")]
    summary: PathBuf,
}

impl ScopeArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(ref database) = self.database {
            config.migration.database = Some(database.clone());
        }
        if let Some(ref container) = self.container {
            config.migration.container = Some(container.clone());
        }
        if let Some(ref path) = self.source_path {
            config.source.path = Some(path.clone());
        }
        if let Some(ref path) = self.target_path {
            config.target.path = Some(path.clone());
        }
    }
}

impl RunArgs {
    fn apply(&self, config: &mut Config) {
        self.scope.apply(config);
        if let Some(batch_size) = self.batch_size {
            config.migration.batch_size = batch_size;
        }
        if let Some(max_retries) = self.max_retries {
            config.migration.max_retries = max_retries;
        }
        if self.sanitize {
            config.migration.sanitize = true;
        }
        if let Some(workers) = self.workers {
            config.migration.workers = workers;
        }
        if self.no_verify {
            config.migration.verify = false;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    // Overrides are applied before validation so env/flags can fill gaps in the file
    let mut config = Config::load_unchecked(&cli.config)?;
    match cli.command {
        Commands::Run(ref args) | Commands::Resume(ref args) => args.apply(&mut config),
        Commands::Validate(ref scope) => scope.apply(&mut config),
        Commands::HealthCheck => {}
    }
    config.validate()?;
    info!("Loaded configuration from {:?}", cli.config);

    // Setup signal handling for graceful shutdown (SIGINT and SIGTERM)
    let cancel_token = setup_signal_handler(cli.shutdown_timeout)?;

    match cli.command {
        Commands::Run(ref args) => {
            let mut orchestrator = Orchestrator::new(config)?;

            if let Some(ref path) = cli.state_file {
                orchestrator = orchestrator.with_state_file(path.clone());
            }

            let report = execute(&cli, orchestrator, cancel_token).await?;
            finish(&cli, &report, &args.summary, "Migration")
        }

        Commands::Resume(ref args) => {
            // State file is required for resume
            let state_file = cli.state_file.clone().ok_or_else(|| {
                MigrateError::Config("--state-file is required for resume".to_string())
            })?;

            if !state_file.exists() {
                return Err(MigrateError::Config(format!(
                    "State file not found: {:?}",
                    state_file
                )));
            }

            let orchestrator = Orchestrator::new(config)?
                .with_state_file(state_file)
                .resume()?;

            info!("Resuming from previous state");

            let report = execute(&cli, orchestrator, cancel_token).await?;
            finish(&cli, &report, &args.summary, "Resumed migration")
        }

        Commands::Validate(_) => {
            let orchestrator = Orchestrator::new(config)?;
            let results = orchestrator.validate().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!("Validation Results:");
                for (name, result) in &results {
                    println!(
                        "  {} {} (source: {}, target: {})",
                        if result.matched { "OK  " } else { "DIFF" },
                        name,
                        result.source_count,
                        result.target_count
                    );
                    if let Some(ref err) = result.error {
                        println!("    Error: {}", err);
                    }
                }
            }

            let mismatched: Vec<&String> = results
                .iter()
                .filter(|(_, r)| !r.matched)
                .map(|(name, _)| name)
                .collect();
            if !mismatched.is_empty() {
                return Err(MigrateError::transfer(
                    mismatched
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                    "document counts differ",
                ));
            }
            println!("Validation completed successfully");
            Ok(())
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config)?;
            let result = orchestrator.health_check().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source ({}): {} ({}ms)",
                    orchestrator.source().name(),
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target ({}): {} ({}ms)",
                    orchestrator.target().name(),
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                let (store, message) = match result.source_error {
                    Some(e) => (orchestrator.source().name().to_string(), e),
                    None => (
                        orchestrator.target().name().to_string(),
                        result.target_error.unwrap_or_default(),
                    ),
                };
                return Err(MigrateError::connectivity(store, message));
            }
            Ok(())
        }
    }
}

/// Run the orchestrator with progress rendering. After cancellation the run
/// gets `shutdown_timeout` seconds to wind down before it is abandoned.
async fn execute(
    cli: &Cli,
    orchestrator: Orchestrator,
    cancel: CancellationToken,
) -> Result<MigrationReport, MigrateError> {
    let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
    let renderer = spawn_progress_renderer(rx, cli.progress);
    let orchestrator = orchestrator.with_progress(tx);

    let shutdown_timeout = Duration::from_secs(cli.shutdown_timeout);
    let watchdog = cancel.clone();
    let outcome = tokio::select! {
        result = orchestrator.run(cancel) => Some(result),
        _ = async {
            watchdog.cancelled().await;
            tokio::time::sleep(shutdown_timeout).await;
        } => None,
    };

    match outcome {
        Some(result) => {
            // Every sender clone is dropped once the run returns
            if let Err(e) = renderer.await {
                warn!("Progress renderer stopped: {}", e);
            }
            result
        }
        None => {
            renderer.abort();
            warn!("Shutdown timeout of {}s exceeded, abandoning run", cli.shutdown_timeout);
            Err(MigrateError::Cancelled)
        }
    }
}

/// Print the report, write the summary file, and map the run status to an
/// exit code.
fn finish(
    cli: &Cli,
    report: &MigrationReport,
    summary: &Path,
    label: &str,
) -> Result<(), MigrateError> {
    report.save(summary)?;
    info!("Summary written to {:?}", summary);

    if cli.output_json {
        println!("{}", report.to_json()?);
    } else {
        println!("\n{} {}!", label, report.status.as_str());
        println!("  Run ID: {}", report.run_id);
        println!("  Duration: {:.2}s", report.duration_seconds);
        println!(
            "  Collections: {}/{}",
            report.collections_total - report.collections_failed,
            report.collections_total
        );
        println!(
            "  Documents: {} inserted, {} updated, {} skipped, {} errors",
            report.inserted, report.updated, report.skipped, report.errors
        );
        for collection in report.collections() {
            if let Some(ref err) = collection.error {
                println!("  Failed {}: {}", collection.collection, err);
            }
        }
        println!("  Summary: {}", summary.display());
    }

    match report.status {
        RunStatus::Completed => Ok(()),
        RunStatus::Cancelled => Err(MigrateError::Cancelled),
        RunStatus::Failed | RunStatus::Running => Err(MigrateError::transfer(
            report.run_id.clone(),
            format!("{} collection(s) failed", report.collections_failed),
        )),
    }
}

/// Consume progress updates until every sender is dropped, either as JSON
/// lines on stderr or as one progress bar per collection.
fn spawn_progress_renderer(
    mut rx: mpsc::Receiver<ProgressUpdate>,
    json_lines: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if json_lines {
            while let Some(update) = rx.recv().await {
                if let Ok(line) = serde_json::to_string(&update) {
                    eprintln!("{}", line);
                }
            }
            return;
        }

        let multi = MultiProgress::new();
        let mut bars: HashMap<String, ProgressBar> = HashMap::new();
        while let Some(update) = rx.recv().await {
            let bar = bars
                .entry(update.collection.clone())
                .or_insert_with(|| multi.add(create_progress_bar(&update.collection)));
            if update.total > 0 {
                bar.set_length(update.total);
            }
            bar.set_position(update.processed);
            match update.stage {
                ProgressStage::Completed => bar.finish_with_message("done"),
                ProgressStage::Failed => bar.abandon_with_message("failed"),
                ProgressStage::Verifying => bar.set_message("verifying"),
                ProgressStage::Preparing | ProgressStage::Transferring => {}
            }
        }
        for bar in bars.values() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    })
}

fn create_progress_bar(collection: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:.bold} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_prefix(collection.to_string());
    pb
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler(shutdown_timeout: u64) -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token_int = cancel_token.clone();
    tokio::spawn(async move {
        sigint.recv().await;
        eprintln!("\nReceived SIGINT. Shutting down gracefully (timeout: {}s)...", shutdown_timeout);
        token_int.cancel();
    });

    let token_term = cancel_token.clone();
    tokio::spawn(async move {
        sigterm.recv().await;
        eprintln!("\nReceived SIGTERM. Shutting down gracefully (timeout: {}s)...", shutdown_timeout);
        token_term.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler(shutdown_timeout: u64) -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Shutting down gracefully (timeout: {}s)...", shutdown_timeout);
            token.cancel();
        }
    });

    Ok(cancel_token)
}
