// ABOUTME: CLI entry point for tracker-import
// ABOUTME: Parses commands, sets up logging and Ctrl+C handling, routes to the library

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracker_import::config::{SinkArgs, SyncArgs, TrackerArgs};
use tracker_import::sink::{init_schema, ClickHouseClient};
use tracker_import::watermark::{compose_query, resolve_query_window, HistoryDepth};
use tracker_import::{SyncConfig, SyncReport, SyncRunner};

#[derive(Parser)]
#[command(name = "tracker-import")]
#[command(about = "Incremental tracker issue and changelog import into ClickHouse", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one incremental sync: schema, watermark, issues, changelog, load
    Run {
        #[command(flatten)]
        tracker: TrackerArgs,
        #[command(flatten)]
        sink: SinkArgs,
        #[command(flatten)]
        sync: SyncArgs,
    },
    /// Create the issue, changelog and runs tables and the dedup views
    InitSchema {
        #[command(flatten)]
        sink: SinkArgs,
        /// Drop existing tables and views first (discards all synced history)
        #[arg(long)]
        drop_existing: bool,
    },
    /// Print the tracker query the next run would use
    Window {
        #[command(flatten)]
        sink: SinkArgs,
        /// History to import when the sink is empty, e.g. 30d, 12h, "6 months"
        #[arg(long, env = "TRACKER_INITIAL_HISTORY_DEPTH")]
        initial_history_depth: Option<HistoryDepth>,
        /// Extra tracker query conditions, combined with the sync window
        #[arg(long, env = "TRACKER_QUERY_TEXT")]
        query_filter: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log flag is used if RUST_LOG is not set
    // 3. Default to "info" if neither are provided
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Run {
            tracker,
            sink,
            sync,
        } => run(tracker, sink, sync).await,
        Commands::InitSchema {
            sink,
            drop_existing,
        } => {
            let config = sink.into_config().context("Invalid ClickHouse configuration")?;
            let client =
                ClickHouseClient::new(&config).context("Failed to create ClickHouse client")?;
            init_schema(&client, &config.schema_names(), drop_existing)
                .await
                .context("Failed to initialize schema")?;
            println!(
                "Schema ready in database '{}' ({}, {}, {})",
                config.database, config.issues_table, config.changelog_table, config.runs_table
            );
            Ok(())
        }
        Commands::Window {
            sink,
            initial_history_depth,
            query_filter,
        } => {
            let config = sink.into_config().context("Invalid ClickHouse configuration")?;
            let client =
                ClickHouseClient::new(&config).context("Failed to create ClickHouse client")?;
            let window = resolve_query_window(&client, &config.runs_table, initial_history_depth)
                .await
                .context("Failed to read watermark from ClickHouse")?;
            println!("{}", compose_query(&window, query_filter.as_deref()));
            Ok(())
        }
    }
}

async fn run(tracker: TrackerArgs, sink: SinkArgs, sync: SyncArgs) -> anyhow::Result<()> {
    let config = SyncConfig::from_args(tracker, sink, sync).context("Invalid configuration")?;
    tracing::debug!(?config, "configuration loaded");

    let runner = SyncRunner::new(&config).context("Failed to create API clients")?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);

    // Set up Ctrl+C handler
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received shutdown signal");
                let _ = shutdown_tx.send(());
            }
            Err(e) => tracing::warn!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    match runner.run(shutdown_rx).await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(failure) => {
            print_report(&failure.report);
            Err(anyhow::Error::new(failure))
        }
    }
}

fn print_report(report: &SyncReport) {
    println!();
    println!("========================================");
    println!("Sync summary");
    println!("========================================");
    if let Some(query) = &report.query {
        println!("  Query: {}", query);
    }
    println!("  Issues fetched: {}", report.issues_fetched);
    println!("  Changelog entries fetched: {}", report.changelog_entries);
    println!("  Issue rows loaded: {}", report.issue_rows_loaded);
    println!("  Changelog rows loaded: {}", report.changelog_rows_loaded);
    if !report.skipped_changelogs.is_empty() {
        println!(
            "  Skipped changelogs: {}",
            report.skipped_changelogs.join(", ")
        );
    }
    match &report.committed_watermark {
        Some(watermark) => println!("  Committed watermark: {}", watermark),
        None => println!("  Committed watermark: unchanged (next run repeats this window)"),
    }
    println!("  Duration: {}ms", report.duration_ms);
}
