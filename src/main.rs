use clap::{Parser, Subcommand};
use crossterm::style::Stylize;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use uxray_stream::config::ClientConfig;
use uxray_stream::model::{ReconciledState, ResultFilter};
use uxray_stream::reconcile::replay;
use uxray_stream::runner::RunReport;
use uxray_stream::session::AnalysisSession;
use uxray_stream::transport::{build_http_client, check_health};

/// Log filter used when `RUST_LOG` is not set
const DEFAULT_LOG_FILTER: &str = "uxray_stream=warn,uxray=info";

/// Default read size when replaying a recorded stream
const DEFAULT_REPLAY_CHUNK: usize = 4096;

/// UXRay - stream and reconcile page analyses from the command line
#[derive(Parser, Debug)]
#[command(
    name = "uxray",
    about = "Streaming client for the UXRay page-analysis service",
    after_help = "ENVIRONMENT VARIABLES:\n\
        UXRAY_API_BASE_URL     Analysis service base URL\n\
        UXRAY_ANALYZE_PATH     Analysis endpoint path\n\
        UXRAY_CONNECT_TIMEOUT  Connection timeout (seconds)\n\
        UXRAY_DEADLINE         Whole-run deadline (seconds)\n\
        RUST_LOG               Log filter (default: uxray_stream=warn)"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a page, printing progress as it streams in
    Analyze {
        /// URL of the page to analyze
        url: String,

        /// Analysis service base URL (default: from environment)
        #[arg(long)]
        api_base: Option<String>,

        /// Abort the run after this many seconds
        #[arg(long)]
        deadline: Option<u64>,

        /// Which execution steps to list: all, successful, failed
        #[arg(long, short = 'f', default_value = "all")]
        filter: ResultFilter,

        /// Output the final report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay a recorded event-stream body through the reconciler
    Replay {
        /// File containing the raw `text/event-stream` body
        file: PathBuf,

        /// Bytes fed to the decoder per chunk
        #[arg(long, default_value_t = DEFAULT_REPLAY_CHUNK)]
        chunk_size: usize,

        /// Which execution steps to list: all, successful, failed
        #[arg(long, short = 'f', default_value = "all")]
        filter: ResultFilter,

        /// Output the final report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check whether the analysis service is reachable
    Health {
        /// Analysis service base URL (default: from environment)
        #[arg(long)]
        api_base: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Some(Commands::Analyze {
            url,
            api_base,
            deadline,
            filter,
            json,
        }) => {
            let mut config = ClientConfig::default();
            if let Some(base) = api_base {
                config.base_url = base;
            }
            if let Some(secs) = deadline {
                config.deadline = Some(Duration::from_secs(secs));
            }

            if !json {
                println!("Analyzing {} via {}", url, config.analyze_url());
            }

            let session = Arc::new(AnalysisSession::new(config)?);
            let mut updates = session.subscribe();
            let mut handle = session.start(&url);
            let mut printed = 0;

            let result = loop {
                tokio::select! {
                    result = &mut handle => break result?,
                    changed = updates.changed() => {
                        if changed.is_ok() && !json {
                            let state = updates.borrow_and_update().clone();
                            printed = print_progress(&state, printed);
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        eprintln!("Interrupted, cancelling analysis...");
                        session.cancel();
                    }
                }
            };

            let state = session.snapshot();
            if !json {
                print_progress(&state, printed);
            }
            print_report(&RunReport::from_state(&state, filter), json)?;

            result?;
        }

        Some(Commands::Replay {
            file,
            chunk_size,
            filter,
            json,
        }) => {
            let body = std::fs::read(&file)?;
            let result = replay(body.chunks(chunk_size.max(1)));

            if !json {
                println!("Replayed {} ({} bytes)", file.display(), body.len());
                print_progress(&result.state, 0);
            }
            print_report(&RunReport::from_state(&result.state, filter), json)?;

            result.outcome?;
        }

        Some(Commands::Health { api_base }) => {
            let mut config = ClientConfig::default();
            if let Some(base) = api_base {
                config.base_url = base;
            }
            let client = build_http_client(&config)?;

            if check_health(&client, &config.base_url).await? {
                println!("{} {}", "reachable".green(), config.base_url);
            } else {
                println!("{} {}", "unreachable".red(), config.base_url);
                return Err(format!("Analysis service not responding at {}", config.base_url).into());
            }
        }

        None => {
            println!("UXRay - streaming client for the UXRay page-analysis service");
            println!();
            println!("Usage: uxray <COMMAND>");
            println!();
            println!("Commands:");
            println!("  analyze  Analyze a page, printing progress as it streams in");
            println!("  replay   Replay a recorded event-stream body through the reconciler");
            println!("  health   Check whether the analysis service is reachable");
            println!();
            println!("Run with --help for more information.");
        }
    }

    Ok(())
}

/// Print progress log lines not printed yet; returns the new count
fn print_progress(state: &ReconciledState, printed: usize) -> usize {
    for message in state.progress_log.iter().skip(printed) {
        println!("[{:>3.0}%] {}", state.progress_percent, message);
    }
    if let Some(current) = &state.current_execution {
        println!("       {}", current.describe().dark_grey());
    }
    state.progress_log.len().max(printed)
}

fn print_report(report: &RunReport, json: bool) -> Result<(), Box<dyn Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!();
    match (&report.error, &report.message) {
        (Some(error), _) => println!("{} {}", "Failed:".red().bold(), error),
        (None, Some(message)) => println!("{} {}", "Done:".green().bold(), message),
        (None, None) => println!(
            "{} stream ended without a final result",
            "Partial:".yellow().bold()
        ),
    }

    let summary = &report.execution_summary;
    println!(
        "Progress {:.0}%  |  total {}  attempted {}  successful {}  failed {}",
        report.progress_percent, summary.total, summary.attempted, summary.successful, summary.failed
    );

    if report.execution_results.is_empty() {
        if report.filter != ResultFilter::All.to_string() {
            println!("No {} execution results found", report.filter);
        }
        return Ok(());
    }

    println!();
    println!("Execution timeline ({}):", report.filter);
    for (index, record) in report.execution_results.iter().enumerate() {
        let step = record.step.map(|s| s as usize).unwrap_or(index + 1);
        let status = match record.succeeded() {
            Some(true) => "ok".green(),
            Some(false) => "failed".red(),
            None => "pending".dark_grey(),
        };
        let camera = if record.screenshot.is_some() { " [screenshot]" } else { "" };
        println!(
            "  {:>3}. {:<8} {:<8} \"{}\"{}",
            step,
            status,
            record.action_label().unwrap_or("N/A"),
            record.element_label(),
            camera
        );
        if let Some(error) = record.execution.as_ref().and_then(|e| e.error.as_deref()) {
            println!("       {}", error.red());
        }
    }

    Ok(())
}
