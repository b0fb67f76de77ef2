//! Mailguard
//!
//! Reviews outbound email drafts for compliance problems, fixes what it can
//! and reports a verdict, streaming every step of the review loop.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use mailguard_core::{EventSink, StreamEvent};
use mailguard_policy::ReviewRequest;
use mailguard_server::state::{build_engine, build_policy};
use mailguard_server::{create_router, AppState, ConfigOverrides, DecisionMode, RunClient, ServerConfig};
use metrics_exporter_prometheus::PrometheusHandle;
use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "mailguard")]
#[command(about = "Outbound email compliance guard", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "mailguard.yaml", env = "MAILGUARD_CONFIG", global = true)]
    config: PathBuf,

    /// Directory of policy documents
    #[arg(long, global = true)]
    policy_dir: Option<PathBuf>,

    /// Decision policy driving the loop
    #[arg(long, value_enum, global = true)]
    decision: Option<DecisionMode>,

    /// Rewrites allowed before a run stops for manual review
    #[arg(long, global = true)]
    max_iterations: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Listen address
        #[arg(short = 'l', long)]
        listen: Option<String>,

        /// Listen port
        #[arg(short = 'P', long)]
        port: Option<u16>,
    },

    /// Review one draft in-process and print its events
    Review {
        /// Draft to review; stdin when omitted
        file: Option<PathBuf>,

        /// Goal given to the decision policy
        #[arg(long)]
        goal: Option<String>,
    },

    /// Submit a draft to a running server and print the streamed events
    Watch {
        /// Server base URL
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        url: String,

        /// Draft to review; stdin when omitted
        file: Option<PathBuf>,

        /// Goal given to the decision policy
        #[arg(long)]
        goal: Option<String>,
    },
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        let (listen, port) = match &self.command {
            Command::Serve { listen, port } => (listen.clone(), *port),
            _ => (None, None),
        };
        ConfigOverrides {
            listen,
            port,
            policy_dir: self.policy_dir.clone(),
            decision: self.decision,
            max_iterations: self.max_iterations,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let config = ServerConfig::load(&cli.config, &cli.overrides())?;
    info!(
        decision = ?config.decision,
        max_iterations = config.engine.max_iterations,
        "Configuration loaded"
    );

    match cli.command {
        Command::Serve { .. } => serve(config).await,
        Command::Review { file, goal } => review(config, read_draft(file)?, goal).await,
        Command::Watch { url, file, goal } => watch(&url, read_draft(file)?, goal).await,
    }
}

async fn serve(config: ServerConfig) -> Result<()> {
    let metrics_handle = init_metrics()?;
    let addr: SocketAddr = config.bind_address().parse()?;

    let state = AppState::new(config, metrics_handle)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Mailguard listening on http://{}", addr);

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Writes each event as one JSON line on stdout
struct StdoutSink;

#[async_trait]
impl EventSink for StdoutSink {
    async fn emit(&mut self, event: StreamEvent) -> mailguard_core::Result<()> {
        print_event(&event)
    }
}

fn print_event(event: &StreamEvent) -> mailguard_core::Result<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}

async fn review(config: ServerConfig, draft: String, goal: Option<String>) -> Result<()> {
    let policy = build_policy(&config)?;
    let engine = build_engine(&config, policy)?;

    let request = with_goal(ReviewRequest::new(draft), goal);
    match engine.run(&request, &mut StdoutSink).await {
        Ok(report) => {
            info!(
                verdict = report.verdict.as_str(),
                iterations = report.iterations,
                "Review finished"
            );
            Ok(())
        }
        Err(failure) => Err(failure).context("review failed"),
    }
}

async fn watch(url: &str, draft: String, goal: Option<String>) -> Result<()> {
    let client = RunClient::new(url, Duration::from_secs(10))?;
    let request = with_goal(ReviewRequest::new(draft), goal);

    let handled = client
        .stream_run(&request, |event| async move { print_event(&event) })
        .await?;

    info!(events = handled, "Stream finished");
    Ok(())
}

fn with_goal(request: ReviewRequest, goal: Option<String>) -> ReviewRequest {
    match goal {
        Some(goal) => request.with_goal(goal),
        None => request,
    }
}

fn read_draft(file: Option<PathBuf>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read draft from {}", path.display())),
        None => {
            let mut draft = String::new();
            std::io::stdin()
                .read_to_string(&mut draft)
                .context("failed to read draft from stdin")?;
            Ok(draft)
        }
    }
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging on stderr, leaving stdout for events
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("mailguard=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mailguard=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "mailguard_requests_total",
        "Total number of requests by endpoint"
    );
    metrics::describe_counter!("mailguard_runs_total", "Completed review runs by verdict");
    metrics::describe_histogram!("mailguard_iterations", "Iterations used per completed run");
    metrics::describe_histogram!("mailguard_decisions", "Policy decisions per completed run");
    metrics::describe_counter!("mailguard_errors_total", "Review runs that ended in an error, by kind");

    info!("Metrics exporter initialized");
    Ok(handle)
}
