//! guardian CLI: user-facing binary for the parental-control agent.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use guardian_daemon::{setup, Config, Coordinator, CoordinatorEvent, IdentityStore};
use guardian_protocol::{HttpServerApi, SocketIoChannel};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "guardian",
    about = "Screen-time countdown and quiz agent",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the agent.
    Start {
        /// Path to configuration file.
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Print this device's identifier, creating it on first use.
    Identity,

    /// Validate and list the configured questionnaire.
    Quiz {
        /// Path to configuration file.
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Log to stderr for the short-lived commands.
fn init_stderr_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr)
        .init();
}

/// Log to a file while the terminal surface owns the screen.
fn init_file_logging(level: &str) -> anyhow::Result<std::path::PathBuf> {
    let path = setup::log_file_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .init();
    Ok(path)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config } => {
            // The log level comes from the config, so the subscriber is not up
            // yet while it loads; report where it came from once logging runs.
            let config_path = setup::resolve_config_path(config.as_deref());
            let config = setup::load_config(config.as_deref())?;
            let log_path = init_file_logging(&config.daemon.log_level)?;
            eprintln!("guardian: logging to {}", log_path.display());
            tracing::info!(
                path = %config_path.display(),
                found = config_path.exists(),
                log_level = %config.daemon.log_level,
                "configuration loaded"
            );

            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_agent(config))?;
        }
        Commands::Identity => {
            init_stderr_logging("warn");
            let store = IdentityStore::new(&setup::config_dir());
            let identity = store.get_or_create();
            println!("{identity}");
        }
        Commands::Quiz { config } => {
            init_stderr_logging("warn");
            let config = setup::load_config(config.as_deref())?;
            let questionnaire = setup::load_questionnaire(&config.quiz)?;
            println!("{} question(s)", questionnaire.len());
            for (i, question) in questionnaire.questions().iter().enumerate() {
                println!("{}. {}", i + 1, question.text);
                for (j, option) in question.options.iter().enumerate() {
                    let marker = if j == question.correct_index { "*" } else { " " };
                    println!("   {marker} {option}");
                }
            }
        }
    }

    Ok(())
}

async fn run_agent(config: Config) -> anyhow::Result<()> {
    let questionnaire = setup::load_questionnaire(&config.quiz)?;
    let identity = IdentityStore::new(&setup::config_dir()).get_or_create();

    let api = HttpServerApi::new(&config.server.api_options())?;
    let channel = SocketIoChannel::new(config.channel.channel_options(&config.server))?;
    let surface = build_surface()?;

    tracing::info!(
        id = %identity,
        server = %config.server.url,
        endpoint = %channel.endpoint(),
        "starting guardian agent"
    );

    let mut coordinator = Coordinator::new(
        identity,
        questionnaire,
        Box::new(channel),
        Arc::new(api),
        surface,
        config.server.request_timeout(),
    );
    spawn_signal_handler(coordinator.event_sender());

    coordinator.run().await?;
    Ok(())
}

#[cfg(feature = "terminal")]
#[allow(clippy::unnecessary_wraps)]
fn build_surface() -> anyhow::Result<Box<dyn guardian_surface::HostSurface>> {
    Ok(Box::new(guardian_surface::terminal::TerminalSurface::new()))
}

#[cfg(not(feature = "terminal"))]
fn build_surface() -> anyhow::Result<Box<dyn guardian_surface::HostSurface>> {
    anyhow::bail!("guardian was built without a host surface; enable the `terminal` feature")
}

/// Translate SIGINT/SIGTERM into a coordinator shutdown.
fn spawn_signal_handler(events: mpsc::Sender<CoordinatorEvent>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("termination signal received");
        let _ = events.send(CoordinatorEvent::Shutdown).await;
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
