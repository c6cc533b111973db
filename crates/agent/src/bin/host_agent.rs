//! host-agent - registers this host with the management server and keeps
//! its components running.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use host_agent::{
    detect_hostname, read_agent_version, AgentConfig, Collaborators, CommandRunner, Controller,
    ExitHelper, HostRegister, HttpTransport, InMemoryActionQueue, LogFormat,
};
use recovery::{RecoveryManager, SystemClock};

#[derive(Parser)]
#[command(name = "host-agent")]
#[command(about = "Register with the management server and run its commands", version)]
struct Cli {
    /// Configuration file. Built-in defaults are used when omitted.
    #[arg(long, env = "HOST_AGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level, overriding the configuration file (`RUST_LOG` wins over both).
    #[arg(long)]
    log_level: Option<String>,

    /// Log format, overriding the configuration file.
    #[arg(long, value_parser = ["text", "json"])]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register and heartbeat until stopped.
    Run,

    /// Print the effective configuration as TOML.
    ShowConfig,
}

fn load_config(path: Option<&PathBuf>) -> Result<AgentConfig> {
    match path {
        Some(path) => AgentConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(AgentConfig::default()),
    }
}

fn init_tracing(config: &AgentConfig, level: Option<&str>, format: Option<&str>) {
    let level = level.unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("host_agent={level},recovery={level},warn")));

    let json = match format {
        Some(format) => format == "json",
        None => config.logging.format == LogFormat::Json,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .init();
}

async fn run(config: AgentConfig) -> Result<()> {
    let hostname = detect_hostname(config.agent.hostname.as_deref());
    let agent_version = read_agent_version(&config.agent.prefix).unwrap_or_else(|e| {
        warn!(error = %e, "Agent version file unreadable, using the build version");
        env!("CARGO_PKG_VERSION").to_string()
    });
    info!(%hostname, %agent_version, server = %config.server_base_url(), "Starting host agent");

    let cancel = CancellationToken::new();
    let recovery = Arc::new(Mutex::new(
        RecoveryManager::with_config(Arc::new(SystemClock), config.recovery.to_update())
            .with_stale_interval(config.recovery.stale_command_interval_secs),
    ));
    let queue = Arc::new(InMemoryActionQueue::new());
    let transport = HttpTransport::new(config.request_timeout(), config.server.ca_cert.as_deref())
        .context("Failed to create HTTP transport")?;

    let runner = CommandRunner::new(
        queue.clone(),
        recovery.clone(),
        config.agent.command_script.clone(),
        Duration::from_secs(config.agent.command_timeout_secs),
    );
    let runner_task = tokio::spawn(runner.run(cancel.clone()));

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
                cancel.cancel();
            }
        }
    });

    let register = HostRegister::new(
        hostname.clone(),
        config.agent.current_ping_port,
        agent_version,
        &config.agent.prefix,
    );
    let mut controller = Controller::new(
        config,
        hostname,
        Collaborators {
            transport: Arc::new(transport),
            queue,
            register: Box::new(register),
            exit: Box::new(ExitHelper),
            recovery,
        },
        cancel.clone(),
    );

    let result = controller.run().await;
    cancel.cancel();
    runner_task.await.context("Command runner failed")?;
    result.context("Agent stopped")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Run => {
            init_tracing(&config, cli.log_level.as_deref(), cli.log_format.as_deref());
            run(config).await
        }
        Commands::ShowConfig => {
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{rendered}");
            Ok(())
        }
    }
}
