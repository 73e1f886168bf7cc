//! claw-logmon - Clawbernetes log monitor agent
//!
//! Follows log files named by pushed configuration, aggregates the JSON
//! fragments found in matching lines, and serves the results for Prometheus.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use claw_logmon_agent::{AgentConfig, AgentServer};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "claw-logmon")]
#[command(about = "Clawbernetes log monitor agent")]
#[command(version)]
struct Cli {
    /// Log output format
    #[arg(
        long,
        global = true,
        value_enum,
        env = "LOGMON_LOG_FORMAT",
        default_value_t = LogFormat::Text
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent
    Run {
        /// Path to config file
        #[arg(short, long, default_value = "/etc/claw-logmon/config.toml")]
        config: PathBuf,
    },

    /// Generate a default config file
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "/etc/claw-logmon/config.toml")]
        output: PathBuf,
    },

    /// Validate a config file
    CheckConfig {
        /// Path to config file
        #[arg(short, long, default_value = "/etc/claw-logmon/config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    match cli.command {
        Commands::Run { config } => {
            run_agent(&config).await?;
        }

        Commands::InitConfig { output } => {
            init_config(&output)?;
        }

        Commands::CheckConfig { config } => {
            check_config(&config)?;
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("claw_logmon=info".parse()?)
        .add_directive("claw_logmon_agent=info".parse()?);

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }
    Ok(())
}

async fn run_agent(config_path: &Path) -> anyhow::Result<()> {
    info!(config = %config_path.display(), "starting claw-logmon");

    let config = AgentConfig::load(config_path)?;
    info!(
        listen = %config.listen_addr,
        state = %config.state_path.display(),
        interval_secs = config.aggregation_interval_secs,
        "loaded config"
    );

    let server = AgentServer::new(config);
    server.run(shutdown_signal()).await?;

    info!("claw-logmon stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

fn init_config(output: &Path) -> anyhow::Result<()> {
    let rendered = AgentConfig::default().to_toml()?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, rendered)?;

    println!("Config written to {}", output.display());
    Ok(())
}

fn check_config(config_path: &Path) -> anyhow::Result<()> {
    let config = AgentConfig::from_file(config_path)?;

    println!("Config OK: {}", config_path.display());
    println!("  listen_addr: {}", config.listen_addr);
    println!("  state_path: {}", config.state_path.display());
    println!("  aggregation_interval_secs: {}", config.aggregation_interval_secs);
    println!("  queue_capacity: {}", config.queue_capacity);
    Ok(())
}
