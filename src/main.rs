//! SAN Provisioner
//!
//! Command-line entry point: loads the configuration, wires the storage
//! controller and host agent for the configured vendor and host type, and
//! runs one provisioning pass.

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use san_provisioner::config::validate_credentials;
use san_provisioner::{
    AutomationOrchestrator, Config, ConfigManager, ConfigOverrides, ControllerFactory,
    FilesystemType, HostFactory, OrchestratorConfig, RaidLevel,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// SAN Provisioner - RAID, volume, host mount and benchmark in one run
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (.json, .yaml or .yml)
    #[arg(long, short, env = "SAN_CONFIG", default_value = "config.json", global = true)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    /// Also append plain-text logs to this file
    #[arg(long, env = "LOG_FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full provisioning pass (default)
    Run(RunArgs),
    /// Check the configuration file and report weak credentials
    Validate,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Per-run overrides for the loaded configuration
#[derive(ClapArgs, Debug, Default)]
struct RunArgs {
    #[arg(long)]
    san_ip: Option<String>,

    #[arg(long)]
    host_ip: Option<String>,

    /// RAID level (0, 1, 5, 6, 10)
    #[arg(long)]
    raid_level: Option<RaidLevel>,

    #[arg(long)]
    volume_size_gb: Option<u64>,

    #[arg(long)]
    volume_name: Option<String>,

    #[arg(long)]
    mount_point: Option<String>,

    /// Performance test duration in seconds
    #[arg(long)]
    test_duration: Option<u64>,

    /// Filesystem to create (ext4, xfs, btrfs)
    #[arg(long)]
    filesystem: Option<FilesystemType>,
}

impl From<RunArgs> for ConfigOverrides {
    fn from(args: RunArgs) -> Self {
        Self {
            san_ip: args.san_ip,
            host_ip: args.host_ip,
            raid_level: args.raid_level,
            volume_size_gb: args.volume_size_gb,
            volume_name: args.volume_name,
            mount_point: args.mount_point,
            test_duration: args.test_duration,
            filesystem: args.filesystem,
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    info!("Starting SAN Provisioner {}", san_provisioner::VERSION);

    let manager = ConfigManager::new(&args.config);

    match args.command.unwrap_or_else(|| Command::Run(RunArgs::default())) {
        Command::Run(run_args) => run(&manager, run_args.into()).await,
        Command::Validate => validate(&manager),
        Command::Init { force } => init(&manager, force),
    }
}

async fn run(manager: &ConfigManager, overrides: ConfigOverrides) -> anyhow::Result<()> {
    let config = manager.update(&overrides)?;
    warn_weak_credentials(&config);

    info!("  SAN: {} ({})", config.san_ip, config.vendor_type);
    info!("  Host: {} ({})", config.host_ip, config.host_type);
    info!(
        "  Volume: {} ({} GB, RAID {}) at {}",
        config.volume_name, config.volume_size_gb, config.raid_level, config.mount_point
    );

    let controller = ControllerFactory::create(&config.vendor_type, &config)?;
    let host = HostFactory::create(&config.host_type, &config)?;

    let mut orchestrator =
        AutomationOrchestrator::new(controller, host, OrchestratorConfig::from(&config));
    let report = orchestrator.run().await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.success {
        info!("Provisioning completed successfully");
        Ok(())
    } else {
        error!("Provisioning did not complete");
        std::process::exit(1);
    }
}

fn validate(manager: &ConfigManager) -> anyhow::Result<()> {
    let config = manager
        .load()
        .with_context(|| format!("invalid configuration in {}", manager.path().display()))?;
    warn_weak_credentials(&config);
    info!("Configuration {} is valid", manager.path().display());
    Ok(())
}

fn init(manager: &ConfigManager, force: bool) -> anyhow::Result<()> {
    if manager.path().exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            manager.path().display()
        );
    }
    manager.save(&Config::default())?;
    Ok(())
}

fn warn_weak_credentials(config: &Config) {
    let accounts = [
        ("storage controller", &config.san_username, &config.san_password),
        ("host", &config.host_username, &config.host_password),
    ];
    for (system, username, password) in accounts {
        if let Err(reason) = validate_credentials(username, password) {
            warn!("Weak {} credentials: {}", system, reason);
        }
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=info".parse()?);

    let file_layer = match &args.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}
