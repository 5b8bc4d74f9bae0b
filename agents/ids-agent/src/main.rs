//! IDS Agent CLI Entry Point
//!
//! This is the main entry point for the IDS device agent binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ids_agent::agent::context::ComponentContext;
use ids_agent::agent::metrics::{MetricsSource, SystemMetrics};
use ids_agent::agent::state::StateStore;
use ids_agent::agent::supervisor::ResourceSupervisor;
use ids_agent::agent::throttle::classify;
use ids_agent::config::ConfigStore;
use ids_agent::runtime::adapter::RuntimeAdapter;
use ids_agent::runtime::docker::adapter::DockerAdapter;
use ids_agent::runtime::probe::RuntimeProbe;
use ids_agent::{api, logging, Settings};

#[derive(Parser)]
#[command(name = "ids-agent")]
#[command(author, version, about = "IDS Agent - Resource supervisor for the IDS device")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "IDS_CONFIG")]
    config: PathBuf,

    /// Path to the JSON secrets file (defaults to secret.json next to the config)
    #[arg(short, long, env = "IDS_SECRETS")]
    secrets: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the agent
    Start,
    /// Take one resource sample and show the level the agent would publish
    Status,
    /// Print the systemd unit for the agent
    Install {
        /// Service name
        #[arg(short, long, default_value = "ids-agent")]
        name: String,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            let store = load_config(&cli.config, cli.secrets.as_deref())?;
            logging::init(&store.settings().logging, cli.verbose)?;
            start_agent(store.settings()).await?;
        }
        Commands::Status => {
            let store = load_config(&cli.config, cli.secrets.as_deref())?;
            show_status(store.settings()).await?;
        }
        Commands::Install { name } => {
            install_service(&name, &cli.config);
        }
        Commands::Version => {
            show_version();
        }
    }

    Ok(())
}

fn load_config(config: &Path, secrets: Option<&Path>) -> Result<ConfigStore> {
    let secrets = secrets
        .map(Path::to_path_buf)
        .or_else(|| ConfigStore::sibling_secrets(config));

    ConfigStore::load(config, secrets.as_deref())
        .with_context(|| format!("Failed to load configuration from {}", config.display()))
}

async fn start_agent(settings: &Settings) -> Result<()> {
    info!("Starting IDS Agent...");

    let thresholds = settings
        .resources
        .thresholds()
        .context("Invalid resource thresholds")?;

    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    let state = StateStore::new(hostname);
    let shutdown = CancellationToken::new();

    let supervisor = ResourceSupervisor::new(
        ComponentContext::new("resource_supervisor", state.clone(), shutdown.clone()),
        SystemMetrics::new(),
        thresholds,
    )
    .with_interval(settings.resources.check_interval());

    let mut tasks = vec![tokio::spawn(supervisor.run())];

    match connect_runtime(settings) {
        Ok(runtime) => {
            let probe = RuntimeProbe::new(
                ComponentContext::new("runtime_probe", state.clone(), shutdown.clone()),
                runtime,
                settings.resources.probe_interval(),
            )
            .with_project(settings.runtime.compose_project.clone());
            tasks.push(tokio::spawn(probe.run()));
        }
        Err(e) => {
            // Keep supervising even without a reachable daemon.
            ComponentContext::new("runtime_probe", state.clone(), shutdown.clone())
                .record_error(format!("{:#}", e));
        }
    }

    if settings.api.enabled {
        let addr: SocketAddr = format!("{}:{}", settings.api.host, settings.api.port)
            .parse()
            .context("Invalid API listen address")?;
        let api_state = state.clone();
        let api_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = api::serve(addr, api_state, api_shutdown).await {
                warn!(error = %e, "Status API exited");
            }
        }));
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");
    shutdown.cancel();

    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "Component task failed");
        }
    }

    info!("IDS Agent stopped");
    Ok(())
}

fn connect_runtime(settings: &Settings) -> Result<Arc<DockerAdapter>> {
    let docker = DockerAdapter::connect(settings.runtime.docker_socket.as_deref())?;
    Ok(Arc::new(docker))
}

async fn show_status(settings: &Settings) -> Result<()> {
    println!("Agent Status: sampling...");

    let thresholds = settings
        .resources
        .thresholds()
        .context("Invalid resource thresholds")?;

    let mut metrics = SystemMetrics::new();
    // CPU usage needs two refreshes spaced apart.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    let sample = metrics.sample()?;
    let level = classify(&sample, &thresholds);

    println!("  CPU: {:.1}%", sample.cpu_percent);
    println!("  RAM: {:.1}%", sample.ram_percent);
    println!("  Throttling level: {} ({})", level.as_u8(), level);
    println!(
        "  Limits: cpu {}/{}/{}  ram {}/{}/{}",
        thresholds.cpu.base,
        thresholds.cpu.medium,
        thresholds.cpu.high,
        thresholds.ram.base,
        thresholds.ram.medium,
        thresholds.ram.high
    );

    match connect_runtime(settings) {
        Ok(docker) => match docker.version().await {
            Ok(version) => {
                println!("  Docker: {} (connected)", version);
                let project = settings.runtime.compose_project.as_deref();
                if let Ok(stack) = docker.stack(project).await {
                    println!(
                        "  Stack: {}/{} running",
                        stack.running(),
                        stack.members.len()
                    );
                }
            }
            Err(e) => println!("  Docker: error - {}", e),
        },
        Err(e) => println!("  Docker: not available - {}", e),
    }

    Ok(())
}

fn install_service(name: &str, config: &Path) {
    println!("Installing service: {}", name);

    let service_content = format!(
        r#"[Unit]
Description=IDS Agent
After=network.target docker.service
Wants=docker.service

[Service]
Type=simple
ExecStart=/usr/local/bin/ids-agent --config {} start
Restart=always
RestartSec=5
User=root
Environment=RUST_LOG=info

[Install]
WantedBy=multi-user.target
"#,
        config.display()
    );

    let service_path = format!("/etc/systemd/system/{}.service", name);
    println!("Service file would be created at: {}", service_path);
    println!("\nService content:");
    println!("{}", service_content);
    println!("\nTo install manually, run:");
    println!("  sudo cp ids-agent /usr/local/bin/");
    println!("  sudo nano {}", service_path);
    println!("  sudo systemctl daemon-reload");
    println!("  sudo systemctl enable {}", name);
    println!("  sudo systemctl start {}", name);
}

fn show_version() {
    println!("ids-agent {}", env!("CARGO_PKG_VERSION"));
    println!("Resource supervisor for the IDS device");
    println!();
    println!("Features:");
    println!("  - CPU/RAM throttling levels (0-3)");
    println!("  - Status API (/status, /health, /transitions)");
    println!("  - Docker runtime health probe");
}
