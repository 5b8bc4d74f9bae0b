use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod api;
mod commands;
mod config;
mod deploy;

use commands::deploy::DeployArgs;
use deploy::Overrides;

#[derive(Parser)]
#[command(name = "ids", about = "IDS CLI - Deploy and inspect IDS agents")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the agent image and install it on a device over SSH
    Deploy {
        /// Configuration file
        #[arg(short, long, default_value = "config.toml", env = "IDS_CONFIG")]
        config: PathBuf,

        /// Secrets file (defaults to secret.json next to the config)
        #[arg(short, long, env = "IDS_SECRETS")]
        secrets: Option<PathBuf>,

        /// Device hostname or IP
        #[arg(long)]
        host: Option<String>,

        /// SSH port
        #[arg(short, long)]
        port: Option<u16>,

        /// SSH user
        #[arg(short, long)]
        user: Option<String>,

        /// SSH private key
        #[arg(long)]
        ssh_key: Option<PathBuf>,

        /// Image tag to build and ship
        #[arg(short = 't', long)]
        image_tag: Option<String>,

        /// Print the plan without running anything
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the status published by an agent
    Status {
        /// Agent URL (default: agent_url from ~/.ids/config.toml)
        #[arg(long)]
        url: Option<String>,

        /// Number of recent level changes to show
        #[arg(short = 'n', long, default_value = "5")]
        transitions: usize,

        /// Print the raw status JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Deploy {
            config,
            secrets,
            host,
            port,
            user,
            ssh_key,
            image_tag,
            dry_run,
            yes,
            verbose,
        } => {
            commands::deploy::run(DeployArgs {
                config,
                secrets,
                overrides: Overrides {
                    host,
                    port,
                    user,
                    ssh_key,
                    image_tag,
                    verbose,
                },
                dry_run,
                yes,
            })
            .await
        }
        Commands::Status {
            url,
            transitions,
            json,
        } => commands::status::run(url, transitions, json).await,
    }
}
