use anyhow::Result;
use chrono::Utc;
use colored::{ColoredString, Colorize};

use ids_agent::agent::state::StatusSnapshot;
use ids_agent::agent::throttle::ThrottleLevel;

use crate::api::AgentClient;
use crate::config::Config;

/// Show the status published by an agent
pub async fn run(url: Option<String>, transitions: usize, json: bool) -> Result<()> {
    let config = Config::load()?;
    let base_url = url.unwrap_or_else(|| config.agent_url().to_string());
    let client = AgentClient::new(&base_url)?;

    let status = client.status().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }
    print_status(client.base_url(), &status);

    if transitions > 0 {
        let history = client.transitions(transitions).await?;
        println!();
        println!("{}", "Recent level changes".bold());
        if history.is_empty() {
            println!("  {}", "none".dimmed());
        }
        for transition in &history {
            println!(
                "  {}  {} → {}  (cpu {:.1}%, ram {:.1}%)",
                transition
                    .timestamp
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
                    .dimmed(),
                level_label(transition.from),
                level_label(transition.to),
                transition.cpu_usage,
                transition.ram_usage,
            );
        }
    }

    Ok(())
}

fn print_status(url: &str, status: &StatusSnapshot) {
    println!("{} {}", "Agent".bold(), url.dimmed());
    println!("{}", "─".repeat(50));
    println!("  {:<18} {}", "HOSTNAME".dimmed(), status.hostname);
    println!("  {:<18} {:.1}%", "CPU".dimmed(), status.cpu_usage);
    println!("  {:<18} {:.1}%", "RAM".dimmed(), status.ram_usage);
    println!(
        "  {:<18} {}",
        "THROTTLING".dimmed(),
        level_label(status.throttling_level)
    );

    let readiness = &status.readiness;
    for (name, value) in [
        ("DOCKER", readiness.docker_healthy),
        ("SEARCH BACKEND", readiness.aws_ready),
        ("LOG SHIPPER", readiness.vector_ready),
        ("QUEUE", readiness.redis_ready),
        ("PIPELINE", readiness.pipeline_ok),
    ] {
        println!("  {:<18} {}", name.dimmed(), flag(value));
    }

    if !status.last_error.is_empty() {
        println!("  {:<18} {}", "LAST ERROR".dimmed(), status.last_error.red());
    }

    let updated = status
        .updated_at
        .map(|t| {
            let age = (Utc::now() - t).num_seconds().max(0);
            format!("{} ({}s ago)", t.format("%Y-%m-%d %H:%M:%S UTC"), age)
        })
        .unwrap_or_else(|| "never".to_string());
    println!("{}", "─".repeat(50));
    println!("Updated {}", updated);
}

fn level_label(level: ThrottleLevel) -> ColoredString {
    let label = format!("{} ({})", level.as_u8(), level);
    match level {
        ThrottleLevel::None => label.green(),
        ThrottleLevel::Light => label.yellow(),
        ThrottleLevel::Moderate | ThrottleLevel::Severe => label.red(),
    }
}

fn flag(value: Option<bool>) -> ColoredString {
    match value {
        Some(true) => "ready".green(),
        Some(false) => "down".red(),
        None => "-".dimmed(),
    }
}
