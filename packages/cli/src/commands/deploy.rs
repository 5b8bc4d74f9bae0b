use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

use ids_agent::config::settings::{LogFormat, LoggingConfig};
use ids_agent::config::ConfigStore;
use ids_agent::logging;

use crate::deploy::{
    plan, DeployConfig, DeployError, DeployPlan, DeployReport, Orchestrator, Overrides,
    ProcessRunner, StepEvent,
};

/// Arguments of `ids deploy`
pub struct DeployArgs {
    pub config: PathBuf,
    pub secrets: Option<PathBuf>,
    pub overrides: Overrides,
    pub dry_run: bool,
    pub yes: bool,
}

/// Deploy the agent to a device
pub async fn run(args: DeployArgs) -> Result<()> {
    let verbose = args.overrides.verbose;
    logging::init(
        &LoggingConfig {
            level: "warn".to_string(),
            format: LogFormat::Compact,
        },
        verbose,
    )?;

    let secrets = args
        .secrets
        .clone()
        .or_else(|| ConfigStore::sibling_secrets(&args.config));
    let store = ConfigStore::load(&args.config, secrets.as_deref())
        .map_err(DeployError::from)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    let config = DeployConfig::from_store(&store, args.overrides)?;
    let plan = plan(&config);

    println!("{}", "IDS Deploy".bold());
    println!("  Target:  {}:{}", plan.target.cyan(), config.port);
    println!("  Image:   {}", config.image_ref().cyan());
    println!("  Remote:  {}", config.remote_dir);
    for path in &plan.skipped {
        println!(
            "  {} skipping missing {}",
            "!".yellow().bold(),
            path.display().to_string().dimmed()
        );
    }
    println!();

    if args.dry_run {
        print_plan(&plan);
        return Ok(());
    }

    if !args.yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("Deploy {} to {}?", config.image_ref(), plan.target))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("{}", "Cancelled.".dimmed());
            return Ok(());
        }
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template("{spinner:.blue} {msg}")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(100));

    let orchestrator = Orchestrator::new(ProcessRunner);
    let result = orchestrator
        .execute(&plan, |event| match event {
            StepEvent::Started(kind) => spinner.set_message(format!("{}...", kind)),
            StepEvent::Finished(kind, elapsed) => spinner.println(format!(
                "{} {:<10} {}",
                "✓".green().bold(),
                kind.to_string(),
                format!("{:.1}s", elapsed.as_secs_f64()).dimmed()
            )),
        })
        .await;
    spinner.finish_and_clear();

    match result {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(err) => {
            print_failure(&err);
            Err(err.into())
        }
    }
}

fn print_plan(plan: &DeployPlan) {
    println!("{}", "Plan (dry run)".bold());
    for step in &plan.steps {
        println!("{}", step.kind.to_string().blue().bold());
        for action in &step.actions {
            println!("  {}", action);
        }
    }
}

fn print_report(report: &DeployReport) {
    println!();
    println!(
        "{} Deployed to {}",
        "✓".green().bold(),
        report.target.cyan()
    );
    if let Some(status) = report.search_status {
        println!("  Search endpoint answered {}", status);
    }
    let commands: usize = report.steps.iter().map(|s| s.commands).sum();
    let total_ms: u64 = report.steps.iter().map(|s| s.duration_ms).sum();
    println!(
        "  {} commands in {} steps, {:.1}s",
        commands,
        report.steps.len(),
        total_ms as f64 / 1000.0
    );
    if let Some(slowest) = report.steps.iter().max_by_key(|s| s.duration_ms) {
        println!(
            "  Slowest step: {} ({:.1}s)",
            slowest.kind,
            slowest.duration_ms as f64 / 1000.0
        );
    }
    if !report.skipped.is_empty() {
        println!("  {} path(s) skipped", report.skipped.len());
    }
    println!("  Archive: {}", report.archive.display().to_string().dimmed());
}

fn print_failure(err: &DeployError) {
    println!();
    let step = err
        .step()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "deploy".to_string());
    println!("{} {} failed", "✗".red().bold(), step.bold());
    match err {
        DeployError::Connectivity {
            command, stderr, ..
        }
        | DeployError::LocalCommand {
            command, stderr, ..
        } => {
            println!("  Command: {}", command.dimmed());
            if !stderr.is_empty() {
                println!("  {}", stderr.red());
            }
        }
        DeployError::Transfer {
            command, reason, ..
        } => {
            println!("  Command: {}", command.dimmed());
            println!("  {}", reason.red());
        }
        other => println!("  {}", other.to_string().red()),
    }
}
