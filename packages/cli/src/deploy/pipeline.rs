//! Deployment pipeline
//!
//! Executes a [`DeployPlan`] step by step, stopping at the first failure.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

use super::error::DeployError;
use super::plan::{Action, Check, DeployPlan, PlannedCommand, StepKind, Target};
use super::runner::{CommandOutput, CommandRunner};

/// Progress notifications emitted while the plan runs
#[derive(Debug, Clone, PartialEq)]
pub enum StepEvent {
    Started(StepKind),
    Finished(StepKind, Duration),
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub kind: StepKind,
    pub commands: usize,
    pub duration_ms: u64,
}

/// Outcome of a successful deployment
#[derive(Debug, Clone)]
pub struct DeployReport {
    pub target: String,
    pub steps: Vec<StepReport>,
    pub skipped: Vec<PathBuf>,
    pub archive: PathBuf,
    /// HTTP status answered by the search endpoint, when probed
    pub search_status: Option<u16>,
}

pub struct Orchestrator<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> Orchestrator<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Run every step in order; the first failure aborts the rest
    pub async fn execute<F>(
        &self,
        plan: &DeployPlan,
        mut on_event: F,
    ) -> Result<DeployReport, DeployError>
    where
        F: FnMut(StepEvent),
    {
        let mut report = DeployReport {
            target: plan.target.clone(),
            steps: Vec::with_capacity(plan.steps.len()),
            skipped: plan.skipped.clone(),
            archive: plan.archive.clone(),
            search_status: None,
        };

        for path in &plan.skipped {
            warn!(path = %path.display(), "Sync path missing locally, skipped");
        }

        for step in &plan.steps {
            let span = info_span!("step", name = %step.kind);
            on_event(StepEvent::Started(step.kind));
            let started = Instant::now();

            async {
                info!(actions = step.actions.len(), "Step started");
                for action in &step.actions {
                    if let Some(status) = self.perform(step.kind, action).await? {
                        report.search_status = Some(status);
                    }
                }
                Ok::<_, DeployError>(())
            }
            .instrument(span)
            .await?;

            let elapsed = started.elapsed();
            info!(step = %step.kind, elapsed_ms = elapsed.as_millis() as u64, "Step completed");
            on_event(StepEvent::Finished(step.kind, elapsed));
            report.steps.push(StepReport {
                kind: step.kind,
                commands: step.commands().count(),
                duration_ms: elapsed.as_millis() as u64,
            });
        }

        info!(device = %plan.target, "Deployment completed");
        Ok(report)
    }

    /// Perform one action; returns the HTTP status of an endpoint probe
    async fn perform(&self, step: StepKind, action: &Action) -> Result<Option<u16>, DeployError> {
        match action {
            Action::Run(command) => self.run(step, command).await,
            Action::CreateDir(path) => {
                std::fs::create_dir_all(path).map_err(|source| DeployError::Io {
                    step,
                    path: path.clone(),
                    source,
                })?;
                Ok(None)
            }
            Action::RequireFile(path) => {
                if !path.is_file() {
                    return Err(DeployError::Transfer {
                        step,
                        command: format!("test -f {}", path.display()),
                        reason: "local artifact is missing".to_string(),
                    });
                }
                Ok(None)
            }
            Action::RenderEnv { path, vars } => {
                write_env_file(path, vars).map_err(|source| DeployError::Io {
                    step,
                    path: path.clone(),
                    source,
                })?;
                info!(path = %path.display(), variables = vars.len(), "Rendered environment file");
                Ok(None)
            }
            Action::RemoveFile(path) => {
                remove_if_present(path).map_err(|source| DeployError::Io {
                    step,
                    path: path.clone(),
                    source,
                })?;
                Ok(None)
            }
        }
    }

    async fn run(
        &self,
        step: StepKind,
        command: &PlannedCommand,
    ) -> Result<Option<u16>, DeployError> {
        let shown = command.display();
        debug!(command = %shown, "Running");

        let output = self
            .runner
            .run(&command.argv)
            .await
            .map_err(|source| DeployError::Spawn {
                step,
                command: shown.clone(),
                source,
            })?;

        if !output.success() {
            return Err(classify_failure(step, command, shown, &output));
        }

        match command.check {
            Check::ExitZero => Ok(None),
            Check::HttpReachable => {
                let answer = output.stdout.trim();
                match parse_http_status(answer) {
                    Some(status) => {
                        info!(status, "Search endpoint reachable");
                        Ok(Some(status))
                    }
                    None => Err(DeployError::Connectivity {
                        step,
                        command: shown,
                        status: output.status,
                        stderr: format!("search endpoint check answered `{}`", answer),
                    }),
                }
            }
        }
    }
}

/// Map a non-zero exit status to the error kind of the step it happened in
fn classify_failure(
    step: StepKind,
    command: &PlannedCommand,
    shown: String,
    output: &CommandOutput,
) -> DeployError {
    let stderr = output.stderr.trim().to_string();
    match (step, command.target) {
        (StepKind::Transfer | StepKind::Sync, _) => DeployError::Transfer {
            step,
            command: shown,
            reason: format!("exit status {}: {}", output.status, stderr),
        },
        (_, Target::Remote) => DeployError::Connectivity {
            step,
            command: shown,
            status: output.status,
            stderr,
        },
        (_, Target::Local) => DeployError::LocalCommand {
            step,
            command: shown,
            status: output.status,
            stderr,
        },
    }
}

/// Reachable means a numeric status that is neither `000` nor a server error
fn parse_http_status(answer: &str) -> Option<u16> {
    if answer.is_empty() || !answer.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let status: u16 = answer.parse().ok()?;
    if status == 0 || status >= 500 {
        return None;
    }
    Some(status)
}

/// Write the variables to a fresh file with mode 0600.
///
/// An existing file is removed first so a wider mode or a planted symlink
/// never survives into the new file.
fn write_env_file(path: &Path, vars: &[(String, String)]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    remove_if_present(path)?;

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    for (name, value) in vars {
        writeln!(file, "{}={}", name, value)?;
    }
    file.sync_all()
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
