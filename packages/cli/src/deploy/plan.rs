//! Deployment plan
//!
//! Turns a [`DeployConfig`] into the ordered list of steps and actions the
//! orchestrator executes. Planning never runs anything; it only inspects the
//! local filesystem to find the files to synchronize.

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::config::{remote_join, DeployConfig};

/// Remote directory image archives are copied to before `docker load`
const REMOTE_TMP_DIR: &str = "/tmp";

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StepKind {
    Preflight,
    Build,
    Package,
    Transfer,
    Sync,
    Activate,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKind::Preflight => "preflight",
            StepKind::Build => "build",
            StepKind::Package => "package",
            StepKind::Transfer => "transfer",
            StepKind::Sync => "sync",
            StepKind::Activate => "activate",
        };
        f.write_str(name)
    }
}

/// How a command's output decides success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// Exit status zero
    ExitZero,
    /// Exit status zero and stdout is an HTTP status below 500 (not `000`)
    HttpReachable,
}

/// Where the command acts; drives error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCommand {
    pub argv: Vec<String>,
    pub check: Check,
    pub target: Target,
}

impl PlannedCommand {
    fn local(argv: Vec<String>) -> Self {
        Self {
            argv,
            check: Check::ExitZero,
            target: Target::Local,
        }
    }

    fn remote(argv: Vec<String>) -> Self {
        Self {
            argv,
            check: Check::ExitZero,
            target: Target::Remote,
        }
    }

    pub fn display(&self) -> String {
        display_command(&self.argv)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Run(PlannedCommand),
    /// Create a local directory and its parents
    CreateDir(PathBuf),
    /// Fail the step unless the local file exists
    RequireFile(PathBuf),
    /// Write `KEY=value` lines to a local file readable by the owner only
    RenderEnv {
        path: PathBuf,
        vars: Vec<(String, String)>,
    },
    /// Delete a local file if it exists
    RemoveFile(PathBuf),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Run(command) => f.write_str(&command.display()),
            Action::CreateDir(path) => write!(f, "mkdir -p {}", path.display()),
            Action::RequireFile(path) => write!(f, "test -f {}", path.display()),
            Action::RemoveFile(path) => write!(f, "rm -f {}", path.display()),
            // Values are secrets; only names are shown.
            Action::RenderEnv { path, vars } => {
                let names: Vec<&str> = vars.iter().map(|(name, _)| name.as_str()).collect();
                write!(f, "render {} ({})", path.display(), names.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentStep {
    pub kind: StepKind,
    pub actions: Vec<Action>,
}

impl DeploymentStep {
    /// Commands of this step, in order
    pub fn commands(&self) -> impl Iterator<Item = &PlannedCommand> {
        self.actions.iter().filter_map(|action| match action {
            Action::Run(command) => Some(command),
            _ => None,
        })
    }
}

/// Local file and the remote path it is copied to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEntry {
    pub local: PathBuf,
    pub remote: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub steps: Vec<DeploymentStep>,
    /// Sync paths missing locally, skipped with a warning
    pub skipped: Vec<PathBuf>,
    pub archive: PathBuf,
    pub target: String,
}

/// Build the full ordered plan for one deployment
pub fn plan(config: &DeployConfig) -> DeployPlan {
    let archive = config.archive_path();
    let (entries, skipped) = collect_sync_entries(config);

    let steps = vec![
        DeploymentStep {
            kind: StepKind::Preflight,
            actions: preflight(config),
        },
        DeploymentStep {
            kind: StepKind::Build,
            actions: vec![Action::Run(PlannedCommand::local(argv([
                "docker".to_string(),
                "build".to_string(),
                "-t".to_string(),
                config.image_ref(),
                "-f".to_string(),
                path_arg(&config.dockerfile),
                path_arg(&config.build_context),
            ])))],
        },
        DeploymentStep {
            kind: StepKind::Package,
            actions: vec![
                Action::CreateDir(config.archive_dir.clone()),
                Action::Run(PlannedCommand::local(argv([
                    "docker".to_string(),
                    "save".to_string(),
                    "-o".to_string(),
                    path_arg(&archive),
                    config.image_ref(),
                ]))),
            ],
        },
        DeploymentStep {
            kind: StepKind::Transfer,
            actions: transfer(config, &archive),
        },
        DeploymentStep {
            kind: StepKind::Sync,
            actions: sync(config, &entries),
        },
        DeploymentStep {
            kind: StepKind::Activate,
            actions: activate(config),
        },
    ];

    DeployPlan {
        steps,
        skipped,
        archive,
        target: config.ssh_target(),
    }
}

fn preflight(config: &DeployConfig) -> Vec<Action> {
    let mut actions = vec![
        Action::Run(PlannedCommand::local(vec![
            "docker".to_string(),
            "version".to_string(),
        ])),
        Action::Run(PlannedCommand::remote(ssh_command(config, "echo ok"))),
        Action::Run(PlannedCommand::remote(ssh_command(config, "docker --version"))),
    ];

    if let Some(endpoint) = &config.search_endpoint {
        let probe = format!(
            "curl -sS -o /dev/null -w \"%{{http_code}}\" {}",
            quote(endpoint)
        );
        actions.push(Action::Run(PlannedCommand {
            argv: ssh_command(config, &probe),
            check: Check::HttpReachable,
            target: Target::Remote,
        }));
    }

    actions
}

fn transfer(config: &DeployConfig, archive: &Path) -> Vec<Action> {
    let file_name = archive
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let remote_archive = format!("{}/{}", REMOTE_TMP_DIR, file_name);

    vec![
        Action::RequireFile(archive.to_path_buf()),
        Action::Run(PlannedCommand::remote(scp_command(
            config,
            archive,
            &remote_archive,
        ))),
        Action::Run(PlannedCommand::remote(ssh_command(
            config,
            &sudo(&format!("docker load -i {}", quote(&remote_archive))),
        ))),
        Action::Run(PlannedCommand::remote(ssh_command(
            config,
            &format!("rm -f {}", quote(&remote_archive)),
        ))),
    ]
}

fn sync(config: &DeployConfig, entries: &[SyncEntry]) -> Vec<Action> {
    let owner = format!("{}:{}", config.user, config.user);
    let remote_root = quote(&config.remote_dir);
    let mut actions = vec![Action::Run(PlannedCommand::remote(ssh_command(
        config,
        &sudo(&format!(
            "mkdir -p {} && chown -R {} {}",
            remote_root,
            quote(&owner),
            remote_root
        )),
    )))];

    for entry in entries {
        actions.extend(sync_entry(config, entry));
    }

    if !config.env.is_empty() {
        let local = config.archive_dir.join(".env");
        actions.push(Action::RenderEnv {
            path: local.clone(),
            vars: config.env.clone(),
        });
        actions.extend(sync_entry(
            config,
            &SyncEntry {
                local: local.clone(),
                remote: format!("{}/.env", config.remote_compose_dir()),
                is_dir: false,
            },
        ));
        actions.push(Action::RemoveFile(local));
    }

    actions
}

fn sync_entry(config: &DeployConfig, entry: &SyncEntry) -> Vec<Action> {
    let remote_parent = if entry.is_dir {
        entry.remote.clone()
    } else {
        match entry.remote.rsplit_once('/') {
            Some((parent, _)) if !parent.is_empty() => parent.to_string(),
            _ => "/".to_string(),
        }
    };

    vec![
        Action::Run(PlannedCommand::remote(ssh_command(
            config,
            &format!("mkdir -p {}", quote(&remote_parent)),
        ))),
        Action::Run(PlannedCommand::remote(rsync_command(config, entry))),
    ]
}

fn activate(config: &DeployConfig) -> Vec<Action> {
    let mut actions = Vec::new();
    let remote_root = quote(&config.remote_dir);

    if let Some(script) = &config.install_script {
        actions.push(remote_sudo(
            config,
            &format!("cd {} && bash {}", remote_root, quote(script)),
        ));
    }

    actions.push(remote_sudo(config, "systemctl daemon-reload"));

    let services: Vec<String> = config.services.iter().map(|s| quote(s)).collect();
    if !services.is_empty() {
        actions.push(remote_sudo(
            config,
            &format!("systemctl enable {}", services.join(" ")),
        ));
    }

    actions.push(remote_sudo(
        config,
        &format!(
            "cd {} && docker compose up -d",
            quote(&config.remote_compose_dir())
        ),
    ));

    if !services.is_empty() {
        actions.push(remote_sudo(
            config,
            &format!("systemctl restart {}", services.join(" ")),
        ));
    }

    actions
}

fn remote_sudo(config: &DeployConfig, command: &str) -> Action {
    Action::Run(PlannedCommand::remote(ssh_command(config, &sudo(command))))
}

/// Files to synchronize, in order, plus the ones missing locally.
///
/// The dependency manifest, configuration, secrets and compose descriptor
/// come first, followed by the configured extra paths. Paths outside the
/// project root are synced under their file name only.
pub fn collect_sync_entries(config: &DeployConfig) -> (Vec<SyncEntry>, Vec<PathBuf>) {
    let mut candidates: Vec<PathBuf> = Vec::new();
    candidates.extend(config.dependency_manifest.clone());
    candidates.extend(config.config_file.clone());
    candidates.extend(config.secret_file.clone());
    candidates.push(config.compose_file.clone());
    candidates.extend(config.sync_paths.iter().cloned());

    let mut entries: Vec<SyncEntry> = Vec::new();
    let mut skipped = Vec::new();

    for path in candidates {
        let local = if path.is_absolute() {
            path.clone()
        } else {
            config.project_root.join(&path)
        };

        if !local.exists() {
            warn!(path = %local.display(), "Skipping missing sync path");
            skipped.push(local);
            continue;
        }

        let relative = if path.is_absolute() {
            match path.strip_prefix(&config.project_root) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => {
                    let name = PathBuf::from(path.file_name().unwrap_or_default());
                    warn!(
                        path = %path.display(),
                        "Path is outside the project root; syncing file name only"
                    );
                    name
                }
            }
        } else {
            path
        };

        let remote = remote_join(&config.remote_dir, &relative);
        if entries.iter().any(|entry| entry.remote == remote) {
            continue;
        }

        entries.push(SyncEntry {
            is_dir: local.is_dir(),
            local,
            remote,
        });
    }

    (entries, skipped)
}

fn ssh_options(config: &DeployConfig) -> Vec<String> {
    let mut options = vec![
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
        "-o".to_string(),
        "ConnectTimeout=10".to_string(),
    ];
    for option in &config.ssh_options {
        options.push("-o".to_string());
        options.push(option.clone());
    }
    if let Some(key) = &config.ssh_key {
        options.push("-i".to_string());
        options.push(path_arg(key));
    }
    options
}

/// `ssh -p PORT <options> user@host <command>`
pub fn ssh_command(config: &DeployConfig, remote_command: &str) -> Vec<String> {
    let mut argv = vec!["ssh".to_string(), "-p".to_string(), config.port.to_string()];
    argv.extend(ssh_options(config));
    argv.push(config.ssh_target());
    argv.push(remote_command.to_string());
    argv
}

fn scp_command(config: &DeployConfig, local: &Path, remote: &str) -> Vec<String> {
    let mut argv = vec!["scp".to_string(), "-P".to_string(), config.port.to_string()];
    argv.extend(ssh_options(config));
    argv.push(path_arg(local));
    argv.push(format!("{}:{}", config.ssh_target(), remote));
    argv
}

fn rsync_command(config: &DeployConfig, entry: &SyncEntry) -> Vec<String> {
    let mut ssh = vec!["ssh".to_string(), "-p".to_string(), config.port.to_string()];
    ssh.extend(ssh_options(config));

    let (local, remote) = if entry.is_dir {
        (
            format!("{}/", path_arg(&entry.local).trim_end_matches('/')),
            format!("{}/", entry.remote.trim_end_matches('/')),
        )
    } else {
        (path_arg(&entry.local), entry.remote.clone())
    };

    let mut argv = vec!["rsync".to_string(), "-az".to_string()];
    if config.verbose {
        argv.extend(
            ["--info=progress2", "--stats", "--human-readable"]
                .iter()
                .map(|s| s.to_string()),
        );
    }
    argv.push("-e".to_string());
    argv.push(display_command(&ssh));
    argv.push(local);
    argv.push(format!("{}:{}", config.ssh_target(), remote));
    argv
}

/// Non-interactive privileged form of a remote command
pub fn sudo(command: &str) -> String {
    format!("sudo -n sh -lc {}", quote(command))
}

/// Quote a word for a POSIX shell
pub fn quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\"'\"'"))
    }
}

/// Render an argv as a shell command line
pub fn display_command(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn argv<const N: usize>(parts: [String; N]) -> Vec<String> {
    parts.into()
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config(root: &Path) -> DeployConfig {
        DeployConfig::for_tests(root)
    }

    fn step(plan: &DeployPlan, kind: StepKind) -> &DeploymentStep {
        plan.steps.iter().find(|step| step.kind == kind).unwrap()
    }

    fn joined(step: &DeploymentStep) -> Vec<String> {
        step.commands().map(PlannedCommand::display).collect()
    }

    #[test]
    fn test_steps_are_ordered() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&config(dir.path()));
        let kinds: Vec<StepKind> = plan.steps.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            [
                StepKind::Preflight,
                StepKind::Build,
                StepKind::Package,
                StepKind::Transfer,
                StepKind::Sync,
                StepKind::Activate
            ]
        );
    }

    #[test]
    fn test_ssh_command_shape() {
        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path());
        config.ssh_key = Some(PathBuf::from("/home/op/.ssh/id_ed25519"));
        config.ssh_options = vec!["ServerAliveInterval=5".to_string()];

        let argv = ssh_command(&config, "echo ok");
        assert_eq!(
            argv,
            [
                "ssh",
                "-p",
                "2222",
                "-o",
                "BatchMode=yes",
                "-o",
                "StrictHostKeyChecking=accept-new",
                "-o",
                "ConnectTimeout=10",
                "-o",
                "ServerAliveInterval=5",
                "-i",
                "/home/op/.ssh/id_ed25519",
                "pi@10.0.0.7",
                "echo ok"
            ]
        );
    }

    #[test]
    fn test_preflight_probes_search_endpoint_only_when_configured() {
        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path());
        let preflight = plan(&config).steps[0].clone();
        assert!(preflight.commands().all(|c| c.check == Check::ExitZero));
        assert_eq!(preflight.commands().count(), 3);

        config.search_endpoint = Some("https://search.example:443".to_string());
        let preflight = plan(&config).steps[0].clone();
        let probe = preflight.commands().last().unwrap();
        assert_eq!(probe.check, Check::HttpReachable);
        assert_eq!(
            probe.argv.last().unwrap(),
            "curl -sS -o /dev/null -w \"%{http_code}\" https://search.example:443"
        );
    }

    #[test]
    fn test_build_and_package_commands() {
        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path());
        config.image_name = "acme/ids".to_string();
        let plan = plan(&config);

        let build = step(&plan, StepKind::Build).commands().next().unwrap();
        assert_eq!(build.argv[..4], ["docker", "build", "-t", "acme/ids:latest"]);
        assert_eq!(build.target, Target::Local);

        let package = step(&plan, StepKind::Package);
        assert_eq!(package.actions[0], Action::CreateDir(dir.path().join("dist")));
        let save = package.commands().next().unwrap();
        assert_eq!(
            save.argv,
            [
                "docker".to_string(),
                "save".to_string(),
                "-o".to_string(),
                dir.path().join("dist/acme_ids_latest.tar").to_string_lossy().into_owned(),
                "acme/ids:latest".to_string(),
            ]
        );
    }

    #[test]
    fn test_transfer_loads_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&config(dir.path()));
        let transfer = step(&plan, StepKind::Transfer);

        assert_eq!(transfer.actions[0], Action::RequireFile(plan.archive.clone()));
        let commands = joined(transfer);
        assert!(commands[0].starts_with("scp -P 2222"));
        assert!(commands[0].ends_with("pi@10.0.0.7:/tmp/ids-agent_latest.tar"));
        assert!(commands[1]
            .ends_with(&quote("sudo -n sh -lc 'docker load -i /tmp/ids-agent_latest.tar'")));
        assert!(commands[2].ends_with(&quote("rm -f /tmp/ids-agent_latest.tar")));
    }

    #[test]
    fn test_sync_skips_missing_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        fs::write(dir.path().join("config.toml"), "").unwrap();
        fs::create_dir_all(dir.path().join("deploy")).unwrap();

        let plan = plan(&config(dir.path()));
        assert_eq!(
            plan.skipped,
            [dir.path().join("docker/docker-compose.yml")]
        );

        let commands = joined(step(&plan, StepKind::Sync));
        assert!(commands[0].contains("mkdir -p /opt/ids-agent && chown -R pi:pi /opt/ids-agent"));
        assert!(commands.iter().any(|c| {
            c.starts_with("rsync -az") && c.ends_with("pi@10.0.0.7:/opt/ids-agent/Cargo.toml")
        }));
        assert!(commands
            .iter()
            .any(|c| c.ends_with("/deploy/ pi@10.0.0.7:/opt/ids-agent/deploy/")));
        assert!(!commands.iter().any(|c| c.contains("docker-compose.yml")));
    }

    #[test]
    fn test_outside_root_syncs_file_name() {
        let dir = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        let secret = elsewhere.path().join("secret.json");
        fs::write(&secret, "{}").unwrap();

        let mut config = config(dir.path());
        config.secret_file = Some(secret.clone());
        let (entries, _) = collect_sync_entries(&config);

        let entry = entries.iter().find(|e| e.local == secret).unwrap();
        assert_eq!(entry.remote, "/opt/ids-agent/secret.json");
        assert!(!entry.is_dir);
    }

    #[test]
    fn test_env_file_is_rendered_next_to_compose_file() {
        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path());
        config.env = vec![("AWS_REGION".to_string(), "eu-west-3".to_string())];

        let plan = plan(&config);
        let sync = step(&plan, StepKind::Sync);
        assert!(sync.actions.iter().any(|a| matches!(
            a,
            Action::RenderEnv { path, .. } if *path == dir.path().join("dist/.env")
        )));
        assert!(joined(sync)
            .iter()
            .any(|c| c.ends_with("pi@10.0.0.7:/opt/ids-agent/docker/.env")));
        assert_eq!(
            sync.actions.last(),
            Some(&Action::RemoveFile(dir.path().join("dist/.env")))
        );
    }

    #[test]
    fn test_activate_sequence() {
        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path());
        config.install_script = Some("deploy/install.sh".to_string());

        let commands: Vec<String> = step(&plan(&config), StepKind::Activate)
            .commands()
            .map(|c| c.argv.last().unwrap().clone())
            .collect();

        assert_eq!(
            commands,
            [
                sudo("cd /opt/ids-agent && bash deploy/install.sh"),
                sudo("systemctl daemon-reload"),
                sudo("systemctl enable suricata.service ids-agent.service"),
                sudo("cd /opt/ids-agent/docker && docker compose up -d"),
                sudo("systemctl restart suricata.service ids-agent.service"),
            ]
        );
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("/opt/ids-agent"), "/opt/ids-agent");
        assert_eq!(quote("a b"), "'a b'");
        assert_eq!(quote("it's"), "'it'\"'\"'s'");
        assert_eq!(quote(""), "''");
        assert_eq!(sudo("echo ok"), "sudo -n sh -lc 'echo ok'");
    }
}
