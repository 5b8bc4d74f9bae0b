//! Deployment configuration
//!
//! Built once per run from the merged configuration store plus command-line
//! overrides. Relative local paths are resolved against the directory holding
//! the configuration file; that directory and the configuration and secrets
//! paths are made absolute first.

use std::path::{Path, PathBuf};

use ids_agent::config::ConfigStore;

use super::error::DeployError;

/// Values given on the command line; `None` keeps the configured value
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub ssh_key: Option<PathBuf>,
    pub image_tag: Option<String>,
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub ssh_key: Option<PathBuf>,
    /// Extra `-o` options for ssh, scp and rsync
    pub ssh_options: Vec<String>,

    /// Directory relative sync paths are resolved against
    pub project_root: PathBuf,
    pub build_context: PathBuf,
    pub dockerfile: PathBuf,
    pub dependency_manifest: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub secret_file: Option<PathBuf>,
    pub compose_file: PathBuf,
    pub sync_paths: Vec<PathBuf>,

    pub image_name: String,
    pub image_tag: String,
    pub archive_dir: PathBuf,

    pub remote_dir: String,
    pub services: Vec<String>,
    pub install_script: Option<String>,
    pub search_endpoint: Option<String>,

    /// Variables written to the compose stack's `.env`
    pub env: Vec<(String, String)>,
    pub verbose: bool,
}

impl DeployConfig {
    pub fn from_store(store: &ConfigStore, overrides: Overrides) -> Result<Self, DeployError> {
        let settings = store.settings();
        let deploy = &settings.deploy;

        let host = overrides
            .host
            .or_else(|| settings.device.host.clone())
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| {
                DeployError::Configuration(
                    "device.host is required (set it in the config file or pass --host)"
                        .to_string(),
                )
            })?;

        let config_file = store.config_path().map(absolute);
        let secret_file = store.secret_path().map(absolute);
        let project_root = config_file
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| absolute(Path::new(".")));

        let build_context = resolve(&project_root, &deploy.build_context);
        let dockerfile = resolve(&build_context, &deploy.dockerfile);
        let archive_dir = deploy
            .archive_dir
            .as_ref()
            .map(|dir| resolve(&project_root, dir))
            .unwrap_or_else(|| std::env::temp_dir().join("ids-deploy"));

        let remote_dir = deploy.remote_dir.trim_end_matches('/').to_string();
        if remote_dir.is_empty() {
            return Err(DeployError::Configuration(
                "deploy.remote_dir must not be empty or /".to_string(),
            ));
        }

        let aws = &settings.aws;
        let mut env = Vec::new();
        if let Some(key) = aws.access_key_id.as_deref().filter(|v| !v.is_empty()) {
            env.push(("AWS_ACCESS_KEY_ID".to_string(), key.to_string()));
        }
        if let Some(secret) = aws.secret_access_key.as_deref().filter(|v| !v.is_empty()) {
            env.push(("AWS_SECRET_ACCESS_KEY".to_string(), secret.to_string()));
        }
        if let Some(region) = aws.region.as_deref().filter(|v| !v.is_empty()) {
            env.push(("AWS_REGION".to_string(), region.to_string()));
        }
        if let Some(endpoint) = aws.endpoint() {
            env.push(("OPENSEARCH_ENDPOINT".to_string(), endpoint.to_string()));
        }

        Ok(Self {
            host,
            port: overrides.port.unwrap_or(settings.device.port),
            user: overrides.user.unwrap_or_else(|| settings.device.user.clone()),
            ssh_key: overrides.ssh_key.or_else(|| settings.device.ssh_key.clone()),
            ssh_options: deploy.ssh_options.clone(),
            build_context,
            dockerfile,
            dependency_manifest: deploy.dependency_manifest.clone(),
            config_file,
            secret_file,
            compose_file: deploy.compose_file.clone(),
            sync_paths: deploy.sync_paths.clone(),
            image_name: deploy.image_name.clone(),
            image_tag: overrides
                .image_tag
                .unwrap_or_else(|| deploy.image_tag.clone()),
            archive_dir,
            remote_dir,
            services: deploy.services.clone(),
            install_script: deploy.install_script.clone(),
            search_endpoint: aws.endpoint().map(str::to_string),
            env,
            verbose: overrides.verbose,
            project_root,
        })
    }

    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image_name, self.image_tag)
    }

    pub fn ssh_target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Local path of the saved image archive
    pub fn archive_path(&self) -> PathBuf {
        let safe_name = self.image_name.replace('/', "_");
        self.archive_dir
            .join(format!("{}_{}.tar", safe_name, self.image_tag))
    }

    /// Remote directory holding the compose descriptor
    pub fn remote_compose_dir(&self) -> String {
        match self.compose_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => remote_join(&self.remote_dir, parent),
            None => self.remote_dir.clone(),
        }
    }
}

#[cfg(test)]
impl DeployConfig {
    /// Fresh project rooted at `root`, targeting `pi@10.0.0.7:2222`
    pub(crate) fn for_tests(root: &Path) -> Self {
        Self {
            host: "10.0.0.7".to_string(),
            port: 2222,
            user: "pi".to_string(),
            ssh_key: None,
            ssh_options: Vec::new(),
            project_root: root.to_path_buf(),
            build_context: root.to_path_buf(),
            dockerfile: root.join("Dockerfile"),
            dependency_manifest: Some(PathBuf::from("Cargo.toml")),
            config_file: Some(root.join("config.toml")),
            secret_file: None,
            compose_file: PathBuf::from("docker/docker-compose.yml"),
            sync_paths: vec![PathBuf::from("deploy")],
            image_name: "ids-agent".to_string(),
            image_tag: "latest".to_string(),
            archive_dir: root.join("dist"),
            remote_dir: "/opt/ids-agent".to_string(),
            services: vec!["suricata.service".to_string(), "ids-agent.service".to_string()],
            install_script: None,
            search_endpoint: None,
            env: Vec::new(),
            verbose: false,
        }
    }
}

/// Absolute form of `path` relative to the working directory
fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Join a relative local path onto a remote POSIX directory
pub(crate) fn remote_join(remote_dir: &str, relative: &Path) -> String {
    let mut joined = remote_dir.trim_end_matches('/').to_string();
    for part in relative.components() {
        if let std::path::Component::Normal(part) = part {
            joined.push('/');
            joined.push_str(&part.to_string_lossy());
        }
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::plan::collect_sync_entries;
    use std::fs;
    use tempfile::TempDir;

    fn store(dir: &TempDir, config: &str, secrets: Option<&str>) -> ConfigStore {
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, config).unwrap();
        let secret_path = secrets.map(|content| {
            let path = dir.path().join("secret.json");
            fs::write(&path, content).unwrap();
            path
        });
        ConfigStore::load(&config_path, secret_path.as_deref()).unwrap()
    }

    #[test]
    fn test_host_is_required() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, "", None);
        let err = DeployConfig::from_store(&store, Overrides::default()).unwrap_err();
        assert!(matches!(err, DeployError::Configuration(_)));
    }

    #[test]
    fn test_overrides_win() {
        let dir = TempDir::new().unwrap();
        let store = store(
            &dir,
            "[device]\nhost = \"10.0.0.5\"\nport = 2222\n\n[deploy]\nimage_tag = \"v1\"\n",
            None,
        );
        let config = DeployConfig::from_store(
            &store,
            Overrides {
                host: Some("sensor.local".to_string()),
                image_tag: Some("v2".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(config.ssh_target(), "pi@sensor.local");
        assert_eq!(config.port, 2222);
        assert_eq!(config.image_ref(), "ids-agent:v2");
        assert_eq!(config.project_root, dir.path());
        assert_eq!(config.dockerfile, dir.path().join(".").join("Dockerfile"));
    }

    #[test]
    fn test_config_in_relative_subdirectory_is_synced() {
        // A path like `.tmpXXXX/conf/config.toml`, relative to the working directory.
        let dir = TempDir::new_in(".").unwrap();
        let conf = dir.path().join("conf");
        assert!(conf.is_relative());
        fs::create_dir_all(&conf).unwrap();
        let config_path = conf.join("config.toml");
        fs::write(&config_path, "[device]\nhost = \"pi\"\n").unwrap();
        fs::write(conf.join("secret.json"), "{}").unwrap();

        let secrets = ConfigStore::sibling_secrets(&config_path);
        let store = ConfigStore::load(&config_path, secrets.as_deref()).unwrap();
        let config = DeployConfig::from_store(&store, Overrides::default()).unwrap();
        assert!(config.project_root.is_absolute());
        assert!(config.project_root.ends_with("conf"));

        let (entries, skipped) = collect_sync_entries(&config);
        let remotes: Vec<&str> = entries.iter().map(|e| e.remote.as_str()).collect();
        assert!(remotes.contains(&"/opt/ids-agent/config.toml"));
        assert!(remotes.contains(&"/opt/ids-agent/secret.json"));
        assert!(!skipped
            .iter()
            .any(|p| p.ends_with("config.toml") || p.ends_with("secret.json")));
    }

    #[test]
    fn test_archive_path_flattens_image_name() {
        let dir = TempDir::new().unwrap();
        let store = store(
            &dir,
            "[device]\nhost = \"pi\"\n\n[deploy]\nimage_name = \"acme/ids\"\narchive_dir = \"dist\"\n",
            None,
        );
        let config = DeployConfig::from_store(&store, Overrides::default()).unwrap();
        assert_eq!(
            config.archive_path(),
            dir.path().join("dist").join("acme_ids_latest.tar")
        );
    }

    #[test]
    fn test_env_collects_merged_credentials() {
        let dir = TempDir::new().unwrap();
        let store = store(
            &dir,
            "[device]\nhost = \"pi\"\n\n[aws]\nregion = \"eu-west-1\"\nopensearch_endpoint = \"https://search.example\"\n",
            Some(r#"{"aws": {"access_key_id": "AKIA", "secret_access_key": "s3cr3t"}}"#),
        );
        let config = DeployConfig::from_store(&store, Overrides::default()).unwrap();

        let names: Vec<&str> = config.env.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            [
                "AWS_ACCESS_KEY_ID",
                "AWS_SECRET_ACCESS_KEY",
                "AWS_REGION",
                "OPENSEARCH_ENDPOINT"
            ]
        );
        assert_eq!(config.search_endpoint.as_deref(), Some("https://search.example"));
    }

    #[test]
    fn test_remote_compose_dir() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, "[device]\nhost = \"pi\"\n", None);
        let mut config = DeployConfig::from_store(&store, Overrides::default()).unwrap();
        assert_eq!(config.remote_compose_dir(), "/opt/ids-agent/docker");

        config.compose_file = PathBuf::from("docker-compose.yml");
        assert_eq!(config.remote_compose_dir(), "/opt/ids-agent");
    }
}
