//! Typed Settings
//!
//! Typed view of the merged configuration tree. Every section rejects keys
//! it does not know about so typos surface at load time.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::agent::throttle::{ThresholdError, ThrottleThresholds};

/// Main configuration structure for the IDS agent and its deployment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Target device connection settings
    #[serde(default)]
    pub device: DeviceConfig,

    /// Resource supervisor thresholds
    #[serde(default)]
    pub resources: ResourcesConfig,

    /// Status API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Container runtime settings
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Search backend and credentials
    #[serde(default)]
    pub aws: AwsConfig,

    /// Deployment settings
    #[serde(default)]
    pub deploy: DeploySettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote device reachable over SSH
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Hostname or IP address
    pub host: Option<String>,

    /// SSH user
    #[serde(default = "default_device_user")]
    pub user: String,

    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// SSH private key path
    pub ssh_key: Option<PathBuf>,
}

/// Throttling thresholds, in percent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourcesConfig {
    #[serde(default = "default_limit_percent")]
    pub cpu_limit_percent: f64,

    #[serde(default = "default_limit_percent")]
    pub ram_limit_percent: f64,

    /// Defaults to the base limit + 5
    pub cpu_limit_medium_percent: Option<f64>,

    /// Defaults to the base limit + 5
    pub ram_limit_medium_percent: Option<f64>,

    /// Defaults to the base limit + 10
    pub cpu_limit_high_percent: Option<f64>,

    /// Defaults to the base limit + 10
    pub ram_limit_high_percent: Option<f64>,

    /// Polling interval in seconds
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Container runtime probe interval in seconds
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
}

/// Status API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_api_host")]
    pub host: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

/// Container runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Docker socket path; the platform default when unset
    pub docker_socket: Option<String>,

    /// Compose project whose containers the probe reports on
    pub compose_project: Option<String>,
}

/// Search backend endpoint and the credentials used to reach it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwsConfig {
    pub region: Option<String>,

    pub opensearch_endpoint: Option<String>,

    /// Nested form: `[aws.opensearch] endpoint = "..."`
    pub opensearch: Option<OpenSearchConfig>,

    /// Usually supplied by the secrets file
    pub access_key_id: Option<String>,

    /// Usually supplied by the secrets file
    pub secret_access_key: Option<String>,

    #[serde(default)]
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenSearchConfig {
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsConfig {
    /// Credentials come from the host environment instead of the secrets file
    #[serde(default)]
    pub use_instance_profile: bool,
}

/// Image, files and services pushed to the device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploySettings {
    /// Project directory on the device
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,

    #[serde(default = "default_image_name")]
    pub image_name: String,

    #[serde(default = "default_image_tag")]
    pub image_tag: String,

    /// Relative to the build context unless absolute
    #[serde(default = "default_dockerfile")]
    pub dockerfile: PathBuf,

    /// Relative to the directory holding the config file unless absolute
    #[serde(default = "default_build_context")]
    pub build_context: PathBuf,

    #[serde(default = "default_dependency_manifest")]
    pub dependency_manifest: Option<PathBuf>,

    #[serde(default = "default_compose_file")]
    pub compose_file: PathBuf,

    /// Additional files or directories to synchronize
    #[serde(default = "default_sync_paths")]
    pub sync_paths: Vec<PathBuf>,

    /// Units enabled and restarted on activation
    #[serde(default = "default_services")]
    pub services: Vec<String>,

    /// Script run from the project directory before activation
    pub install_script: Option<String>,

    /// Local directory for image archives
    pub archive_dir: Option<PathBuf>,

    /// Extra `-o` options passed to ssh/scp
    #[serde(default)]
    pub ssh_options: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

// Default value functions
fn default_device_user() -> String {
    "pi".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_limit_percent() -> f64 {
    70.0
}

fn default_check_interval() -> u64 {
    1
}

fn default_probe_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_remote_dir() -> String {
    "/opt/ids-agent".to_string()
}

fn default_image_name() -> String {
    "ids-agent".to_string()
}

fn default_image_tag() -> String {
    "latest".to_string()
}

fn default_dockerfile() -> PathBuf {
    PathBuf::from("Dockerfile")
}

fn default_build_context() -> PathBuf {
    PathBuf::from(".")
}

fn default_dependency_manifest() -> Option<PathBuf> {
    Some(PathBuf::from("Cargo.toml"))
}

fn default_compose_file() -> PathBuf {
    PathBuf::from("docker/docker-compose.yml")
}

fn default_sync_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("deploy")]
}

fn default_services() -> Vec<String> {
    vec![
        "suricata.service".to_string(),
        "ids-agent.service".to_string(),
    ]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: None,
            user: default_device_user(),
            port: default_ssh_port(),
            ssh_key: None,
        }
    }
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            cpu_limit_percent: default_limit_percent(),
            ram_limit_percent: default_limit_percent(),
            cpu_limit_medium_percent: None,
            ram_limit_medium_percent: None,
            cpu_limit_high_percent: None,
            ram_limit_high_percent: None,
            check_interval_secs: default_check_interval(),
            probe_interval_secs: default_probe_interval(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            remote_dir: default_remote_dir(),
            image_name: default_image_name(),
            image_tag: default_image_tag(),
            dockerfile: default_dockerfile(),
            build_context: default_build_context(),
            dependency_manifest: default_dependency_manifest(),
            compose_file: default_compose_file(),
            sync_paths: default_sync_paths(),
            services: default_services(),
            install_script: None,
            archive_dir: None,
            ssh_options: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl ResourcesConfig {
    /// Validated thresholds; misordered limits are an error
    pub fn thresholds(&self) -> Result<ThrottleThresholds, ThresholdError> {
        ThrottleThresholds::with_escalation(
            self.cpu_limit_percent,
            self.ram_limit_percent,
            self.cpu_limit_medium_percent,
            self.ram_limit_medium_percent,
            self.cpu_limit_high_percent,
            self.ram_limit_high_percent,
        )
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }
}

impl AwsConfig {
    /// Configured search endpoint, if any. Empty strings count as unset.
    pub fn endpoint(&self) -> Option<&str> {
        self.opensearch_endpoint
            .as_deref()
            .or_else(|| self.opensearch.as_ref().and_then(|o| o.endpoint.as_deref()))
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.device.user, "pi");
        assert_eq!(settings.device.port, 22);
        assert_eq!(settings.resources.cpu_limit_percent, 70.0);
        assert_eq!(settings.resources.check_interval(), Duration::from_secs(1));
        assert_eq!(settings.api.port, 8080);
        assert_eq!(settings.deploy.remote_dir, "/opt/ids-agent");
        assert!(settings.aws.endpoint().is_none());
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml_content = r#"
            [device]
            host = "10.0.0.1"
        "#;

        let settings: Settings = toml::from_str(toml_content).unwrap();
        assert_eq!(settings.device.host.as_deref(), Some("10.0.0.1"));
        assert_eq!(settings.deploy.image_name, "ids-agent");
        assert_eq!(settings.deploy.services.len(), 2);
    }

    #[test]
    fn test_log_format_must_be_known() {
        let settings: Settings = toml::from_str("[logging]\nformat = \"json\"\n").unwrap();
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(Settings::default().logging.format, LogFormat::Pretty);
        assert!(toml::from_str::<Settings>("[logging]\nformat = \"xml\"\n").is_err());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(toml::from_str::<Settings>("[device]\nhots = \"x\"\n").is_err());
        assert!(toml::from_str::<Settings>("[nope]\nkey = 1\n").is_err());
    }

    #[test]
    fn test_default_thresholds() {
        let t = ResourcesConfig::default().thresholds().unwrap();
        assert_eq!(t.cpu.medium, 75.0);
        assert_eq!(t.cpu.high, 80.0);
    }

    #[test]
    fn test_misordered_thresholds() {
        let resources = ResourcesConfig {
            cpu_limit_medium_percent: Some(60.0),
            ..Default::default()
        };
        assert!(resources.thresholds().is_err());
    }

    #[test]
    fn test_nested_endpoint_and_blank_endpoint() {
        let settings: Settings =
            toml::from_str("[aws.opensearch]\nendpoint = \"https://search.example.com\"\n")
                .unwrap();
        assert_eq!(settings.aws.endpoint(), Some("https://search.example.com"));

        let settings: Settings = toml::from_str("[aws]\nopensearch_endpoint = \"  \"\n").unwrap();
        assert!(settings.aws.endpoint().is_none());
    }

    #[test]
    fn test_example_config_parses() {
        let settings: Settings =
            toml::from_str(include_str!("../../../../config.example.toml")).unwrap();
        assert_eq!(settings.device.host.as_deref(), Some("192.168.1.50"));
        assert_eq!(settings.aws.endpoint(), Some("https://search-ids.eu-west-3.es.amazonaws.com"));
        assert!(settings.resources.thresholds().is_ok());
    }
}
