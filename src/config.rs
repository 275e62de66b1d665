//! Configuration management for the plugin runtime
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//! The option set matches the plugin daemon's environment contract: install
//! method and transport-specific connection details, worker pool sizing,
//! request timeouts, heartbeat cadence, and the daemon base URL used by the
//! HTTP backwards-invocation path.

use crate::error::{PluginRuntimeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for the plugin runtime IO server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Install method and transport-specific connection settings
    pub install: InstallConfig,
    /// Worker pool sizing, request timeout, heartbeat cadence
    #[serde(default)]
    pub server: ServerConfig,
    /// Daemon connection settings used by the HTTP backwards-invocation path
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// How the plugin process was installed, and the settings each install
/// method needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Which transport to drive: `local` (stdio), `remote` (TCP), or
    /// `aws_lambda` (embedded HTTP server)
    #[serde(default = "default_install_method")]
    pub method: InstallMethod,

    /// TCP remote host (required when `method == remote`)
    #[serde(default)]
    pub remote_host: Option<String>,

    /// TCP remote port
    #[serde(default = "default_remote_port")]
    pub remote_port: u16,

    /// Shared key sent in the TCP handshake
    #[serde(default)]
    pub remote_key: Option<String>,

    /// Max connection attempts on initial TCP connect before giving up
    /// (`REMOTE_RECONNECT_ATTEMPTS`)
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Fixed backoff between TCP reconnect attempts, in seconds
    /// (`REMOTE_RECONNECT_BACKOFF`)
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,

    /// Port the embedded HTTP server listens on under the serverless install
    #[serde(default = "default_aws_lambda_port")]
    pub aws_lambda_port: u16,
}

/// Install method, matching `INSTALL_METHOD` in `{local, remote, aws_lambda}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMethod {
    /// Stdio transport, own process's stdin/stdout
    Local,
    /// TCP transport with handshake + reconnect
    Remote,
    /// Embedded HTTP server transport
    AwsLambda,
}

impl Default for InstallMethod {
    fn default() -> Self {
        InstallMethod::Local
    }
}

fn default_install_method() -> InstallMethod {
    InstallMethod::default()
}

fn default_remote_port() -> u16 {
    5003
}

fn default_reconnect_attempts() -> u32 {
    3
}

fn default_reconnect_backoff_secs() -> u64 {
    5
}

fn default_aws_lambda_port() -> u16 {
    8080
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            method: default_install_method(),
            remote_host: None,
            remote_port: default_remote_port(),
            remote_key: None,
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_backoff_secs: default_reconnect_backoff_secs(),
            aws_lambda_port: default_aws_lambda_port(),
        }
    }
}

/// Worker pool, timeout, and heartbeat settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Per-request timeout in seconds (`MAX_REQUEST_TIMEOUT`)
    #[serde(default = "default_max_request_timeout_secs")]
    pub max_request_timeout_secs: u64,

    /// Maximum concurrent handler executions (`MAX_WORKER`)
    #[serde(default = "default_max_worker")]
    pub max_worker: usize,

    /// Heartbeat emission interval in seconds (`HEARTBEAT_INTERVAL`)
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

fn default_max_request_timeout_secs() -> u64 {
    300
}

fn default_max_worker() -> usize {
    1000
}

fn default_heartbeat_interval_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_request_timeout_secs: default_max_request_timeout_secs(),
            max_worker: default_max_worker(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
        }
    }
}

/// Daemon connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Base URL of the plugin daemon (`DIFY_PLUGIN_DAEMON_URL`), used by the
    /// HTTP backwards-invocation transport
    #[serde(default = "default_daemon_base_url")]
    pub base_url: String,
}

fn default_daemon_base_url() -> String {
    "http://localhost:5002".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            base_url: default_daemon_base_url(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default_config()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn default_config() -> Self {
        Self {
            install: InstallConfig::default(),
            server: ServerConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PluginRuntimeError::Config(format!("Failed to read config file: {}", e))
        })?;
        serde_yaml::from_str(&contents)
            .map_err(|e| PluginRuntimeError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(method) = std::env::var("INSTALL_METHOD") {
            self.install.method = match method.to_lowercase().as_str() {
                "local" => InstallMethod::Local,
                "remote" => InstallMethod::Remote,
                "aws_lambda" => InstallMethod::AwsLambda,
                _ => {
                    tracing::warn!("Invalid INSTALL_METHOD: {}, keeping current value", method);
                    self.install.method
                }
            };
        }

        if let Ok(host) = std::env::var("REMOTE_INSTALL_HOST") {
            self.install.remote_host = Some(host);
        }

        if let Ok(port) = std::env::var("REMOTE_INSTALL_PORT") {
            match port.parse() {
                Ok(v) => self.install.remote_port = v,
                Err(_) => tracing::warn!("Invalid REMOTE_INSTALL_PORT: {}", port),
            }
        }

        if let Ok(key) = std::env::var("REMOTE_INSTALL_KEY") {
            self.install.remote_key = Some(key);
        }

        if let Ok(attempts) = std::env::var("REMOTE_RECONNECT_ATTEMPTS") {
            match attempts.parse() {
                Ok(v) => self.install.reconnect_attempts = v,
                Err(_) => tracing::warn!("Invalid REMOTE_RECONNECT_ATTEMPTS: {}", attempts),
            }
        }

        if let Ok(backoff) = std::env::var("REMOTE_RECONNECT_BACKOFF") {
            match backoff.parse() {
                Ok(v) => self.install.reconnect_backoff_secs = v,
                Err(_) => tracing::warn!("Invalid REMOTE_RECONNECT_BACKOFF: {}", backoff),
            }
        }

        if let Ok(port) = std::env::var("AWS_LAMBDA_PORT") {
            match port.parse() {
                Ok(v) => self.install.aws_lambda_port = v,
                Err(_) => tracing::warn!("Invalid AWS_LAMBDA_PORT: {}", port),
            }
        }

        if let Ok(timeout) = std::env::var("MAX_REQUEST_TIMEOUT") {
            match timeout.parse() {
                Ok(v) => self.server.max_request_timeout_secs = v,
                Err(_) => tracing::warn!("Invalid MAX_REQUEST_TIMEOUT: {}", timeout),
            }
        }

        if let Ok(max_worker) = std::env::var("MAX_WORKER") {
            match max_worker.parse() {
                Ok(v) => self.server.max_worker = v,
                Err(_) => tracing::warn!("Invalid MAX_WORKER: {}", max_worker),
            }
        }

        if let Ok(interval) = std::env::var("HEARTBEAT_INTERVAL") {
            match interval.parse() {
                Ok(v) => self.server.heartbeat_interval_secs = v,
                Err(_) => tracing::warn!("Invalid HEARTBEAT_INTERVAL: {}", interval),
            }
        }

        if let Ok(url) = std::env::var("DIFY_PLUGIN_DAEMON_URL") {
            self.daemon.base_url = url;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(method) = &cli.install_method {
            self.install.method = match method.to_lowercase().as_str() {
                "local" => InstallMethod::Local,
                "remote" => InstallMethod::Remote,
                "aws_lambda" => InstallMethod::AwsLambda,
                _ => {
                    tracing::warn!(
                        "Invalid --install-method: {}, keeping current value",
                        method
                    );
                    self.install.method
                }
            };
        }

        if let Some(port) = cli.port {
            self.install.aws_lambda_port = port;
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation check fails.
    pub fn validate(&self) -> Result<()> {
        if self.install.method == InstallMethod::Remote && self.install.remote_host.is_none() {
            return Err(PluginRuntimeError::Config(
                "install.remote_host is required when install.method is \"remote\"".to_string(),
            )
            .into());
        }

        if self.install.remote_port == 0 {
            return Err(
                PluginRuntimeError::Config("install.remote_port must be nonzero".to_string())
                    .into(),
            );
        }

        if self.install.aws_lambda_port == 0 {
            return Err(PluginRuntimeError::Config(
                "install.aws_lambda_port must be nonzero".to_string(),
            )
            .into());
        }

        if self.install.reconnect_attempts == 0 {
            return Err(PluginRuntimeError::Config(
                "install.reconnect_attempts must be greater than 0".to_string(),
            )
            .into());
        }

        if self.server.max_worker == 0 {
            return Err(
                PluginRuntimeError::Config("server.max_worker must be greater than 0".to_string())
                    .into(),
            );
        }

        if self.server.max_request_timeout_secs == 0 {
            return Err(PluginRuntimeError::Config(
                "server.max_request_timeout_secs must be greater than 0".to_string(),
            )
            .into());
        }

        if self.server.heartbeat_interval_secs == 0 {
            return Err(PluginRuntimeError::Config(
                "server.heartbeat_interval_secs must be greater than 0".to_string(),
            )
            .into());
        }

        url::Url::parse(&self.daemon.base_url).map_err(|e| {
            PluginRuntimeError::Config(format!("daemon.base_url is not a valid URL: {}", e))
        })?;

        Ok(())
    }
}
