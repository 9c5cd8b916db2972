use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::secrets::SecretToken;
use crate::types::{ConfigError, Result};

/// Environment variable names read at startup
pub mod vars {
    pub const BIND_ADDRESS: &str = "BIND_ADDRESS";
    pub const PORT: &str = "PORT";
    pub const MAX_REQUEST_SIZE: &str = "MAX_REQUEST_SIZE";
    pub const REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";
    pub const WEBHOOK_TOKEN: &str = "WEBHOOK_TOKEN";
    pub const DEPLOY_SCRIPT: &str = "DEPLOY_SCRIPT";
    pub const DEPLOY_LOG_FILE: &str = "DEPLOY_LOG_FILE";
    pub const DEPLOY_TIMEOUT: &str = "DEPLOY_TIMEOUT";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
    pub const METRICS_ENABLED: &str = "METRICS_ENABLED";
}

/// System configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_request_size")]
    pub max_request_size: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    pub token: Option<SecretToken>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    pub script: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_deploy_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

impl SystemConfig {
    /// Load system configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = std::fs::read_to_string(&path)
            .map_err(|_| ConfigError::FileNotFound { path: path_str })?;

        let config: SystemConfig = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Build the effective configuration: defaults, then the optional TOML
    /// file, then environment variables resolved through `lookup`.
    pub fn load<F>(config_path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match config_path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(lookup)?;
        Ok(config)
    }

    /// Overlay environment variables on top of the current values
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup(vars::BIND_ADDRESS) {
            self.server.bind = bind;
        }
        if let Some(port) = lookup(vars::PORT) {
            self.server.port = parse_env_value(vars::PORT, &port)?;
        }
        if let Some(size) = lookup(vars::MAX_REQUEST_SIZE) {
            self.server.max_request_size = size;
        }
        if let Some(timeout) = lookup(vars::REQUEST_TIMEOUT) {
            self.server.request_timeout = parse_env_value(vars::REQUEST_TIMEOUT, &timeout)?;
        }
        if let Some(token) = lookup(vars::WEBHOOK_TOKEN) {
            self.auth.token = Some(SecretToken::new(token));
        }
        if let Some(script) = lookup(vars::DEPLOY_SCRIPT) {
            self.deploy.script = Some(PathBuf::from(script));
        }
        if let Some(log_file) = lookup(vars::DEPLOY_LOG_FILE) {
            self.deploy.log_file = Some(PathBuf::from(log_file));
        }
        if let Some(timeout) = lookup(vars::DEPLOY_TIMEOUT) {
            self.deploy.timeout = parse_env_value(vars::DEPLOY_TIMEOUT, &timeout)?;
        }
        if let Some(level) = lookup(vars::LOG_LEVEL) {
            self.logging.level = level.to_lowercase();
        }
        if let Some(format) = lookup(vars::LOG_FORMAT) {
            self.logging.format = format.to_lowercase();
        }
        if let Some(enabled) = lookup(vars::METRICS_ENABLED) {
            self.monitoring.metrics_enabled = parse_env_bool(vars::METRICS_ENABLED, &enabled)?;
        }
        Ok(())
    }
}

impl ServerConfig {
    /// Socket address built from `bind` and `port`
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.bind.trim().parse().map_err(|_| ConfigError::Invalid {
            message: format!("Invalid bind address '{}'", self.bind),
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl AuthConfig {
    /// The bearer secret, rejecting absent and empty values
    pub fn require_token(&self) -> Result<&SecretToken> {
        match &self.token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(ConfigError::MissingField {
                field: format!("auth.token (or {})", vars::WEBHOOK_TOKEN),
            }
            .into()),
        }
    }
}

impl DeployConfig {
    pub fn require_script(&self) -> Result<&Path> {
        require_path(&self.script, "deploy.script", vars::DEPLOY_SCRIPT)
    }

    pub fn require_log_file(&self) -> Result<&Path> {
        require_path(&self.log_file, "deploy.log_file", vars::DEPLOY_LOG_FILE)
    }
}

fn require_path<'a>(value: &'a Option<PathBuf>, field: &str, var: &str) -> Result<&'a Path> {
    match value.as_deref() {
        Some(path) if !path.as_os_str().is_empty() => Ok(path),
        _ => Err(ConfigError::MissingField {
            field: format!("{} (or {})", field, var),
        }
        .into()),
    }
}

fn parse_env_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        ConfigError::Invalid {
            message: format!("Environment variable {} has invalid value '{}'", key, value),
        }
        .into()
    })
}

fn parse_env_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            message: format!(
                "Environment variable {} has invalid boolean value '{}'",
                key, value
            ),
        }
        .into()),
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_request_size: default_max_request_size(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            script: None,
            log_file: None,
            timeout: default_deploy_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: default_metrics_enabled(),
            metrics_path: default_metrics_path(),
        }
    }
}

// Default value functions
fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_max_request_size() -> String {
    "1MB".to_string()
}

fn default_request_timeout() -> u64 {
    900
}

fn default_deploy_timeout() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_metrics_enabled() -> bool {
    false
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}
