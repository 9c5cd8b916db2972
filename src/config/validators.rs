use std::path::Path;

use super::types::SystemConfig;
use crate::types::Result;

// Validation helper functions

/// Validate that `bind` and `port` form a usable listen address
pub(crate) fn validate_listen_address(bind: &str, port: u16) -> Result<()> {
    if port == 0 {
        return Err(crate::types::Error::Validation {
            field: "server.port".to_string(),
            message: "Port must be between 1 and 65535".to_string(),
        });
    }
    bind.trim()
        .parse::<std::net::IpAddr>()
        .map_err(|_| crate::types::Error::Validation {
            field: "server.bind".to_string(),
            message: format!(
                "Invalid bind address '{}'. Expected an IP address (e.g., '0.0.0.0' or '::')",
                bind
            ),
        })?;
    Ok(())
}

/// Validate positive timeout value
pub(crate) fn validate_positive_timeout(value: u64, field: &str) -> Result<()> {
    if value == 0 {
        return Err(crate::types::Error::Validation {
            field: field.to_string(),
            message: "Timeout must be greater than 0".to_string(),
        });
    }
    Ok(())
}

/// The HTTP request timeout must outlive the deployment script
pub(crate) fn validate_timeout_relationships(deploy_timeout: u64, request_timeout: u64) -> Result<()> {
    if deploy_timeout >= request_timeout {
        return Err(crate::types::Error::Validation {
            field: "deploy.timeout".to_string(),
            message: format!(
                "Deploy timeout ({} seconds) must be lower than the request timeout ({} seconds)",
                deploy_timeout, request_timeout
            ),
        });
    }
    Ok(())
}

/// Parse size string with units (KB, MB, GB) into bytes
pub(crate) fn parse_size_string(size: &str) -> Result<u64> {
    let size = size.trim().to_uppercase();

    let (number, multiplier) = if let Some(number) = size.strip_suffix("KB") {
        (number, 1024)
    } else if let Some(number) = size.strip_suffix("MB") {
        (number, 1024 * 1024)
    } else if let Some(number) = size.strip_suffix("GB") {
        (number, 1024 * 1024 * 1024)
    } else if let Some(number) = size.strip_suffix('B') {
        (number, 1)
    } else {
        (size.as_str(), 1)
    };

    number
        .trim()
        .parse::<u64>()
        .map(|n| n * multiplier)
        .map_err(|_| crate::types::Error::Validation {
            field: "size".to_string(),
            message: format!(
                "Invalid size format '{}'. Expected format: number + unit (KB/MB/GB) or plain bytes",
                size
            ),
        })
}

/// Validate request size string and ensure reasonable limits
pub(crate) fn validate_request_size(size: &str, field: &str) -> Result<()> {
    let bytes = parse_size_string(size).map_err(|mut e| {
        if let crate::types::Error::Validation {
            field: ref mut field_ref,
            ..
        } = e
        {
            *field_ref = field.to_string();
        }
        e
    })?;

    // Minimum 1KB, maximum 100MB
    const MIN_SIZE: u64 = 1024;
    const MAX_SIZE: u64 = 100 * 1024 * 1024;

    if bytes < MIN_SIZE {
        return Err(crate::types::Error::Validation {
            field: field.to_string(),
            message: format!(
                "Request size {} bytes is below minimum {} (1KB)",
                bytes, MIN_SIZE
            ),
        });
    }

    if bytes > MAX_SIZE {
        return Err(crate::types::Error::Validation {
            field: field.to_string(),
            message: format!(
                "Request size {} bytes exceeds maximum {} (100MB)",
                bytes, MAX_SIZE
            ),
        });
    }

    Ok(())
}

/// Validate that the deployment script exists and can be executed
pub(crate) async fn validate_script(path: &Path, field: &str) -> Result<()> {
    let metadata =
        tokio::fs::metadata(path)
            .await
            .map_err(|e| crate::types::Error::Validation {
                field: field.to_string(),
                message: format!("Cannot access deployment script '{}': {}", path.display(), e),
            })?;

    if !metadata.is_file() {
        return Err(crate::types::Error::Validation {
            field: field.to_string(),
            message: format!("Deployment script '{}' is not a file", path.display()),
        });
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(crate::types::Error::Validation {
                field: field.to_string(),
                message: format!("Deployment script '{}' is not executable", path.display()),
            });
        }
    }

    Ok(())
}

/// Validate that the audit log path can hold a regular file
pub(crate) async fn validate_log_file(path: &Path, field: &str) -> Result<()> {
    if let Ok(metadata) = tokio::fs::metadata(path).await {
        if !metadata.is_file() {
            return Err(crate::types::Error::Validation {
                field: field.to_string(),
                message: format!("Audit log path '{}' is not a regular file", path.display()),
            });
        }
        return Ok(());
    }

    // The file and missing parent directories are created on open; an
    // existing parent must be a directory.
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(metadata) = tokio::fs::metadata(parent).await {
            if !metadata.is_dir() {
                return Err(crate::types::Error::Validation {
                    field: field.to_string(),
                    message: format!(
                        "Parent of audit log path '{}' is not a directory",
                        path.display()
                    ),
                });
            }
        }
    }

    Ok(())
}

/// Validate the optional metrics route
pub(crate) fn validate_metrics_path(path: &str, field: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(crate::types::Error::Validation {
            field: field.to_string(),
            message: format!("Metrics path '{}' must start with '/'", path),
        });
    }
    if matches!(path, "/" | "/deploy" | "/health") {
        return Err(crate::types::Error::Validation {
            field: field.to_string(),
            message: format!("Metrics path '{}' collides with a built-in route", path),
        });
    }
    Ok(())
}

impl SystemConfig {
    /// Validate the configuration
    pub async fn validate(&self) -> Result<()> {
        // Required settings
        self.auth.require_token()?;
        let script = self.deploy.require_script()?;
        let log_file = self.deploy.require_log_file()?;

        // Validate server configuration
        validate_listen_address(&self.server.bind, self.server.port)?;
        validate_request_size(&self.server.max_request_size, "server.max_request_size")?;
        validate_positive_timeout(self.server.request_timeout, "server.request_timeout")?;

        // Validate deploy configuration
        validate_positive_timeout(self.deploy.timeout, "deploy.timeout")?;
        validate_timeout_relationships(self.deploy.timeout, self.server.request_timeout)?;
        validate_script(script, "deploy.script").await?;
        validate_log_file(log_file, "deploy.log_file").await?;

        // Validate logging configuration
        if !matches!(
            self.logging.level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(crate::types::Error::Validation {
                field: "logging.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                ),
            });
        }

        if !matches!(self.logging.format.as_str(), "json" | "pretty" | "compact") {
            return Err(crate::types::Error::Validation {
                field: "logging.format".to_string(),
                message: format!(
                    "Invalid log format '{}'. Must be one of: json, pretty, compact",
                    self.logging.format
                ),
            });
        }

        // Validate monitoring configuration
        if self.monitoring.metrics_enabled {
            validate_metrics_path(&self.monitoring.metrics_path, "monitoring.metrics_path")?;
        }

        Ok(())
    }
}
