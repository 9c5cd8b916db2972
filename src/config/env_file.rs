//! `.env` file support
//!
//! Variables from the file are consulted only when the process environment
//! does not define them. The process environment itself is never modified:
//! the file is read with `dotenvy::from_path_iter`, which yields pairs
//! without calling `set_var`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::types::{ConfigError, Result};

/// Default file looked up in the working directory
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Environment lookup backed by the process environment and an optional `.env` file
#[derive(Debug, Clone, Default)]
pub struct EnvLookup {
    file_vars: HashMap<String, String>,
    source: Option<PathBuf>,
}

impl EnvLookup {
    /// Lookup that only consults the process environment
    pub fn process_only() -> Self {
        Self::default()
    }

    /// Load variables from an explicit file, failing if it cannot be read or parsed
    pub fn with_file(path: &Path) -> Result<Self> {
        let entries = dotenvy::from_path_iter(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let mut file_vars = HashMap::new();
        for entry in entries {
            let (key, value) = entry.map_err(|e| ConfigError::Invalid {
                message: format!("Invalid environment file '{}': {}", path.display(), e),
            })?;
            file_vars.insert(key, value);
        }

        debug!(
            path = %path.display(),
            count = file_vars.len(),
            "Loaded environment file"
        );

        Ok(Self {
            file_vars,
            source: Some(path.to_path_buf()),
        })
    }

    /// Use `explicit` when given, otherwise `./.env` if it exists
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::with_file(path),
            None => {
                let default = Path::new(DEFAULT_ENV_FILE);
                if default.is_file() {
                    Self::with_file(default)
                } else {
                    Ok(Self::process_only())
                }
            }
        }
    }

    /// Resolve a variable, preferring the process environment
    pub fn get(&self, key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .or_else(|| self.file_vars.get(key).cloned())
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}
