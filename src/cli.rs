use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio::signal;
use tracing::{debug, error, info, instrument};

use crate::config::{EnvLookup, SystemConfig};
use crate::types::Result;

#[derive(Parser)]
#[command(name = "deployhook")]
#[command(about = "A minimal authenticated deployment webhook")]
#[command(long_about = "
A single-binary HTTP service that accepts bearer-authenticated deploy requests
naming a container image and runs a locally configured deployment script with
the image and commit as arguments, keeping an append-only audit log.
")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Environment file to read (defaults to ./.env when present)
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Override log level
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the webhook server (default if no subcommand given)
    Run(RunArgs),
    /// Load and validate the configuration, then exit
    Validate,
    /// Show version and build information
    Version,
}

#[derive(Args, Clone, Default)]
pub struct RunArgs {
    /// Override the listen port
    #[arg(long)]
    pub port: Option<u16>,

    /// Override the bind address (e.g. "127.0.0.1")
    #[arg(long)]
    pub bind: Option<String>,

    /// Set log format
    #[arg(long)]
    pub log_format: Option<LogFormat>,
}

impl RunArgs {
    /// Apply command line overrides on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut SystemConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
    }
}

impl Cli {
    /// Get effective log level considering verbose/quiet flags
    pub fn effective_log_level(&self) -> LogLevel {
        if self.verbose {
            LogLevel::Debug
        } else if self.quiet {
            LogLevel::Error
        } else {
            self.log_level.clone().unwrap_or(LogLevel::Info)
        }
    }

    /// Level override for the logging module, if any flag asked for one
    pub fn log_level_override(&self) -> Option<&'static str> {
        if self.log_level.is_none() && !self.verbose && !self.quiet {
            return None;
        }
        Some(match self.effective_log_level() {
            LogLevel::Trace => crate::logging::level::TRACE,
            LogLevel::Debug => crate::logging::level::DEBUG,
            LogLevel::Info => crate::logging::level::INFO,
            LogLevel::Warn => crate::logging::level::WARN,
            LogLevel::Error => crate::logging::level::ERROR,
        })
    }

    /// Get log format override from CLI arguments
    pub fn log_format_override(&self) -> Option<&'static str> {
        match &self.command {
            Some(Commands::Run(args)) => args.log_format.as_ref().map(|fmt| match fmt {
                LogFormat::Json => crate::logging::format::JSON,
                LogFormat::Pretty => crate::logging::format::PRETTY,
                LogFormat::Compact => crate::logging::format::COMPACT,
            }),
            _ => None,
        }
    }

    /// Resolve the effective configuration: defaults, TOML file, environment
    /// (process first, then the env file), then `run` flags
    pub fn load_config(&self) -> Result<SystemConfig> {
        let env = EnvLookup::discover(self.env_file.as_deref())?;
        if let Some(source) = env.source() {
            debug!(path = %source.display(), "Using environment file");
        }
        let mut config = SystemConfig::load(self.config.as_deref(), |key| env.get(key))?;

        if let Some(Commands::Run(args)) = &self.command {
            args.apply_overrides(&mut config);
        }

        Ok(config)
    }
}

/// Run the webhook server
#[instrument(skip_all)]
pub async fn run_server(config: SystemConfig) -> Result<()> {
    if let Err(e) = config.validate().await {
        error!(error = %e, "Configuration is invalid, refusing to start");
        return Err(e);
    }

    info!(
        bind = %config.server.bind,
        port = config.server.port,
        deploy_timeout = config.deploy.timeout,
        "Configuration loaded successfully"
    );

    let shutdown_signal = setup_shutdown_signal();

    crate::http::start_server(config, shutdown_signal).await
}

/// Validate configuration and report the result
#[instrument(skip_all)]
pub async fn validate_config(config: SystemConfig) -> Result<()> {
    info!("Validating configuration...");

    match config.validate().await {
        Ok(()) => {
            info!(
                bind = %config.server.bind,
                port = config.server.port,
                token = %config
                    .auth
                    .require_token()
                    .map(|token| token.masked())
                    .unwrap_or_default(),
                script = ?config.deploy.script,
                log_file = ?config.deploy.log_file,
                metrics_enabled = config.monitoring.metrics_enabled,
                "Configuration is valid"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Configuration validation failed");
            Err(e)
        }
    }
}

/// Show version and build information
#[instrument]
pub async fn show_version() -> Result<()> {
    println!("deployhook {}", env!("CARGO_PKG_VERSION"));
    println!("Description: {}", env!("CARGO_PKG_DESCRIPTION"));
    println!();

    println!("Build Information:");
    println!(
        "  Build Profile: {}",
        if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        }
    );
    println!();

    println!("Runtime Information:");
    println!("  Platform: {}", std::env::consts::OS);
    println!("  Architecture: {}", std::env::consts::ARCH);

    Ok(())
}

/// Set up graceful shutdown signal handling
pub async fn setup_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::try_parse_from([
            "deployhook",
            "--config",
            "/etc/deployhook.toml",
            "run",
            "--port",
            "8080",
            "--bind",
            "127.0.0.1",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/etc/deployhook.toml")));
        assert_eq!(cli.log_format_override(), Some("json"));
        assert_eq!(cli.log_level_override(), None);

        let Some(Commands::Run(args)) = &cli.command else {
            panic!("Expected run subcommand");
        };
        let mut config = SystemConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind, "127.0.0.1");
    }

    #[test]
    fn test_log_level_flags() {
        let cli = Cli::try_parse_from(["deployhook", "-v", "validate"]).unwrap();
        assert_eq!(cli.log_level_override(), Some("debug"));

        let cli = Cli::try_parse_from(["deployhook", "-q"]).unwrap();
        assert_eq!(cli.log_level_override(), Some("error"));
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["deployhook", "--log-level", "warn", "version"]).unwrap();
        assert_eq!(cli.log_level_override(), Some("warn"));

        assert!(Cli::try_parse_from(["deployhook", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_run_port_must_be_numeric() {
        assert!(Cli::try_parse_from(["deployhook", "run", "--port", "http"]).is_err());
        assert!(Cli::try_parse_from(["deployhook", "run", "--port", "70000"]).is_err());
    }

    #[test]
    fn test_load_config_from_file_and_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            "[server]\nport = 5000\n\n[deploy]\ntimeout = 30\n",
        )
        .unwrap();
        let env_path = dir.path().join("deploy.env");
        std::fs::write(&env_path, "DEPLOYHOOK_TEST_UNUSED=1\n").unwrap();

        let cli = Cli::try_parse_from([
            "deployhook",
            "--config",
            config_path.to_str().unwrap(),
            "--env-file",
            env_path.to_str().unwrap(),
            "run",
            "--port",
            "6000",
        ])
        .unwrap();

        let config = cli.load_config().unwrap();
        assert_eq!(config.deploy.timeout, 30);
        assert_eq!(config.server.port, 6000);
    }

    #[test]
    fn test_load_config_missing_env_file() {
        let cli =
            Cli::try_parse_from(["deployhook", "--env-file", "/nonexistent/deploy.env"]).unwrap();
        assert!(cli.load_config().is_err());
    }
}
