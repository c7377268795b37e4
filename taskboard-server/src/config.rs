//! Configuration system for the Taskboard server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskboard/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

/// Errors that can occur when loading server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A setting has a value the server cannot run with.
    #[error("invalid setting `{name}`: {reason}")]
    Invalid {
        /// Name of the offending setting.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerConfigFile {
    server: ServerFileConfig,
    realtime: RealtimeFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    allowed_origins: Option<Vec<String>>,
}

/// `[realtime]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RealtimeFileConfig {
    channel_capacity: Option<usize>,
    outbound_buffer: Option<usize>,
    max_frame_size: Option<usize>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Taskboard server")]
pub struct ServerCliArgs {
    /// Address to bind the server to.
    #[arg(short, long, env = "TASKBOARD_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/taskboard/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Capacity of the broadcast channel before publishers wait.
    #[arg(long)]
    pub channel_capacity: Option<usize>,

    /// Events buffered per connection before it is treated as failed.
    #[arg(long)]
    pub outbound_buffer: Option<usize>,

    /// Largest accepted inbound WebSocket frame in bytes.
    #[arg(long)]
    pub max_frame_size: Option<usize>,

    /// Origin allowed by CORS; may be repeated.
    #[arg(long = "allow-origin", env = "TASKBOARD_ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKBOARD_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:5040`).
    pub bind_addr: String,
    /// Broadcast channel capacity.
    pub channel_capacity: usize,
    /// Per-connection outbound queue length.
    pub outbound_buffer: usize,
    /// Maximum inbound frame/message size in bytes.
    pub max_frame_size: usize,
    /// Origins allowed by CORS.
    pub allowed_origins: Vec<String>,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5040".to_string(),
            channel_capacity: 1024,
            outbound_buffer: 256,
            max_frame_size: 64 * 1024,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read or
    /// parsed, or if a resolved value is unusable.
    pub fn load(cli: &ServerCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        config.validate()?;
        Ok(config)
    }

    /// Resolve a `ServerConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &ServerCliArgs, file: &ServerConfigFile) -> Self {
        let defaults = Self::default();

        let allowed_origins = if cli.allowed_origins.is_empty() {
            file.server
                .allowed_origins
                .clone()
                .unwrap_or(defaults.allowed_origins)
        } else {
            cli.allowed_origins.clone()
        };

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            channel_capacity: cli
                .channel_capacity
                .or(file.realtime.channel_capacity)
                .unwrap_or(defaults.channel_capacity),
            outbound_buffer: cli
                .outbound_buffer
                .or(file.realtime.outbound_buffer)
                .unwrap_or(defaults.outbound_buffer),
            max_frame_size: cli
                .max_frame_size
                .or(file.realtime.max_frame_size)
                .unwrap_or(defaults.max_frame_size),
            allowed_origins,
            log_level: cli.log_level.clone(),
        }
    }

    /// Rejects values tokio channels cannot be built with.
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("channel_capacity", self.channel_capacity),
            ("outbound_buffer", self.outbound_buffer),
            ("max_frame_size", self.max_frame_size),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    name,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<ServerConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ServerConfigFile::default());
        };
        config_dir.join("taskboard").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
