//! Configuration module for frame-router.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::codec::DEFAULT_MAX_BODY_LEN;
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "frame-router")]
#[command(author = "frame-router authors")]
#[command(version = "0.1.0")]
#[command(about = "A routing TCP server for a length-prefixed binary protocol", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to serve on (e.g., 0.0.0.0:9000); repeat for several servers.
    /// Replaces the servers listed in the config file.
    #[arg(short = 'l', long)]
    pub listen: Vec<String>,

    /// Number of runtime worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Largest accepted packet body in bytes
    #[arg(long)]
    pub max_body_len: Option<u32>,

    /// Listen backlog per server
    #[arg(long)]
    pub backlog: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Directory for daily rolling log files (console only when unset)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Log line format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize)]
pub struct TomlConfig {
    #[serde(default = "default_servers", rename = "server")]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub codec: CodecConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            runtime: RuntimeConfig::default(),
            codec: CodecConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Transport family a server listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// IPv4 or IPv6, whichever the host resolves to first.
    #[default]
    Tcp,
    Tcp4,
    Tcp6,
}

impl Network {
    /// Whether a resolved address belongs to this network.
    pub fn accepts(self, addr: &SocketAddr) -> bool {
        match self {
            Network::Tcp => true,
            Network::Tcp4 => addr.is_ipv4(),
            Network::Tcp6 => addr.is_ipv6(),
        }
    }
}

/// One listening server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Name used in logs
    pub name: String,
    #[serde(default)]
    pub network: Network,
    /// Host or address to bind
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

/// Runtime-related configuration
#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    /// Number of worker threads
    pub workers: Option<usize>,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: None,
            backlog: default_backlog(),
        }
    }
}

/// Codec-related configuration
#[derive(Debug, Deserialize)]
pub struct CodecConfig {
    /// Largest accepted body in bytes
    #[serde(default = "default_max_body_len")]
    pub max_body_len: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_body_len: default_max_body_len(),
        }
    }
}

/// Shape of each log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line events.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for daily rolling log files
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            format: LogFormat::default(),
        }
    }
}

fn default_servers() -> Vec<ServerConfig> {
    vec![ServerConfig {
        name: "default".to_string(),
        network: Network::Tcp,
        host: default_host(),
        port: 9000,
    }]
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_backlog() -> u32 {
    1024
}

fn default_max_body_len() -> u32 {
    DEFAULT_MAX_BODY_LEN
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub servers: Vec<ServerConfig>,
    pub workers: Option<usize>,
    pub backlog: u32,
    pub max_body_len: u32,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Merge parsed CLI args over the TOML file they point at.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|source| ConfigError::FileRead {
                    path: config_path.clone(),
                    source,
                })?;
            toml::from_str(&contents)
                .map_err(|source| ConfigError::TomlParse {
                    path: config_path.clone(),
                    source,
                })?
        } else {
            TomlConfig::default()
        };

        let servers = if cli.listen.is_empty() {
            toml_config.servers
        } else {
            cli.listen
                .iter()
                .enumerate()
                .map(|(i, listen)| parse_listen(&format!("server-{}", i + 1), listen))
                .collect::<Result<Vec<_>, _>>()?
        };

        let config = Config {
            servers,
            workers: cli.workers.or(toml_config.runtime.workers),
            backlog: cli.backlog.unwrap_or(toml_config.runtime.backlog),
            max_body_len: cli.max_body_len.unwrap_or(toml_config.codec.max_body_len),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
            log_dir: cli.log_dir.or(toml_config.logging.dir),
            log_format: cli.log_format.unwrap_or(toml_config.logging.format),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot be served.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::Invalid("no servers configured".to_string()));
        }

        let mut names = HashSet::new();
        let mut ports = HashSet::new();
        for server in &self.servers {
            if server.name.is_empty() {
                return Err(ConfigError::Invalid("server name must not be empty".to_string()));
            }
            if !names.insert(server.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate server name '{}'",
                    server.name
                )));
            }
            // Port 0 asks the OS for an ephemeral port and may repeat.
            if server.port != 0 && !ports.insert(server.port) {
                return Err(ConfigError::Invalid(format!(
                    "port {} used by more than one server",
                    server.port
                )));
            }
        }

        if self.workers == Some(0) {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        if self.backlog == 0 {
            return Err(ConfigError::Invalid("backlog must be at least 1".to_string()));
        }
        if self.max_body_len == 0 {
            return Err(ConfigError::Invalid("max_body_len must be at least 1".to_string()));
        }

        Ok(())
    }
}

/// Parse `host:port` (or `[v6]:port`) into a server entry.
fn parse_listen(name: &str, listen: &str) -> Result<ServerConfig, ConfigError> {
    let invalid = || ConfigError::InvalidListen(listen.to_string());

    let (host, port) = listen.rsplit_once(':').ok_or_else(invalid)?;
    let port: u16 = port.parse().map_err(|_| invalid())?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid());
    }

    Ok(ServerConfig {
        name: name.to_string(),
        network: Network::Tcp,
        host: host.to_string(),
        port,
    })
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid listen address '{0}', expected host:port")]
    InvalidListen(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
