//! Configuration module for the slab-vault server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Bounds checking policy applied by the protocol handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CheckMode {
    /// Full offset + length checks on every read and write.
    #[default]
    Safe,
    /// Reproduce the historical admission checks: writes only compare
    /// `length` against the stored size and reads use wrapping arithmetic.
    Vulnerable,
}

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "slab-vault")]
#[command(author = "slab-vault authors")]
#[command(version = "0.1.0")]
#[command(about = "A single-connection server guarding one stored byte buffer", long_about = None)]
pub struct CliArgs {
    /// A single extra argument of any kind enables verbose logging
    #[arg(num_args = 0.., trailing_var_arg = true, allow_hyphen_values = true)]
    pub verbose: Vec<String>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:8080)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Listen backlog for pending connections
    #[arg(long)]
    pub backlog: Option<i32>,

    /// Bounds checking policy
    #[arg(long, value_enum)]
    pub mode: Option<CheckMode>,

    /// Log level used when verbose logging is on (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_backlog")]
    pub backlog: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            backlog: default_backlog(),
        }
    }
}

/// Protocol handler configuration
#[derive(Debug, Deserialize, Default)]
pub struct ProtocolConfig {
    #[serde(default)]
    pub mode: CheckMode,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_backlog() -> i32 {
    10
}

fn default_log_level() -> String {
    "debug".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub backlog: i32,
    pub mode: CheckMode,
    pub verbose: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            backlog: default_backlog(),
            mode: CheckMode::Safe,
            verbose: false,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from the process arguments and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they point at, if any.
    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let listen = cli.listen.unwrap_or(toml_config.server.listen);
        let listen = listen
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidListen(listen))?;

        Ok(Config {
            listen,
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog),
            mode: cli.mode.unwrap_or(toml_config.protocol.mode),
            verbose: cli.verbose.len() == 1,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }

    /// Filter directive for the tracing subscriber.
    pub fn log_filter(&self) -> &str {
        if self.verbose {
            &self.log_level
        } else {
            "off"
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidListen(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidListen(addr) => {
                write!(f, "Invalid listen address '{}'", addr)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Config {
        let cli = CliArgs::try_parse_from(args.iter().copied()).unwrap();
        Config::from_cli(cli).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.server.backlog, 10);
        assert_eq!(config.protocol.mode, CheckMode::Safe);
    }

    #[test]
    fn test_no_args_disables_logging() {
        let config = parse(&["slab-vault"]);
        assert!(!config.verbose);
        assert_eq!(config.log_filter(), "off");
        assert_eq!(config.listen, SocketAddr::from(([0, 0, 0, 0], 8080)));
        assert_eq!(config.mode, CheckMode::Safe);
    }

    #[test]
    fn test_any_positional_enables_logging() {
        let config = parse(&["slab-vault", "whatever"]);
        assert!(config.verbose);
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn test_hyphenated_positional_enables_logging() {
        for arg in ["-v", "--debug"] {
            let config = parse(&["slab-vault", arg]);
            assert!(config.verbose, "{arg} should enable logging");
            assert_eq!(config.listen, SocketAddr::from(([0, 0, 0, 0], 8080)));
        }
    }

    #[test]
    fn test_two_positionals_run_quietly() {
        let config = parse(&["slab-vault", "a", "b"]);
        assert!(!config.verbose);
        assert_eq!(config.log_filter(), "off");
    }

    #[test]
    fn test_cli_flags() {
        let config = parse(&[
            "slab-vault",
            "-l",
            "127.0.0.1:9000",
            "--backlog",
            "3",
            "--mode",
            "vulnerable",
        ]);
        assert_eq!(config.listen, SocketAddr::from(([127, 0, 0, 1], 9000)));
        assert_eq!(config.backlog, 3);
        assert_eq!(config.mode, CheckMode::Vulnerable);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "127.0.0.1:7000"
            backlog = 32

            [protocol]
            mode = "vulnerable"

            [logging]
            level = "trace"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:7000");
        assert_eq!(config.server.backlog, 32);
        assert_eq!(config.protocol.mode, CheckMode::Vulnerable);
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nlisten = \"127.0.0.1:7000\"\n[protocol]\nmode = \"vulnerable\""
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let config = parse(&["slab-vault", "-c", path, "--mode", "safe"]);
        assert_eq!(config.listen, SocketAddr::from(([127, 0, 0, 1], 7000)));
        assert_eq!(config.mode, CheckMode::Safe);
    }

    #[test]
    fn test_invalid_listen() {
        let cli = CliArgs::try_parse_from(["slab-vault", "-l", "nowhere"]).unwrap();
        assert!(matches!(
            Config::from_cli(cli),
            Err(ConfigError::InvalidListen(_))
        ));
    }
}
