//! Configuration management for the geosense service.
//!
//! Configuration is layered from multiple sources, later ones overriding earlier ones:
//! 1. Default configuration (embedded in binary)
//! 2. System-wide configuration file (`/etc/geosense/config.toml`)
//! 3. User-specified configuration file (`--config`)
//! 4. Environment variables (prefixed with `GEOSENSE_`, `__` between levels,
//!    e.g. `GEOSENSE_ENGINE__CONNECTION`)
//! 5. Command-line arguments
//!
//! The storage location is resolved once at startup and handed to the store.

use clap::Args;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");
const DEFAULT_CONFIG_PATH: &str = "/etc/geosense/config.toml";

/// Command-line options that feed the configuration layers.
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigArgs {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Storage engine type
    #[arg(long, global = true)]
    pub engine: Option<String>,

    /// Storage engine connection string (file path or ":memory:")
    #[arg(long, global = true)]
    pub engine_connection: Option<String>,

    /// Storage engine options (key=value, repeatable)
    #[arg(long, value_name = "KEY=VAL", global = true)]
    pub engine_options: Vec<String>,

    /// Log filter directive, e.g. "geosense=debug"
    #[arg(long, global = true)]
    pub log_filter: Option<String>,
}

/// Complete service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Engine configuration
    pub engine: EngineConfig,
    /// Logging configuration
    pub log: LogConfig,
}

/// Storage engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Engine type (only "duckdb")
    pub engine: String,
    /// Connection string for the engine
    pub connection: String,
    /// Engine-specific options
    #[serde(default)]
    pub options: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineConfig {
                engine: "duckdb".to_string(),
                connection: ":memory:".to_string(),
                options: HashMap::new(),
            },
            log: LogConfig {
                filter: "info".to_string(),
            },
        }
    }
}

/// Splits `key=value` pairs, skipping malformed entries.
fn parse_options(options: &[String]) -> HashMap<String, String> {
    options
        .iter()
        .filter_map(|opt| opt.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

impl Settings {
    /// Loads configuration from all available sources.
    pub fn new(args: &ConfigArgs) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::from(PathBuf::from(DEFAULT_CONFIG_PATH)).required(false));

        if let Some(ref config_path) = args.config {
            builder = builder.add_source(File::from(config_path.clone()));
        }

        builder = builder.add_source(
            Environment::with_prefix("GEOSENSE")
                .prefix_separator("_")
                .separator("__"),
        );

        if let Some(ref engine) = args.engine {
            builder = builder.set_override("engine.engine", engine.as_str())?;
        }
        if let Some(ref connection) = args.engine_connection {
            builder = builder.set_override("engine.connection", connection.as_str())?;
        }
        if !args.engine_options.is_empty() {
            builder = builder.set_override("engine.options", parse_options(&args.engine_options))?;
        }
        if let Some(ref filter) = args.log_filter {
            builder = builder.set_override("log.filter", filter.as_str())?;
        }

        builder.build()?.try_deserialize()
    }
}
