use crate::cli::{Cli, OutputFormat};
use crate::input::{DEFAULT_IN_CORE_LIMIT, DEFAULT_MAP_LIMIT, InputLimits};
use crate::sink::MIN_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default output region size for driver sessions
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Size in bytes of the region diagnostics are written to
    pub buffer_size: usize,
}

/// Input loading configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    /// Files up to this size are read into memory
    pub in_core_limit: u64,
    /// Files up to this size are mapped; larger files are rejected
    pub map_limit: u64,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format
    pub format: OutputFormatConfig,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode (errors only)
    pub quiet: bool,
}

/// Output format configuration (serializable version of CLI OutputFormat)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormatConfig {
    Human,
    Json,
}

impl From<OutputFormat> for OutputFormatConfig {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Human => OutputFormatConfig::Human,
            OutputFormat::Json => OutputFormatConfig::Json,
        }
    }
}

impl From<OutputFormatConfig> for OutputFormat {
    fn from(format: OutputFormatConfig) -> Self {
        match format {
            OutputFormatConfig::Human => OutputFormat::Human,
            OutputFormatConfig::Json => OutputFormat::Json,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            in_core_limit: DEFAULT_IN_CORE_LIMIT,
            map_limit: DEFAULT_MAP_LIMIT,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormatConfig::Human,
            verbose: false,
            quiet: false,
        }
    }
}

impl Config {
    pub fn input_limits(&self) -> InputLimits {
        InputLimits {
            in_core_limit: self.input.in_core_limit,
            map_limit: self.input.map_limit,
        }
    }
}

const CONFIG_NAMES: [&str; 2] = ["validate-rng.toml", "validate-rng.json"];

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: file -> environment -> CLI
    pub fn load_config(cli: &Cli) -> ConfigResult<Config> {
        Self::load_config_with(&SystemEnvProvider, cli)
    }

    pub fn load_config_with(env: &impl EnvProvider, cli: &Cli) -> ConfigResult<Config> {
        let mut config = if let Some(config_path) = &cli.config {
            Self::load_from_file(config_path)?
        } else {
            Self::find_config_file()?.unwrap_or_default()
        };

        config = Self::apply_environment_overrides_with(env, config)?;
        config = Self::merge_with_cli(config, cli);

        Self::validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub fn load_from_file(path: &Path) -> ConfigResult<Config> {
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find configuration file in standard locations
    pub fn find_config_file() -> ConfigResult<Option<Config>> {
        Self::search_paths()
            .into_iter()
            .find(|path| path.is_file())
            .map(|path| Self::load_from_file(&path))
            .transpose()
    }

    /// Candidate configuration files, in lookup order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = CONFIG_NAMES.iter().map(PathBuf::from).collect();
        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("validate-rng");
            paths.push(app_config_dir.join("config.toml"));
            paths.push(app_config_dir.join("config.json"));
        }
        paths
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> ConfigResult<Config> {
        if let Some(value) = env_value(env, "VALIDATE_RNG_BUFFER_SIZE")? {
            config.session.buffer_size = value;
        }
        if let Some(value) = env_value(env, "VALIDATE_RNG_IN_CORE_LIMIT")? {
            config.input.in_core_limit = value;
        }
        if let Some(value) = env_value(env, "VALIDATE_RNG_MAP_LIMIT")? {
            config.input.map_limit = value;
        }
        if let Some(value) = env_value(env, "VALIDATE_RNG_VERBOSE")? {
            config.output.verbose = value;
        }
        if let Some(value) = env_value(env, "VALIDATE_RNG_QUIET")? {
            config.output.quiet = value;
        }

        if let Some(format) = env.get("VALIDATE_RNG_FORMAT") {
            config.output.format = match format.to_lowercase().as_str() {
                "human" => OutputFormatConfig::Human,
                "json" => OutputFormatConfig::Json,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid VALIDATE_RNG_FORMAT value: {}",
                        format
                    )));
                }
            };
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence)
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        if let Some(buffer_size) = cli.buffer_size {
            config.session.buffer_size = buffer_size;
        }
        if let Some(format) = cli.format {
            config.output.format = format.into();
        }
        if cli.verbose {
            config.output.verbose = true;
            config.output.quiet = false;
        }
        if cli.quiet {
            config.output.quiet = true;
            config.output.verbose = false;
        }
        config
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> ConfigResult<()> {
        if config.session.buffer_size < MIN_CAPACITY {
            return Err(ConfigError::Validation(format!(
                "Buffer size must be at least {} bytes",
                MIN_CAPACITY
            )));
        }
        if config.session.buffer_size > i32::MAX as usize {
            return Err(ConfigError::Validation(
                "Buffer size cannot exceed 2 GiB".to_string(),
            ));
        }

        if config.input.in_core_limit > config.input.map_limit {
            return Err(ConfigError::Validation(
                "In-core limit cannot exceed the map limit".to_string(),
            ));
        }
        if config.input.map_limit > DEFAULT_MAP_LIMIT {
            return Err(ConfigError::Validation(
                "Map limit cannot exceed 1 GiB".to_string(),
            ));
        }

        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_value<T: std::str::FromStr>(env: &impl EnvProvider, key: &str) -> ConfigResult<Option<T>> {
    env.get(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Environment(format!("Invalid {} value: {}", key, value)))
        })
        .transpose()
}
