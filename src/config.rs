//! Configuration module for nagstack
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - User configuration (~/.nagstack.toml)
//! - Project configuration (./nagstack.toml)
//! - Environment variables
//! - Command-line arguments
//!
//! The deployment target (`CDK_DEFAULT_ACCOUNT` / `CDK_DEFAULT_REGION`) and the SSH
//! public key are not part of the file configuration; they are read once into
//! [`Settings`] at startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::nag::ReportFormat;

/// Environment variable holding the SSH public key installed on the instance.
pub const SSH_PUB_KEY_VAR: &str = "SSH_PUB_KEY";
/// Environment variable holding the target account.
pub const ACCOUNT_VAR: &str = "CDK_DEFAULT_ACCOUNT";
/// Environment variable holding the target region.
pub const REGION_VAR: &str = "CDK_DEFAULT_REGION";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// App settings
    pub app: AppConfig,

    /// Policy check settings
    pub nag: NagConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Colors and output settings
    pub colors: ColorsConfig,
}

/// App settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Stack id (and default physical name)
    pub stack_name: String,

    /// Cloud assembly output directory
    pub output_dir: PathBuf,

    /// Bootstrap qualifier
    pub bootstrap_qualifier: String,

    /// Template description
    pub description: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            stack_name: "NaggingCanBeGoodStack".to_string(),
            output_dir: PathBuf::from("cdk.out"),
            bootstrap_qualifier: crate::template::DEFAULT_QUALIFIER.to_string(),
            description: None,
        }
    }
}

/// Policy check settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NagConfig {
    /// Register the AwsSolutions pack on the app
    pub enabled: bool,

    /// Append rule explanations to findings
    pub verbose: bool,

    /// Record suppressed findings as info annotations
    pub log_ignores: bool,

    /// Write compliance reports into the assembly
    pub reports: bool,

    /// Report formats
    pub report_formats: Vec<ReportFormat>,
}

impl Default for NagConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            verbose: false,
            log_ignores: false,
            reports: true,
            report_formats: vec![ReportFormat::Csv],
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub log_level: String,

    /// Log format: `pretty` or `json`
    pub log_format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Colors and output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorsConfig {
    /// Enable colors
    pub enabled: bool,
}

impl Default for ColorsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Config::default();

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                config = config.merge_from_file(&path)?;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Get the list of configuration file paths to check
    fn get_config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        if let Some(path) = explicit_path {
            return vec![path.clone()];
        }

        if let Ok(env_config) = std::env::var("NAGSTACK_CONFIG") {
            return vec![PathBuf::from(env_config)];
        }

        let mut paths = Vec::new();

        // User config
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".nagstack.toml"));
        }

        // Project config (current directory)
        paths.push(PathBuf::from("nagstack.toml"));

        paths
    }

    /// Merge configuration from a file
    fn merge_from_file(&self, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let parsed: std::result::Result<Config, String> = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
            "json" => serde_json::from_str(&content).map_err(|e| e.to_string()),
            _ => toml::from_str(&content).map_err(|e| e.to_string()),
        };
        let file_config = parsed.map_err(|e| {
            crate::error::Error::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })?;

        Ok(self.merge(file_config))
    }

    /// Merge another config into this one; values that differ from the defaults win
    pub fn merge(&self, other: Config) -> Config {
        let defaults = Config::default();

        fn pick<T: PartialEq>(base: &T, other: T, default: &T) -> T
        where
            T: Clone,
        {
            if &other != default {
                other
            } else {
                base.clone()
            }
        }

        Config {
            app: AppConfig {
                stack_name: pick(&self.app.stack_name, other.app.stack_name, &defaults.app.stack_name),
                output_dir: pick(&self.app.output_dir, other.app.output_dir, &defaults.app.output_dir),
                bootstrap_qualifier: pick(
                    &self.app.bootstrap_qualifier,
                    other.app.bootstrap_qualifier,
                    &defaults.app.bootstrap_qualifier,
                ),
                description: other.app.description.or_else(|| self.app.description.clone()),
            },
            nag: NagConfig {
                enabled: pick(&self.nag.enabled, other.nag.enabled, &defaults.nag.enabled),
                verbose: pick(&self.nag.verbose, other.nag.verbose, &defaults.nag.verbose),
                log_ignores: pick(
                    &self.nag.log_ignores,
                    other.nag.log_ignores,
                    &defaults.nag.log_ignores,
                ),
                reports: pick(&self.nag.reports, other.nag.reports, &defaults.nag.reports),
                report_formats: pick(
                    &self.nag.report_formats,
                    other.nag.report_formats,
                    &defaults.nag.report_formats,
                ),
            },
            logging: LoggingConfig {
                log_level: pick(
                    &self.logging.log_level,
                    other.logging.log_level,
                    &defaults.logging.log_level,
                ),
                log_format: pick(
                    &self.logging.log_format,
                    other.logging.log_format,
                    &defaults.logging.log_format,
                ),
            },
            colors: ColorsConfig {
                enabled: pick(&self.colors.enabled, other.colors.enabled, &defaults.colors.enabled),
            },
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        // CDK_OUTDIR (set by the cdk CLI when it runs the app)
        if let Ok(outdir) = std::env::var("CDK_OUTDIR") {
            if !outdir.is_empty() {
                self.app.output_dir = PathBuf::from(outdir);
            }
        }

        // NAGSTACK_STACK_NAME
        if let Ok(name) = std::env::var("NAGSTACK_STACK_NAME") {
            self.app.stack_name = name;
        }

        // NAGSTACK_NAG_VERBOSE
        if let Ok(value) = std::env::var("NAGSTACK_NAG_VERBOSE") {
            self.nag.verbose = parse_bool("NAGSTACK_NAG_VERBOSE", &value)?;
        }

        // NAGSTACK_LOG_LEVEL
        if let Ok(level) = std::env::var("NAGSTACK_LOG_LEVEL") {
            self.logging.log_level = level;
        }

        // NAGSTACK_LOG_FORMAT
        if let Ok(format) = std::env::var("NAGSTACK_LOG_FORMAT") {
            self.logging.log_format = format;
        }

        // NO_COLOR
        if std::env::var("NO_COLOR").is_ok() || std::env::var("NAGSTACK_NO_COLOR").is_ok() {
            self.colors.enabled = false;
        }

        Ok(())
    }

    /// Reject values that cannot be acted on
    fn validate(&self) -> Result<()> {
        if self.app.stack_name.is_empty() || self.app.stack_name.contains('/') {
            return Err(crate::error::Error::InvalidConfig {
                key: "app.stack_name".to_string(),
                message: format!("'{}' is not a valid construct id", self.app.stack_name),
            }
            .into());
        }
        if !matches!(self.logging.log_format.as_str(), "pretty" | "json") {
            return Err(crate::error::Error::InvalidConfig {
                key: "logging.log_format".to_string(),
                message: format!("expected 'pretty' or 'json', got '{}'", self.logging.log_format),
            }
            .into());
        }
        Ok(())
    }

    /// Load from a specific file, without environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Config::default().merge_from_file(path.as_ref())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(crate::error::Error::InvalidConfig {
            key: key.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }
        .into()),
    }
}

/// Deployment target of a stack.
///
/// Missing values make the stack environment-agnostic: the template then relies on
/// the `AWS::AccountId` / `AWS::Region` pseudo parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub account: Option<String>,
    pub region: Option<String>,
}

impl Environment {
    /// Build from explicit values; empty strings count as unset.
    pub fn new(account: Option<String>, region: Option<String>) -> Self {
        Self {
            account: account.filter(|a| !a.is_empty()),
            region: region.filter(|r| !r.is_empty()),
        }
    }

    /// Read `CDK_DEFAULT_ACCOUNT` and `CDK_DEFAULT_REGION`. Values are not validated.
    pub fn from_env() -> Self {
        Self::new(std::env::var(ACCOUNT_VAR).ok(), std::env::var(REGION_VAR).ok())
    }

    /// True when neither account nor region is known.
    pub fn is_agnostic(&self) -> bool {
        self.account.is_none() && self.region.is_none()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "aws://{}/{}",
            self.account.as_deref().unwrap_or("unknown-account"),
            self.region.as_deref().unwrap_or("unknown-region")
        )
    }
}

/// Everything the entry point needs, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub config: Config,
    /// Raw value of `SSH_PUB_KEY`; validated when the stack is declared
    pub ssh_pub_key: String,
    pub environment: Environment,
}

impl Settings {
    /// Combine a loaded config with the process environment.
    pub fn from_env(config: Config) -> Self {
        Self {
            config,
            ssh_pub_key: std::env::var(SSH_PUB_KEY_VAR).unwrap_or_default(),
            environment: Environment::from_env(),
        }
    }
}
