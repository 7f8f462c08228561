//! Integration tests for the nagstack configuration system
//!
//! These tests cover:
//! - Default values for every section
//! - Loading TOML, YAML and JSON files
//! - Environment variable overrides and their precedence over files
//! - Validation errors

use nagstack::config::{Config, Environment, Settings};
use nagstack::nag::ReportFormat;
use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;
use tempfile::tempdir;

const ENV_VARS: &[&str] = &[
    "CDK_OUTDIR",
    "NAGSTACK_STACK_NAME",
    "NAGSTACK_NAG_VERBOSE",
    "NAGSTACK_LOG_LEVEL",
    "NAGSTACK_LOG_FORMAT",
    "NAGSTACK_NO_COLOR",
    "NO_COLOR",
    "NAGSTACK_CONFIG",
];

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

fn write_config(dir: &std::path::Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

// ============================================================================
// Defaults
// ============================================================================

#[test]
fn test_default_config_values() {
    let config = Config::default();

    assert_eq!(config.app.stack_name, "NaggingCanBeGoodStack");
    assert_eq!(config.app.output_dir, PathBuf::from("cdk.out"));
    assert_eq!(config.app.bootstrap_qualifier, "hnb659fds");
    assert_eq!(config.app.description, None);

    assert!(config.nag.enabled);
    assert!(!config.nag.verbose);
    assert!(!config.nag.log_ignores);
    assert!(config.nag.reports);
    assert_eq!(config.nag.report_formats, vec![ReportFormat::Csv]);

    assert_eq!(config.logging.log_level, "warn");
    assert_eq!(config.logging.log_format, "pretty");
    assert!(config.colors.enabled);
}

#[test]
fn test_environment_display() {
    assert_eq!(
        Environment::default().to_string(),
        "aws://unknown-account/unknown-region"
    );
    let env = Environment::new(Some("123456789012".into()), Some(String::new()));
    assert_eq!(env.region, None);
    assert!(!env.is_agnostic());
    assert_eq!(env.to_string(), "aws://123456789012/unknown-region");
}

// ============================================================================
// File loading
// ============================================================================

#[test]
#[serial]
fn test_load_toml_file() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = write_config(
        dir.path(),
        "nagstack.toml",
        r#"
[app]
stack_name = "WorkshopDev"
description = "Workshop stack"

[nag]
verbose = true
report_formats = ["csv", "json"]

[logging]
log_level = "debug"
"#,
    );

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.app.stack_name, "WorkshopDev");
    assert_eq!(config.app.description.as_deref(), Some("Workshop stack"));
    assert!(config.nag.verbose);
    assert_eq!(
        config.nag.report_formats,
        vec![ReportFormat::Csv, ReportFormat::Json]
    );
    assert_eq!(config.logging.log_level, "debug");
    // Untouched sections keep their defaults
    assert_eq!(config.app.output_dir, PathBuf::from("cdk.out"));
    assert!(config.nag.enabled);
}

#[test]
#[serial]
fn test_load_yaml_file() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = write_config(
        dir.path(),
        "nagstack.yml",
        "nag:\n  enabled: false\ncolors:\n  enabled: false\n",
    );

    let config = Config::load(Some(&path)).unwrap();
    assert!(!config.nag.enabled);
    assert!(!config.colors.enabled);
}

#[test]
#[serial]
fn test_load_json_file() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = write_config(
        dir.path(),
        "nagstack.json",
        r#"{"app": {"output_dir": "build/assembly"}, "nag": {"log_ignores": true}}"#,
    );

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.app.output_dir, PathBuf::from("build/assembly"));
    assert!(config.nag.log_ignores);
}

#[test]
#[serial]
fn test_broken_file_is_an_error() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = write_config(dir.path(), "nagstack.toml", "[app\nstack_name = ");

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
    assert_eq!(err.downcast_ref::<nagstack::Error>().unwrap().exit_code(), 4);
}

#[test]
#[serial]
fn test_config_path_from_environment() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = write_config(dir.path(), "custom.toml", "[app]\nstack_name = \"FromEnvFile\"\n");
    std::env::set_var("NAGSTACK_CONFIG", &path);

    let config = Config::load(None).unwrap();
    clear_env();
    assert_eq!(config.app.stack_name, "FromEnvFile");
}

// ============================================================================
// Environment overrides
// ============================================================================

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = write_config(
        dir.path(),
        "nagstack.toml",
        "[app]\nstack_name = \"FromFile\"\noutput_dir = \"file.out\"\n",
    );
    std::env::set_var("NAGSTACK_STACK_NAME", "FromEnv");
    std::env::set_var("CDK_OUTDIR", "/tmp/cdk-assembly");

    let config = Config::load(Some(&path)).unwrap();
    clear_env();
    assert_eq!(config.app.stack_name, "FromEnv");
    assert_eq!(config.app.output_dir, PathBuf::from("/tmp/cdk-assembly"));
}

#[test]
#[serial]
fn test_no_color_env() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = write_config(dir.path(), "nagstack.toml", "");
    std::env::set_var("NO_COLOR", "1");

    let config = Config::load(Some(&path)).unwrap();
    clear_env();
    assert!(!config.colors.enabled);
}

#[test]
#[serial]
fn test_invalid_bool_env_is_rejected() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = write_config(dir.path(), "nagstack.toml", "");
    std::env::set_var("NAGSTACK_NAG_VERBOSE", "sometimes");

    let result = Config::load(Some(&path));
    clear_env();
    let err = result.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<nagstack::Error>(),
        Some(nagstack::Error::InvalidConfig { .. })
    ));
}

// ============================================================================
// Validation
// ============================================================================

#[test]
#[serial]
fn test_invalid_stack_name_is_rejected() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = write_config(dir.path(), "nagstack.toml", "[app]\nstack_name = \"a/b\"\n");

    let err = Config::load(Some(&path)).unwrap_err();
    let err = err.downcast_ref::<nagstack::Error>().unwrap();
    assert_eq!(err.exit_code(), 4);
}

#[test]
#[serial]
fn test_invalid_log_format_is_rejected() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = write_config(dir.path(), "nagstack.toml", "[logging]\nlog_format = \"xml\"\n");

    assert!(Config::load(Some(&path)).is_err());
}

// ============================================================================
// Settings
// ============================================================================

#[test]
#[serial]
fn test_settings_from_env() {
    std::env::set_var("SSH_PUB_KEY", "ssh-ed25519 AAAA test");
    std::env::set_var("CDK_DEFAULT_ACCOUNT", "123456789012");
    std::env::remove_var("CDK_DEFAULT_REGION");

    let settings = Settings::from_env(Config::default());
    std::env::remove_var("SSH_PUB_KEY");
    std::env::remove_var("CDK_DEFAULT_ACCOUNT");

    assert_eq!(settings.ssh_pub_key, "ssh-ed25519 AAAA test");
    assert_eq!(
        settings.environment,
        Environment::new(Some("123456789012".into()), None)
    );
}

#[test]
#[serial]
fn test_settings_without_key_defaults_to_empty() {
    std::env::remove_var("SSH_PUB_KEY");
    let settings = Settings::from_env(Config::default());
    assert_eq!(settings.ssh_pub_key, "");
}
