//! Configuration loading integration tests: file/env/CLI precedence and
//! validation, driven only through `Config::load`/`Config::validate` and a
//! real temp file on disk (no private helpers reached into).

use std::io::Write;

use plugin_runtime::cli::Cli;
use plugin_runtime::config::{Config, InstallMethod};
use serial_test::serial;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn missing_config_file_falls_back_to_defaults_and_still_validates() {
    let cli = Cli::default();
    let config = Config::load("/nonexistent/path/config.yaml", &cli).unwrap();
    assert_eq!(config.install.method, InstallMethod::Local);
    assert!(config.validate().is_ok());
}

#[test]
fn config_file_values_are_parsed_from_yaml() {
    let file = write_config(
        r#"
install:
  method: remote
  remote_host: daemon.internal
  remote_port: 6000
server:
  max_worker: 16
  max_request_timeout_secs: 60
  heartbeat_interval_secs: 5
daemon:
  base_url: "http://daemon.internal:5002"
"#,
    );
    let cli = Cli::default();
    let config = Config::load(file.path().to_str().unwrap(), &cli).unwrap();

    assert_eq!(config.install.method, InstallMethod::Remote);
    assert_eq!(config.install.remote_host.as_deref(), Some("daemon.internal"));
    assert_eq!(config.install.remote_port, 6000);
    assert_eq!(config.server.max_worker, 16);
    assert!(config.validate().is_ok());
}

#[test]
fn cli_port_override_wins_over_file_value() {
    let file = write_config(
        r#"
install:
  method: aws_lambda
  aws_lambda_port: 9000
"#,
    );
    let mut cli = Cli::default();
    cli.port = Some(7000);
    let config = Config::load(file.path().to_str().unwrap(), &cli).unwrap();
    assert_eq!(config.install.aws_lambda_port, 7000);
}

#[test]
fn cli_install_method_override_wins_over_file_value() {
    let file = write_config(
        r#"
install:
  method: local
"#,
    );
    let mut cli = Cli::default();
    cli.install_method = Some("aws_lambda".to_string());
    let config = Config::load(file.path().to_str().unwrap(), &cli).unwrap();
    assert_eq!(config.install.method, InstallMethod::AwsLambda);
}

#[test]
fn malformed_yaml_file_is_a_config_error() {
    let file = write_config("install:\n  method: [not, a, string]\n");
    let cli = Cli::default();
    let result = Config::load(file.path().to_str().unwrap(), &cli);
    assert!(result.is_err());
}

#[test]
fn validate_rejects_remote_install_missing_host() {
    let file = write_config(
        r#"
install:
  method: remote
"#,
    );
    let cli = Cli::default();
    let config = Config::load(file.path().to_str().unwrap(), &cli).unwrap();
    assert!(config.validate().is_err());
}

#[test]
#[serial]
fn env_var_overrides_file_value_for_max_worker() {
    std::env::set_var("MAX_WORKER", "77");
    let file = write_config("install:\n  method: local\n");
    let cli = Cli::default();
    let config = Config::load(file.path().to_str().unwrap(), &cli).unwrap();
    std::env::remove_var("MAX_WORKER");

    assert_eq!(config.server.max_worker, 77);
}

#[test]
#[serial]
fn env_var_overrides_reconnect_attempts() {
    std::env::set_var("REMOTE_RECONNECT_ATTEMPTS", "7");
    let file = write_config("install:\n  method: local\n");
    let cli = Cli::default();
    let config = Config::load(file.path().to_str().unwrap(), &cli).unwrap();
    std::env::remove_var("REMOTE_RECONNECT_ATTEMPTS");

    assert_eq!(config.install.reconnect_attempts, 7);
}

#[test]
fn default_reconnect_attempts_and_backoff_match_the_fixed_retry_contract() {
    let cli = Cli::default();
    let config = Config::load("/nonexistent/path/config.yaml", &cli).unwrap();
    assert_eq!(config.install.reconnect_attempts, 3);
    assert_eq!(config.install.reconnect_backoff_secs, 5);
}

#[test]
#[serial]
fn cli_override_applies_after_env_var_override() {
    std::env::set_var("INSTALL_METHOD", "remote");
    let mut cli = Cli::default();
    cli.install_method = Some("local".to_string());
    let config = Config::load("/nonexistent/path/config.yaml", &cli).unwrap();
    std::env::remove_var("INSTALL_METHOD");

    // CLI is applied after env vars, so it wins the precedence race.
    assert_eq!(config.install.method, InstallMethod::Local);
}
