// Config loading tests - AppConfig::load through the public API
//
// Environment overrides are process-wide, so every test here is serialized
// and starts from a clean slate.

use serial_test::serial;
use sheerwater_core::config::{AppConfig, ConfigError, TransportKind};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::tempdir;

const OVERRIDES: [&str; 3] = ["MCP_SERVER_URL", "ANTHROPIC_API_KEY", "SHEERWATER_MODEL"];

fn clear_overrides() {
    for key in OVERRIDES {
        // SAFETY: tests in this file are serialized.
        unsafe { env::remove_var(key) };
    }
}

fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("chat.toml");
    fs::write(&path, content).expect("Failed to write chat.toml");
    path
}

#[test]
#[serial]
fn returns_error_when_explicit_file_not_found() {
    clear_overrides();
    let result = AppConfig::load(Some(Path::new("/nonexistent/path/chat.toml")));
    assert!(matches!(result, Err(ConfigError::NotFound { .. })));
}

#[test]
#[serial]
fn empty_file_yields_defaults() {
    clear_overrides();
    let dir = tempdir().expect("tempdir");
    let path = write_config(dir.path(), "");

    let config = AppConfig::load(Some(&path)).expect("defaults");
    assert_eq!(config.server.transport, TransportKind::Sse);
    assert_eq!(config.server.url, "http://localhost:8000/sse");
    assert_eq!(config.connection.max_connect_attempts, 10);
    assert_eq!(config.connection.connect_retry_delay, Duration::from_secs(2));
    assert_eq!(config.connection.max_call_attempts, 3);
    assert_eq!(config.connection.call_backoff, Duration::from_secs(1));
    assert_eq!(config.model.max_rounds, 25);
    assert!(config.model.api_key.is_none());
}

#[test]
#[serial]
fn stdio_server_with_tuned_retries() {
    clear_overrides();
    let dir = tempdir().expect("tempdir");
    let path = write_config(
        dir.path(),
        r#"
[server]
transport = "stdio"
command = "uv"
args = ["run", "sheerwater-mcp"]
workdir = "/srv/sheerwater"

[server.env]
SHEERWATER_CACHE = "/tmp/cache"

[connection]
max_connect_attempts = 4
connect_retry_delay_ms = 250
call_backoff_ms = 50

[model]
model = "claude-3-5-haiku-latest"
max_rounds = 8
"#,
    );

    let config = AppConfig::load(Some(&path)).expect("config");
    assert_eq!(config.server.transport, TransportKind::Stdio);
    assert_eq!(config.server.endpoint(), "uv");
    assert_eq!(config.server.args, vec!["run", "sheerwater-mcp"]);
    assert_eq!(
        config.server.env.get("SHEERWATER_CACHE").map(String::as_str),
        Some("/tmp/cache")
    );
    assert_eq!(config.connection.max_connect_attempts, 4);
    assert_eq!(config.connection.connect_retry_delay, Duration::from_millis(250));
    assert_eq!(config.connection.max_call_attempts, 3);
    assert_eq!(config.connection.call_backoff, Duration::from_millis(50));
    assert_eq!(config.model.model, "claude-3-5-haiku-latest");
    assert_eq!(config.model.max_rounds, 8);
}

#[test]
#[serial]
fn environment_overrides_win_over_file() {
    clear_overrides();
    let dir = tempdir().expect("tempdir");
    let path = write_config(
        dir.path(),
        r#"
[server]
url = "http://tools.internal:8000/sse"

[model]
api_key = "from-file"
model = "claude-3-5-haiku-latest"
"#,
    );
    // SAFETY: tests in this file are serialized.
    unsafe {
        env::set_var("MCP_SERVER_URL", "http://override:9000/sse");
        env::set_var("ANTHROPIC_API_KEY", "from-env");
        env::set_var("SHEERWATER_MODEL", "");
    }

    let config = AppConfig::load(Some(&path)).expect("config");
    clear_overrides();

    assert_eq!(config.server.url, "http://override:9000/sse");
    assert_eq!(config.model.api_key.as_deref(), Some("from-env"));
    // Empty overrides are ignored.
    assert_eq!(config.model.model, "claude-3-5-haiku-latest");
}

#[test]
#[serial]
fn rejects_invalid_values() {
    clear_overrides();
    let dir = tempdir().expect("tempdir");

    let zero = write_config(dir.path(), "[connection]\nmax_call_attempts = 0\n");
    assert!(matches!(
        AppConfig::load(Some(&zero)),
        Err(ConfigError::ZeroValue {
            field: "max_call_attempts",
            ..
        })
    ));

    let stdio = write_config(dir.path(), "[server]\ntransport = \"stdio\"\n");
    assert!(matches!(
        AppConfig::load(Some(&stdio)),
        Err(ConfigError::MissingCommand)
    ));

    let broken = write_config(dir.path(), "[model\nmodel = 1");
    let err = AppConfig::load(Some(&broken)).expect_err("parse error");
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(!err.user_message().is_empty());
}
