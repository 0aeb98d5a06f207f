//! Configuration loading from the environment and from TOML files

use serial_test::serial;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

use blockwatch::config::Config;

const VARS: &[&str] = &[
    "BLOCKWATCH_COUNTRIES",
    "BLOCKWATCH_INTERVAL_SECS",
    "BLOCKWATCH_PROBE_TIMEOUT",
    "BLOCKWATCH_CONNECT_TIMEOUT",
    "BLOCKWATCH_SQLITE_PATH",
    "BLOCKWATCH_TELEGRAM_TOKEN",
    "BLOCKWATCH_TELEGRAM_API",
    "BLOCKWATCH_QUEUE_CAPACITY",
    "BLOCKWATCH_SENDS_PER_SECOND",
    "BLOCKWATCH_METRICS_ADDR",
    "BLOCKWATCH_LOG_LEVEL",
    "BLOCKWATCH_LOG_FORMAT",
    "BLOCKWATCH_LOG_DIR",
    "TG_TOKEN",
];

fn clear_env() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_defaults_from_empty_env() {
    clear_env();

    let config = Config::from_env().unwrap();
    config.validate().unwrap();

    let codes: Vec<&str> = config.checker.countries.iter().map(|c| c.as_str()).collect();
    assert_eq!(codes, vec!["RU", "BY"]);
    assert_eq!(config.interval(), Duration::from_secs(300));
    assert_eq!(config.probe_timeout(), Duration::from_secs(20));
    assert_eq!(config.notifications.queue_capacity, 50);
    assert_eq!(config.notifications.sends_per_second, 30);
    assert!(config.notifications.telegram_token.is_none());
    assert!(config.metrics.listen_addr.is_none());
    assert!(config.logging.directory.is_none());
}

#[test]
#[serial]
fn test_log_directory_from_env() {
    clear_env();
    std::env::set_var("BLOCKWATCH_LOG_DIR", "log");

    let config = Config::from_env().unwrap();
    clear_env();

    assert_eq!(
        config.logging.directory.as_deref(),
        Some(std::path::Path::new("log"))
    );
}

#[test]
#[serial]
fn test_env_overrides() {
    clear_env();
    std::env::set_var("BLOCKWATCH_COUNTRIES", "kz, ru");
    std::env::set_var("BLOCKWATCH_INTERVAL_SECS", "60");
    std::env::set_var("BLOCKWATCH_SENDS_PER_SECOND", "10");
    std::env::set_var("BLOCKWATCH_METRICS_ADDR", "127.0.0.1:9100");
    std::env::set_var("BLOCKWATCH_TELEGRAM_TOKEN", "primary");
    std::env::set_var("TG_TOKEN", "fallback");

    let config = Config::from_env().unwrap();
    clear_env();

    let codes: Vec<&str> = config.checker.countries.iter().map(|c| c.as_str()).collect();
    assert_eq!(codes, vec!["KZ", "RU"]);
    assert_eq!(config.interval(), Duration::from_secs(60));
    assert_eq!(config.notifications.sends_per_second, 10);
    assert_eq!(
        config.metrics.listen_addr.unwrap().to_string(),
        "127.0.0.1:9100"
    );
    assert_eq!(config.require_telegram_token().unwrap(), "primary");
}

#[test]
#[serial]
fn test_tg_token_fallback() {
    clear_env();
    std::env::set_var("TG_TOKEN", "123:abc");

    let config = Config::from_env().unwrap();
    clear_env();

    assert_eq!(config.require_telegram_token().unwrap(), "123:abc");
}

#[test]
#[serial]
fn test_invalid_country_is_rejected() {
    clear_env();
    std::env::set_var("BLOCKWATCH_COUNTRIES", "RU,Russia");

    let result = Config::from_env();
    clear_env();

    let err = format!("{:#}", result.unwrap_err());
    assert!(err.contains("BLOCKWATCH_COUNTRIES"), "{err}");
    assert!(err.contains("Russia"), "{err}");
}

#[test]
#[serial]
fn test_invalid_metrics_addr_is_rejected() {
    clear_env();
    std::env::set_var("BLOCKWATCH_METRICS_ADDR", "not an address");

    let result = Config::from_env();
    clear_env();

    assert!(result.is_err());
}

#[test]
fn test_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[checker]
countries = ["RU", "BY", "KZ"]
interval_secs = 120
probe_timeout_secs = 15
connect_timeout_secs = 5

[database]
sqlite_path = "/var/lib/blockwatch/state.db"

[notifications]
telegram_token = "123:abc"
telegram_api_base = "https://api.telegram.org"
queue_capacity = 10
sends_per_second = 30

[metrics]
listen_addr = "0.0.0.0:9100"

[logging]
level = "debug"
format = "json"
directory = "/var/log/blockwatch"
"#
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.checker.countries.len(), 3);
    assert_eq!(config.checker.countries[2].as_str(), "KZ");
    assert_eq!(config.interval(), Duration::from_secs(120));
    assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    assert_eq!(config.notifications.queue_capacity, 10);
    assert_eq!(config.logging.format, "json");
    assert_eq!(
        config.logging.directory.unwrap(),
        std::path::PathBuf::from("/var/log/blockwatch")
    );
    assert!(config.metrics.listen_addr.is_some());
}

#[test]
fn test_from_file_rejects_bad_country() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[checker]
countries = ["RUS"]
interval_secs = 120
probe_timeout_secs = 15
connect_timeout_secs = 5

[database]
sqlite_path = "state.db"

[notifications]
telegram_api_base = "https://api.telegram.org"
queue_capacity = 10
sends_per_second = 30

[logging]
level = "info"
format = "text"
"#
    )
    .unwrap();

    assert!(Config::from_file(file.path()).is_err());
}

#[test]
fn test_example_config_parses() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("blockwatch.example.toml");
    let config = Config::from_file(&path).unwrap();
    config.validate().unwrap();
}
