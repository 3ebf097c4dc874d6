use std::path::Path;
use std::time::Duration;

use modproxy_config::{load, ConfigError, ProxyConfig};

#[test]
fn explicit_path_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proxy.toml");
    std::fs::write(
        &path,
        r#"
[upstream]
url = "http://127.0.0.1:9999"

[toolchain]
query_timeout_ms = 1500
"#,
    )
    .unwrap();

    let (config, found) = load(Some(&path), dir.path()).unwrap();

    assert_eq!(found.as_deref(), Some(path.as_path()));
    assert_eq!(config.upstream.url.as_str(), "http://127.0.0.1:9999/");
    assert_eq!(config.toolchain.query_timeout(), Duration::from_millis(1500));
    assert_eq!(config.toolchain.download_timeout(), Duration::from_secs(60));
}

#[test]
fn working_directory_file_is_discovered() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("modproxy.toml"),
        "[server]\nlisten = \"127.0.0.1:4000\"\n",
    )
    .unwrap();

    let (config, found) = load(None, dir.path()).unwrap();

    // `MODPROXY_CONFIG` is not set by the test harness, so the working
    // directory file must have been picked.
    if std::env::var_os(modproxy_config::MODPROXY_CONFIG_ENV_VAR).is_none() {
        assert_eq!(found, Some(dir.path().join("modproxy.toml")));
        assert_eq!(config.server.listen.port(), 4000);
    }
}

#[test]
fn missing_explicit_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let err = load(Some(&missing), Path::new(".")).unwrap_err();

    assert!(matches!(err, ConfigError::Io { .. }), "{err:?}");
    assert!(err.to_string().contains("nope.toml"), "{err}");
}

#[test]
fn config_round_trips_through_json_for_printing() {
    let config = ProxyConfig::default();
    let json = serde_json::to_value(&config).unwrap();

    assert_eq!(json["server"]["listen"], "0.0.0.0:19704");
    assert_eq!(json["upstream"]["url"], "https://goproxy.cn/");
    assert_eq!(json["toolchain"]["go"], "go");
}
