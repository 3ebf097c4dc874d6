use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use url::Url;

mod logging;
mod validation;

pub use logging::init_tracing;
pub use validation::ConfigValidationError;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:19704";
pub const DEFAULT_UPSTREAM_URL: &str = "https://goproxy.cn";

/// Environment variable pointing at the config file.
pub const MODPROXY_CONFIG_ENV_VAR: &str = "MODPROXY_CONFIG";

/// Config file looked up in the working directory when nothing else is given.
pub const DEFAULT_CONFIG_FILE: &str = "modproxy.toml";

/// Top-level proxy configuration.
///
/// ```toml
/// [server]
/// listen = "0.0.0.0:19704"
///
/// [upstream]
/// url = "https://goproxy.cn"
/// timeout_ms = 5000
///
/// [toolchain]
/// go = "/usr/local/go/bin/go"
/// download_timeout_ms = 60000
///
/// [toolchain.env]
/// GOFLAGS = "-mod=mod"
///
/// [logging]
/// level = "info,modproxy_server=debug"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Fallback module registry.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Local resolution toolchain invocation.
    #[serde(default)]
    pub toolchain: ToolchainConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_listen")]
    pub listen: SocketAddr,
}

impl ServerConfig {
    fn default_listen() -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], 19704))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: Self::default_listen(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Base URL; the inbound request path is appended verbatim.
    #[serde(default = "UpstreamConfig::default_url")]
    pub url: Url,

    /// Connect + read budget for a single upstream attempt.
    #[serde(default = "UpstreamConfig::default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl UpstreamConfig {
    fn default_url() -> Url {
        Url::parse(DEFAULT_UPSTREAM_URL).expect("default upstream url is valid")
    }

    fn default_timeout_ms() -> u64 {
        5_000
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            timeout_ms: Self::default_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

/// Upstream retry policy. Disabled unless `max_retries > 0`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_retries: usize,

    #[serde(default = "RetryConfig::default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "RetryConfig::default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl RetryConfig {
    fn default_initial_backoff_ms() -> u64 {
        1_000
    }

    fn default_max_backoff_ms() -> u64 {
        5_000
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: Self::default_initial_backoff_ms(),
            max_backoff_ms: Self::default_max_backoff_ms(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainConfig {
    /// Toolchain executable; resolved through `PATH` when not absolute.
    #[serde(default = "ToolchainConfig::default_go")]
    pub go: PathBuf,

    /// Working directory for toolchain invocations (defaults to the current
    /// directory of the proxy process).
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Budget for `@latest`, `.info` and `@v/list` queries.
    #[serde(default = "ToolchainConfig::default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Budget for `.mod` / `.zip` queries, which may download the artifact.
    #[serde(default = "ToolchainConfig::default_download_timeout_ms")]
    pub download_timeout_ms: u64,

    /// Maximum bytes captured per output stream.
    #[serde(default = "ToolchainConfig::default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Extra environment variables for every invocation.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ToolchainConfig {
    fn default_go() -> PathBuf {
        PathBuf::from("go")
    }

    fn default_query_timeout_ms() -> u64 {
        5_000
    }

    fn default_download_timeout_ms() -> u64 {
        60_000
    }

    fn default_max_output_bytes() -> usize {
        16 * 1024 * 1024
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            go: Self::default_go(),
            work_dir: None,
            query_timeout_ms: Self::default_query_timeout_ms(),
            download_timeout_ms: Self::default_download_timeout_ms(),
            max_output_bytes: Self::default_max_output_bytes(),
            env: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A simple level (`info`, `debug`, ...) or a full `EnvFilter` directive
    /// string. `RUST_LOG` is merged on top.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs in JSON format.
    #[serde(default)]
    pub json: bool,

    /// Write logs to stderr.
    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to the given file path.
    ///
    /// If the file cannot be opened, file logging is disabled while stderr
    /// logging remains active.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid configuration: {}", validation::join(.0))]
    Invalid(Vec<ConfigValidationError>),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` embeds a source snippet; keep only the message.
        ConfigError::Toml(err.message().to_owned())
    }
}

impl ProxyConfig {
    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Semantic checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let errors = validation::validate(self);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}

/// Discover the config file.
///
/// Search order:
/// 1) `MODPROXY_CONFIG` (absolute or relative to `cwd`)
/// 2) `modproxy.toml` in `cwd`
pub fn discover_config_path(cwd: &Path) -> Option<PathBuf> {
    discover_config_path_from(std::env::var_os(MODPROXY_CONFIG_ENV_VAR), cwd)
}

fn discover_config_path_from(env_value: Option<OsString>, cwd: &Path) -> Option<PathBuf> {
    if let Some(value) = env_value.filter(|value| !value.is_empty()) {
        let candidate = PathBuf::from(value);
        return Some(if candidate.is_absolute() {
            candidate
        } else {
            cwd.join(candidate)
        });
    }

    let path = cwd.join(DEFAULT_CONFIG_FILE);
    path.is_file().then_some(path)
}

/// Load the proxy configuration.
///
/// An explicit path wins over discovery. If no config is found, returns
/// [`ProxyConfig::default`] and `None`.
pub fn load(
    explicit: Option<&Path>,
    cwd: &Path,
) -> Result<(ProxyConfig, Option<PathBuf>), ConfigError> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => discover_config_path(cwd),
    };
    let Some(path) = path else {
        return Ok((ProxyConfig::default(), None));
    };

    let config = ProxyConfig::load_from_path(&path)?;
    Ok((config, Some(path)))
}
