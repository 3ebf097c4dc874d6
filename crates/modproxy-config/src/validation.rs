use std::fmt;

use serde::Serialize;

use crate::ProxyConfig;

/// A semantic problem with an otherwise well-formed config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigValidationError {
    /// Dotted TOML key, e.g. `upstream.timeout_ms`.
    pub field: String,
    pub message: String,
}

impl ConfigValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_owned(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub(crate) fn join(errors: &[ConfigValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub(crate) fn validate(config: &ProxyConfig) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();

    match config.upstream.url.scheme() {
        "http" | "https" => {}
        other => errors.push(ConfigValidationError::new(
            "upstream.url",
            format!("scheme must be http or https, got `{other}`"),
        )),
    }
    if config.upstream.url.cannot_be_a_base() || config.upstream.url.host().is_none() {
        errors.push(ConfigValidationError::new(
            "upstream.url",
            "must be an absolute URL with a host",
        ));
    }
    if config.upstream.timeout_ms == 0 {
        errors.push(ConfigValidationError::new(
            "upstream.timeout_ms",
            "must be greater than zero",
        ));
    }

    let retry = &config.upstream.retry;
    if retry.max_retries > 0 && retry.initial_backoff_ms == 0 {
        errors.push(ConfigValidationError::new(
            "upstream.retry.initial_backoff_ms",
            "must be greater than zero when retries are enabled",
        ));
    }
    if retry.max_backoff_ms < retry.initial_backoff_ms {
        errors.push(ConfigValidationError::new(
            "upstream.retry.max_backoff_ms",
            "must not be smaller than initial_backoff_ms",
        ));
    }

    let toolchain = &config.toolchain;
    if toolchain.go.as_os_str().is_empty() {
        errors.push(ConfigValidationError::new("toolchain.go", "must not be empty"));
    }
    if toolchain.query_timeout_ms == 0 {
        errors.push(ConfigValidationError::new(
            "toolchain.query_timeout_ms",
            "must be greater than zero",
        ));
    }
    if toolchain.download_timeout_ms == 0 {
        errors.push(ConfigValidationError::new(
            "toolchain.download_timeout_ms",
            "must be greater than zero",
        ));
    }
    if toolchain.max_output_bytes == 0 {
        errors.push(ConfigValidationError::new(
            "toolchain.max_output_bytes",
            "must be greater than zero",
        ));
    }

    errors
}
