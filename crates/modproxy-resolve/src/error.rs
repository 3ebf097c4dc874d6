use thiserror::Error;

/// Failures that are not part of the normal resolution outcome space.
///
/// These never trigger the upstream fallback; the HTTP layer turns them into
/// a `500`.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The toolchain exited successfully but printed something that is not the
    /// expected JSON document.
    #[error("malformed output from `{command}`: {source}")]
    Parse {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("resolver task failed: {0}")]
    Join(String),
}
