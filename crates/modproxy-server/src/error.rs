use std::io;

use modproxy_resolve::ResolveError;
use thiserror::Error;

use crate::route::ResourceKind;
use crate::upstream::UpstreamError;

/// A request failure. Every variant is answered with a plaintext `500`.
///
/// Display text is sent to the client, so no variant formats a local
/// filesystem path.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("local resolution timed out: {0}")]
    Timeout(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("failed to read resolved {artifact} file")]
    ArtifactRead {
        artifact: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("local resolution did not report a {0} file")]
    MissingArtifact(&'static str),

    #[error("local resolver answered a {0} request with the wrong shape")]
    UnexpectedResolution(ResourceKind),

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}
