use std::path::Path;

use modproxy_resolve::Resolution;
use serde::Serialize;
use tracing::error;

use crate::route::ResourceKind;
use crate::ProxyError;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";
pub const CONTENT_TYPE_ZIP: &str = "application/zip";

/// The wire body for a locally answered request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalResponse {
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

#[derive(Serialize)]
struct VersionInfo<'a> {
    #[serde(rename = "Version")]
    version: &'a str,
    #[serde(rename = "Time", skip_serializing_if = "Option::is_none")]
    time: Option<&'a str>,
}

/// Shapes a successful resolution into the wire format for `kind`.
pub async fn normalize(
    kind: ResourceKind,
    resolution: Resolution,
) -> Result<LocalResponse, ProxyError> {
    match (kind, resolution) {
        (ResourceKind::Latest | ResourceKind::Info, Resolution::Module(info)) => {
            let body = serde_json::to_vec(&VersionInfo {
                version: &info.version,
                time: info.time.as_deref(),
            })?;
            Ok(LocalResponse {
                content_type: CONTENT_TYPE_JSON,
                body,
            })
        }
        (ResourceKind::List, Resolution::Versions(list)) => Ok(LocalResponse {
            content_type: CONTENT_TYPE_TEXT,
            body: list.versions.join("\n").into_bytes(),
        }),
        (ResourceKind::Mod, Resolution::Module(info)) => Ok(LocalResponse {
            content_type: CONTENT_TYPE_TEXT,
            body: read_artifact("mod", info.go_mod.as_deref()).await?,
        }),
        (ResourceKind::Zip, Resolution::Module(info)) => Ok(LocalResponse {
            content_type: CONTENT_TYPE_ZIP,
            body: read_artifact("zip", info.zip.as_deref()).await?,
        }),
        (kind, _) => Err(ProxyError::UnexpectedResolution(kind)),
    }
}

async fn read_artifact(artifact: &'static str, path: Option<&Path>) -> Result<Vec<u8>, ProxyError> {
    let path = path.ok_or(ProxyError::MissingArtifact(artifact))?;
    tokio::fs::read(path).await.map_err(|source| {
        error!(path = %path.display(), error = %source, "failed to read {artifact} file");
        ProxyError::ArtifactRead { artifact, source }
    })
}
