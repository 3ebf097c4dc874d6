use std::fmt;

use modproxy_resolve::{ModuleCoordinate, QueryKind};
use percent_encoding::percent_decode_str;
use thiserror::Error;

/// One of the five module-proxy resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// `<module>/@latest`
    Latest,
    /// `<module>/@v/list`
    List,
    /// `<module>/@v/<version>.info`
    Info,
    /// `<module>/@v/<version>.mod`
    Mod,
    /// `<module>/@v/<version>.zip`
    Zip,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Latest => "latest",
            ResourceKind::List => "list",
            ResourceKind::Info => "info",
            ResourceKind::Mod => "mod",
            ResourceKind::Zip => "zip",
        }
    }

    /// The toolchain query that answers this resource locally.
    pub fn query_kind(self) -> QueryKind {
        match self {
            ResourceKind::Latest | ResourceKind::Info => QueryKind::Latest,
            ResourceKind::List => QueryKind::VersionList,
            ResourceKind::Mod | ResourceKind::Zip => QueryKind::VersionDetail,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed module-proxy request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    pub kind: ResourceKind,
    /// Case-decoded coordinate handed to the local resolver.
    pub coordinate: ModuleCoordinate,
    /// The raw request path, reused verbatim for the upstream request.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("not found")]
    NotFound,
    #[error("invalid escaped path element {element:?}: {reason}")]
    BadEscape {
        element: String,
        reason: &'static str,
    },
    #[error("request path is not valid UTF-8 once percent-decoded")]
    BadPercentEncoding,
}

const VERSION_FILE_EXTENSIONS: [(&str, ResourceKind); 3] = [
    (".info", ResourceKind::Info),
    (".mod", ResourceKind::Mod),
    (".zip", ResourceKind::Zip),
];

/// Parses a raw request path (no query string) into a [`ProxyRequest`].
///
/// The path is percent-decoded before matching; [`ProxyRequest::path`] keeps
/// the raw form for the upstream request.
pub fn parse_request_path(path: &str) -> Result<ProxyRequest, RouteError> {
    let decoded = percent_decode_str(path)
        .decode_utf8()
        .map_err(|_| RouteError::BadPercentEncoding)?;
    let rest = decoded.strip_prefix('/').ok_or(RouteError::NotFound)?;

    let (kind, module, version) = if let Some(module) = rest.strip_suffix("/@latest") {
        (ResourceKind::Latest, module, Some("latest"))
    } else if let Some(module) = rest.strip_suffix("/@v/list") {
        (ResourceKind::List, module, None)
    } else {
        let (module, file) = rest.rsplit_once("/@v/").ok_or(RouteError::NotFound)?;
        let (version, kind) = VERSION_FILE_EXTENSIONS
            .iter()
            .find_map(|(ext, kind)| file.strip_suffix(ext).map(|version| (version, *kind)))
            .ok_or(RouteError::NotFound)?;
        if version.is_empty() || version.contains('/') {
            return Err(RouteError::NotFound);
        }
        (kind, module, Some(version))
    };

    // `@` never appears in a module path, so this also rules out the
    // `/@v/` and `/@latest` markers.
    if module.is_empty() || module.contains('@') {
        return Err(RouteError::NotFound);
    }

    let module = unescape(module)?;
    let coordinate = match version {
        Some(version) => ModuleCoordinate::with_query(module, unescape(version)?),
        None => ModuleCoordinate::new(module),
    };

    Ok(ProxyRequest {
        kind,
        coordinate,
        path: path.to_owned(),
    })
}

/// Decodes the proxy protocol's case encoding (`!x` -> `X`).
fn unescape(element: &str) -> Result<String, RouteError> {
    let bad = |reason| RouteError::BadEscape {
        element: element.to_owned(),
        reason,
    };

    let mut out = String::with_capacity(element.len());
    let mut chars = element.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '!' => match chars.next() {
                Some(next) if next.is_ascii_lowercase() => out.push(next.to_ascii_uppercase()),
                _ => return Err(bad("`!` must be followed by a lowercase letter")),
            },
            ch if ch.is_ascii_uppercase() => {
                return Err(bad("uppercase letters must be written as `!` + lowercase"))
            }
            ch => out.push(ch),
        }
    }
    Ok(out)
}
