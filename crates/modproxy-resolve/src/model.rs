use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

/// A module path, optionally qualified with `@<version-or-query>`.
///
/// Built by the request parser after the protocol suffix (`/@latest`,
/// `/@v/...`) has been stripped, so it never contains those markers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleCoordinate {
    module: String,
    query: Option<String>,
}

impl ModuleCoordinate {
    /// A bare module path (used for version listings).
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            query: None,
        }
    }

    /// `module@query`, e.g. `example.com/mod@latest` or `example.com/mod@v1.2.3`.
    pub fn with_query(module: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            query: Some(query.into()),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }
}

impl fmt::Display for ModuleCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.query {
            Some(query) => write!(f, "{}@{}", self.module, query),
            None => f.write_str(&self.module),
        }
    }
}

/// What the toolchain is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Resolve a coordinate to a concrete version (`go list -m`).
    Latest,
    /// List known versions of a module (`go list -m -versions`).
    VersionList,
    /// Download a concrete version and report artifact paths (`go mod download`).
    VersionDetail,
}

impl QueryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryKind::Latest => "latest",
            QueryKind::VersionList => "version_list",
            QueryKind::VersionDetail => "version_detail",
        }
    }

    /// Toolchain arguments (without the program name) for `coordinate`.
    pub fn toolchain_args(self, coordinate: &ModuleCoordinate) -> Vec<String> {
        let target = match self {
            // `-versions` takes a bare module path.
            QueryKind::VersionList => coordinate.module().to_owned(),
            QueryKind::Latest | QueryKind::VersionDetail => coordinate.to_string(),
        };

        let mut args: Vec<String> = match self {
            QueryKind::Latest => vec!["list".into(), "-json".into(), "-m".into()],
            QueryKind::VersionList => vec![
                "list".into(),
                "-json".into(),
                "-m".into(),
                "-versions".into(),
            ],
            QueryKind::VersionDetail => vec!["mod".into(), "download".into(), "-json".into()],
        };
        args.push(target);
        args
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The toolchain's answer to a coordinate or download query.
///
/// Paths point into the local module cache; they are read server-side and are
/// never echoed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResolvedModuleInfo {
    pub path: String,
    pub version: String,
    /// RFC 3339 timestamp, exactly as the toolchain printed it.
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub info: Option<PathBuf>,
    #[serde(default)]
    pub go_mod: Option<PathBuf>,
    #[serde(default)]
    pub zip: Option<PathBuf>,
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub sum: Option<String>,
    #[serde(default)]
    pub go_mod_sum: Option<String>,
    #[serde(default)]
    pub go_version: Option<String>,
}

/// Known versions of a module, in toolchain order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionList {
    pub path: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Omitted by the toolchain when the module has no tagged versions.
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub go_mod: Option<PathBuf>,
    #[serde(default)]
    pub go_version: Option<String>,
}

/// A successful local resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Module(ResolvedModuleInfo),
    Versions(VersionList),
}

/// Result of one local resolution attempt.
///
/// The fallback decision pivots on this tag: `ResolutionError` is recovered
/// by asking the upstream registry, `Timeout` is not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Success(Resolution),
    ResolutionError(String),
    Timeout(String),
}
