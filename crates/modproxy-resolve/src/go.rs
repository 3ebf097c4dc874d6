use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use modproxy_config::ToolchainConfig;
use modproxy_process::{run_command, CommandSpec, RunOptions};
use tracing::{debug, warn};

use crate::classify::classify;
use crate::model::{ModuleCoordinate, QueryKind, ResolutionOutcome};
use crate::{ModuleResolver, ResolveError};

/// Checksum-database lookups are always disabled for local resolution.
const GOSUMDB: (&str, &str) = ("GOSUMDB", "off");

/// [`ModuleResolver`] backed by the `go` command.
#[derive(Debug, Clone)]
pub struct GoResolver {
    pub go: PathBuf,
    pub work_dir: PathBuf,
    /// Extra environment for every invocation, applied before `GOSUMDB=off`.
    pub env: Vec<(String, String)>,
    pub query_timeout: Duration,
    pub download_timeout: Duration,
    pub max_output_bytes: usize,
}

impl Default for GoResolver {
    fn default() -> Self {
        Self::from_config(&ToolchainConfig::default())
    }
}

impl GoResolver {
    pub fn from_config(config: &ToolchainConfig) -> Self {
        let env = config
            .env
            .iter()
            .filter(|(key, _)| {
                if key.as_str() == GOSUMDB.0 {
                    warn!(
                        target: "modproxy.resolve",
                        "ignoring `toolchain.env.GOSUMDB`; checksum lookups are always off"
                    );
                    return false;
                }
                true
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            go: config.go.clone(),
            work_dir: config
                .work_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
            env,
            query_timeout: config.query_timeout(),
            download_timeout: config.download_timeout(),
            max_output_bytes: config.max_output_bytes,
        }
    }

    /// The exact invocation used for `kind` on `coordinate`.
    pub fn command(&self, kind: QueryKind, coordinate: &ModuleCoordinate) -> CommandSpec {
        let args = kind.toolchain_args(coordinate);
        let mut command = CommandSpec::new(&self.work_dir, &self.go, &args);
        for (key, value) in &self.env {
            command = command.env(key, value);
        }
        command.env(GOSUMDB.0, GOSUMDB.1)
    }

    pub fn timeout(&self, kind: QueryKind) -> Duration {
        match kind {
            QueryKind::Latest | QueryKind::VersionList => self.query_timeout,
            QueryKind::VersionDetail => self.download_timeout,
        }
    }
}

#[async_trait]
impl ModuleResolver for GoResolver {
    async fn resolve(
        &self,
        kind: QueryKind,
        coordinate: &ModuleCoordinate,
    ) -> Result<ResolutionOutcome, ResolveError> {
        let command = self.command(kind, coordinate);
        let timeout = self.timeout(kind);
        let opts = RunOptions {
            timeout: Some(timeout),
            max_bytes: self.max_output_bytes,
            ..RunOptions::default()
        };

        let spawned = command.clone();
        let result = tokio::task::spawn_blocking(move || run_command(&spawned, &opts))
            .await
            .map_err(|err| ResolveError::Join(err.to_string()))?;

        if let Ok(result) = &result {
            debug!(
                target: "modproxy.resolve",
                command = %command,
                status = %result.status,
                elapsed_ms = result.elapsed.as_millis() as u64,
                truncated = result.output.truncated,
                "toolchain finished"
            );
        }

        classify(kind, &command, timeout, result)
    }
}
