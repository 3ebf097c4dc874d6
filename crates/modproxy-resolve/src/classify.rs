use std::io;
use std::time::Duration;

use modproxy_process::{BoundedOutput, CommandResult, CommandSpec};
use serde::de::DeserializeOwned;

use crate::model::{QueryKind, Resolution, ResolutionOutcome, ResolvedModuleInfo, VersionList};
use crate::ResolveError;

/// Maps a finished toolchain invocation onto a [`ResolutionOutcome`].
///
/// Order matters: a deadline overrun wins over whatever the killed process
/// managed to print.
pub(crate) fn classify(
    kind: QueryKind,
    command: &CommandSpec,
    timeout: Duration,
    result: io::Result<CommandResult>,
) -> Result<ResolutionOutcome, ResolveError> {
    let result = match result {
        Ok(result) => result,
        Err(err) => {
            return Ok(ResolutionOutcome::ResolutionError(format!(
                "failed to run `{command}`: {err}"
            )))
        }
    };

    if result.timed_out {
        return Ok(ResolutionOutcome::Timeout(format!(
            "`{}` timed out after {timeout:?}",
            invocation(command)
        )));
    }

    if !result.status.success() {
        return Ok(ResolutionOutcome::ResolutionError(failure_message(
            command,
            &result,
        )));
    }

    // The toolchain reports some failures in-band with exit status 0, and
    // those payloads may omit fields a successful answer always carries.
    let value: serde_json::Value = parse(command, &result.output.stdout)?;
    if let Some(message) = structured_error(&value) {
        return Ok(ResolutionOutcome::ResolutionError(message));
    }

    let resolution = match kind {
        QueryKind::Latest | QueryKind::VersionDetail => {
            Resolution::Module(typed::<ResolvedModuleInfo>(command, value)?)
        }
        QueryKind::VersionList => Resolution::Versions(typed::<VersionList>(command, value)?),
    };
    Ok(ResolutionOutcome::Success(resolution))
}

fn parse<T: DeserializeOwned>(command: &CommandSpec, stdout: &[u8]) -> Result<T, ResolveError> {
    serde_json::from_slice(stdout).map_err(|source| ResolveError::Parse {
        command: invocation(command),
        source,
    })
}

fn typed<T: DeserializeOwned>(command: &CommandSpec, value: serde_json::Value) -> Result<T, ResolveError> {
    serde_json::from_value(value).map_err(|source| ResolveError::Parse {
        command: invocation(command),
        source,
    })
}

/// `go <args>` without the toolchain's install path; this text reaches
/// clients through timeout and parse failures.
fn invocation(command: &CommandSpec) -> String {
    format!("go {}", command.args.join(" "))
}

/// Message for a non-zero exit: the JSON `Error` field when stdout carries
/// one, otherwise stderr, otherwise the exit status itself.
fn failure_message(command: &CommandSpec, result: &CommandResult) -> String {
    let BoundedOutput { stdout, stderr, .. } = &result.output;

    if !stdout.iter().all(u8::is_ascii_whitespace) {
        return match serde_json::from_slice::<serde_json::Value>(stdout) {
            Ok(value) => structured_error(&value)
                .unwrap_or_else(|| result.output.stdout_lossy().trim().to_owned()),
            Err(_) => result.output.stdout_lossy().trim().to_owned(),
        };
    }

    let stderr_text = String::from_utf8_lossy(stderr);
    let stderr_text = stderr_text.trim();
    if !stderr_text.is_empty() {
        return stderr_text.to_owned();
    }

    format!("`{command}` failed with {}", result.status)
}

fn structured_error(value: &serde_json::Value) -> Option<String> {
    let error = value.get("Error")?;
    let text = match error {
        serde_json::Value::String(text) => text.as_str(),
        serde_json::Value::Object(object) => object.get("Err")?.as_str()?,
        _ => return None,
    };
    (!text.is_empty()).then(|| text.to_owned())
}
