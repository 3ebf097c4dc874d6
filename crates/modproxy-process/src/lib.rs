//! Helpers for invoking the external resolution toolchain.
//!
//! The toolchain (`go list`, `go mod download`) may hang on network access or
//! print arbitrarily large JSON documents. Commands are therefore run with
//! bounded stdout/stderr capture and a wall-clock deadline; when the deadline
//! fires the whole process group is terminated so helper processes spawned by
//! the toolchain do not keep the output pipes open.

use std::{
    ffi::{OsStr, OsString},
    fmt,
    io::{self, Read},
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, warn};

/// Captured stdout/stderr from a command, truncated to a maximum size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Set when either stdout or stderr had more bytes than were captured.
    pub truncated: bool,
}

impl BoundedOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Options controlling command execution.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Kill the process group if it hasn't exited after this duration.
    pub timeout: Option<Duration>,
    /// Maximum bytes to capture *per stream* (stdout and stderr).
    pub max_bytes: usize,
    /// How long to wait after sending a graceful termination signal before
    /// force-killing the process tree.
    pub kill_grace: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            // 16MiB per stream keeps memory bounded while still fitting the
            // largest `-versions` listings.
            max_bytes: 16 * 1024 * 1024,
            kill_grace: Duration::from_millis(250),
        }
    }
}

/// A full command invocation (cwd + program + args + environment overrides).
///
/// The child inherits the parent's environment; `env` entries are applied on
/// top in order, so a later entry for the same key wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub cwd: PathBuf,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(OsString, OsString)>,
}

impl CommandSpec {
    pub fn new(cwd: &Path, program: &Path, args: &[String]) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            program: program.to_path_buf(),
            args: args.to_vec(),
            env: Vec::new(),
        }
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Human-readable only; not a round-trippable shell snippet.
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(' ') || arg.contains('\t') {
                write!(f, " \"{}\"", arg.replace('"', "\\\""))?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Result of running a command with bounded output capture.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub status: ExitStatus,
    pub output: BoundedOutput,
    pub timed_out: bool,
    pub elapsed: Duration,
}

/// Run a command, capturing at most `opts.max_bytes` bytes of stdout and stderr
/// each.
///
/// Only spawn and wait failures are errors; a non-zero exit or a deadline
/// overrun is reported through the returned [`CommandResult`].
pub fn run_command(command: &CommandSpec, opts: &RunOptions) -> io::Result<CommandResult> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .current_dir(&command.cwd)
        .envs(command.env.iter().map(|(key, value)| (key, value)))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;

        // SAFETY: `setpgid` is async-signal-safe and runs in the forked child
        // before `exec`. A fresh group lets a timeout reach VCS helpers the
        // toolchain forks.
        unsafe {
            cmd.pre_exec(|| {
                if libc::setpgid(0, 0) == 0 {
                    Ok(())
                } else {
                    Err(io::Error::last_os_error())
                }
            });
        }
    }

    debug!(command = %command, timeout = ?opts.timeout, "spawning command");
    let start = Instant::now();
    let mut child = cmd.spawn()?;

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(io::Error::other("child output pipes were not captured"));
    };
    let max_bytes = opts.max_bytes as u64;
    let stdout = thread::spawn(move || capture(stdout, max_bytes));
    let stderr = thread::spawn(move || capture(stderr, max_bytes));

    let (status, timed_out) = match opts.timeout {
        Some(timeout) => match wait_until(&mut child, start + timeout)? {
            Some(status) => (status, false),
            None => {
                warn!(command = %command, ?timeout, "command timed out; killing process group");
                (kill_process_group(&mut child, opts.kill_grace)?, true)
            }
        },
        None => (child.wait()?, false),
    };

    let (stdout, stdout_truncated) = finish_capture(stdout)?;
    let (stderr, stderr_truncated) = finish_capture(stderr)?;

    Ok(CommandResult {
        status,
        output: BoundedOutput {
            stdout,
            stderr,
            truncated: stdout_truncated || stderr_truncated,
        },
        timed_out,
        elapsed: start.elapsed(),
    })
}

/// Polls `child` until it exits or `deadline` passes (`Ok(None)`).
fn wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    const POLL: Duration = Duration::from_millis(20);
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL.min(deadline - now));
    }
}

/// SIGTERM the child's process group, then SIGKILL it once `grace` expires.
fn kill_process_group(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        // The child leads its own group (`setpgid(0, 0)` above).
        let group = -(child.id() as i32);
        let signal = |sig| {
            // SAFETY: plain syscall; a stale group only yields ESRCH.
            unsafe { libc::kill(group, sig) };
        };

        signal(libc::SIGTERM);
        if let Some(status) = wait_until(child, Instant::now() + grace)? {
            return Ok(status);
        }
        signal(libc::SIGKILL);
        child.wait()
    }

    #[cfg(not(unix))]
    {
        let _ = grace;
        child.kill()?;
        child.wait()
    }
}

type Capture = thread::JoinHandle<io::Result<(Vec<u8>, bool)>>;

fn finish_capture(handle: Capture) -> io::Result<(Vec<u8>, bool)> {
    handle
        .join()
        .map_err(|_| io::Error::other("output reader thread panicked"))?
}

/// Reads up to `max_bytes` and drains the rest so the child never blocks on a
/// full pipe.
fn capture(reader: impl Read, max_bytes: u64) -> io::Result<(Vec<u8>, bool)> {
    let mut limited = reader.take(max_bytes);
    let mut out = Vec::new();
    limited.read_to_end(&mut out)?;

    let overflow = io::copy(&mut limited.into_inner(), &mut io::sink())?;
    Ok((out, overflow > 0))
}
