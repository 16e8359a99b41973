//! Run a compiled command and capture its output.
//!
//! The rendered command runs under `sh -c '<command>; exit $?'`. The trailing
//! `exit` keeps the wrapper shell alive next to the tool, so every run shows
//! up as two process-listing lines, which is what
//! [`check_budget`](super::check_budget) counts on. Exit statuses are not
//! interpreted here; see [`crate::error::classify_exit`].

use std::io::{ErrorKind, Read};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{EXIT_PROCESS_START, FdsError, FdsResult};
use crate::query::CommandLine;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Captured output of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResult {
    /// Stdout split into lines.
    pub lines: Vec<String>,
    pub stderr: String,
    /// Exit status; `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub elapsed: Duration,
}

/// Blocking executor with an optional hard timeout.
#[derive(Debug, Clone, Default)]
pub struct Invoker {
    timeout: Option<Duration>,
}

impl Invoker {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run `cmd` to completion.
    ///
    /// A binary that cannot be started is reported as a normal result with
    /// exit status 127, the status the wrapper shell gives.
    pub fn run(&self, cmd: &CommandLine) -> FdsResult<RawResult> {
        let start = Instant::now();
        let rendered = cmd.render();
        debug!(command = %rendered, "Trying to execute");

        let mut command = Command::new(SHELL);
        command
            .arg("-c")
            .arg(wrap(&rendered))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // own process group, so a timeout takes the tool down with the shell
            command.process_group(0);
        }
        let spawned = command.spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                warn!(shell = SHELL, error = %e, "failed to start fdsdump");
                return Ok(RawResult {
                    lines: vec![format!("{SHELL}: {e}")],
                    stderr: e.to_string(),
                    exit_code: EXIT_PROCESS_START,
                    elapsed: start.elapsed(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let stdout_handle = child.stdout.take().map(drain);
        let stderr_handle = child.stderr.take().map(drain);

        let status = match self.timeout {
            None => child.wait()?,
            Some(limit) => loop {
                if start.elapsed() > limit {
                    kill_tree(&mut child);
                    let secs = whole_secs(limit);
                    warn!(command = %rendered, secs, "fdsdump timed out");
                    return Err(FdsError::Timeout {
                        secs,
                        command: rendered,
                    });
                }
                match child.try_wait()? {
                    Some(status) => break status,
                    None => thread::sleep(POLL_INTERVAL),
                }
            },
        };

        let stdout = join_drain(stdout_handle)?;
        let stderr = join_drain(stderr_handle)?;
        let exit_code = status.code().unwrap_or(-1);
        let elapsed = start.elapsed();
        debug!(exit_code, elapsed_ms = elapsed.as_millis() as u64, "fdsdump finished");

        Ok(RawResult {
            lines: String::from_utf8_lossy(&stdout)
                .lines()
                .map(str::to_string)
                .collect(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
            elapsed,
        })
    }
}

const SHELL: &str = "sh";

fn wrap(rendered: &str) -> String {
    format!("{rendered}; exit $?")
}

/// Timeout in whole seconds, rounded up so sub-second limits never read as 0.
fn whole_secs(limit: Duration) -> u64 {
    limit.as_secs() + u64::from(limit.subsec_nanos() > 0)
}

fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        let killed = Command::new("kill")
            .args(["-KILL", "--", group.as_str()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if !matches!(killed, Ok(status) if status.success()) {
            let _ = child.kill();
        }
    }
    #[cfg(not(unix))]
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<std::io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn join_drain(
    handle: Option<thread::JoinHandle<std::io::Result<Vec<u8>>>>,
) -> FdsResult<Vec<u8>> {
    match handle {
        None => Ok(Vec::new()),
        Some(handle) => handle
            .join()
            .map_err(|_| FdsError::Io(std::io::Error::other("output reader thread panicked")))?
            .map_err(FdsError::from),
    }
}
