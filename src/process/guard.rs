//! Advisory ceiling on concurrent fdsdump runs.
//!
//! Before launching, the current user's processes are listed and the lines
//! mentioning the binary are counted. Each run started by
//! [`Invoker`](super::Invoker) shows up twice: the wrapper shell and the tool
//! itself. The raw count is therefore halved before it is compared with the
//! ceiling.
//!
//! This is a census, not a lock. Two queries checked within the same window
//! can both pass and together exceed the ceiling; treat the limit as soft.

use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crate::error::{FdsError, FdsResult};

/// Source of process-listing lines that mention a binary.
pub trait ProcessCensus: Send + Sync {
    /// Listing lines owned by the current user that reference `binary`.
    fn matching_lines(&self, binary: &str) -> FdsResult<Vec<String>>;
}

impl<F> ProcessCensus for F
where
    F: Fn(&str) -> FdsResult<Vec<String>> + Send + Sync,
{
    fn matching_lines(&self, binary: &str) -> FdsResult<Vec<String>> {
        self(binary)
    }
}

/// Census backed by `ps` run through `sh`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PsCensus;

impl PsCensus {
    fn pipeline(binary: &str) -> String {
        format!(
            "ps -eo user,pid,args | grep -v grep | grep \"$(whoami)\" | grep -F -- {}",
            shell_words::quote(binary)
        )
    }
}

impl ProcessCensus for PsCensus {
    fn matching_lines(&self, binary: &str) -> FdsResult<Vec<String>> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(Self::pipeline(binary))
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()?;

        // grep exits 1 on no match; an empty listing is the answer then
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Instances implied by a raw line count.
pub fn running_instances(lines: usize) -> usize {
    lines.div_ceil(2)
}

/// Refuse when more than `max_processes` instances of `binary` are running.
///
/// Returns the number of running instances on success.
pub fn check_budget(
    census: &dyn ProcessCensus,
    binary: &str,
    max_processes: usize,
) -> FdsResult<usize> {
    let lines = census.matching_lines(binary)?.len();
    let running = running_instances(lines);
    debug!(binary, lines, running, max_processes, "process census");

    if lines > max_processes.saturating_mul(2) {
        warn!(binary, running, max_processes, "refusing to start another fdsdump");
        return Err(FdsError::TooManyProcesses {
            running,
            limit: max_processes,
        });
    }
    Ok(running)
}
