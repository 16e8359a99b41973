//! Error taxonomy for flow queries.
//!
//! Every failure a query can hit surfaces as a distinct [`FdsError`] variant so
//! callers can decide what to show the user and what to hand to an operator.
//! Nothing in this crate retries on its own; [`FdsError::retryable`] only
//! reports whether a retry *with backoff* makes sense.
//!
//! Tool exit statuses are translated by [`classify_exit`]:
//!
//! | status | variant           |
//! |--------|-------------------|
//! | 127    | `ProcessStart`    |
//! | 255    | `Initialization`  |
//! | 254    | `FilterSyntax`    |
//! | 250    | `Internal`        |
//!
//! Any other status (including non-zero ones) is treated as success with
//! output.

use thiserror::Error;

use crate::config::ConfigError;

/// Exit status reported when the tool could not be started at all.
pub const EXIT_PROCESS_START: i32 = 127;
/// Exit status for an initialization failure (bad file arguments and the like).
pub const EXIT_INITIALIZATION: i32 = 255;
/// Exit status for a rejected filter expression.
pub const EXIT_FILTER_SYNTAX: i32 = 254;
/// Exit status for a tool-internal fault.
pub const EXIT_INTERNAL: i32 = 250;

/// Errors produced while resolving, compiling, running or normalizing a query.
#[derive(Error, Debug)]
pub enum FdsError {
    #[error("There already are {running} fdsdump processes running (limit {limit})")]
    TooManyProcesses { running: usize, limit: usize },

    #[error("fdsdump: failed to start process. Is fdsdump installed? {output}")]
    ProcessStart { output: String },

    #[error("fdsdump: initialization failed. {command}")]
    Initialization { command: String },

    #[error("fdsdump: error in filter syntax. {output}")]
    FilterSyntax { output: String },

    #[error("fdsdump: internal error. {output}")]
    Internal { output: String },

    #[error("fdsdump: no canonical field for column '{0}'")]
    UnknownField(String),

    #[error("Unknown output format '{0}'")]
    UnknownPreset(String),

    #[error("fdsdump timed out after {secs} seconds: {command}")]
    Timeout { secs: u64, command: String },

    #[error("No flow files cover the requested range for sources: {sources}")]
    NoCoverage { sources: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Failed to parse fdsdump CSV output: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Convenience alias.
pub type FdsResult<T> = std::result::Result<T, FdsError>;

impl FdsError {
    /// Stable machine-readable identifier, used in robot output.
    pub fn kind(&self) -> &'static str {
        match self {
            FdsError::TooManyProcesses { .. } => "too-many-processes",
            FdsError::ProcessStart { .. } => "process-start",
            FdsError::Initialization { .. } => "initialization",
            FdsError::FilterSyntax { .. } => "filter-syntax",
            FdsError::Internal { .. } => "internal",
            FdsError::UnknownField(_) => "unknown-field",
            FdsError::UnknownPreset(_) => "unknown-preset",
            FdsError::Timeout { .. } => "timeout",
            FdsError::NoCoverage { .. } => "no-coverage",
            FdsError::InvalidQuery(_) => "invalid-query",
            FdsError::Csv(_) => "csv",
            FdsError::Io(_) => "io",
            FdsError::Config(_) => "config",
        }
    }

    /// Exit status used by the `fdsq` binary for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            FdsError::InvalidQuery(_) | FdsError::UnknownPreset(_) => 2,
            FdsError::TooManyProcesses { .. } => 3,
            FdsError::FilterSyntax { .. } => 4,
            FdsError::NoCoverage { .. } => 5,
            FdsError::Timeout { .. } => 6,
            FdsError::Config(_) => 9,
            FdsError::ProcessStart { .. }
            | FdsError::Initialization { .. }
            | FdsError::Internal { .. }
            | FdsError::UnknownField(_)
            | FdsError::Csv(_)
            | FdsError::Io(_) => 1,
        }
    }

    /// Whether a later retry can succeed without changing the query.
    ///
    /// Both retryable cases depend on shared machine load, so callers should
    /// back off rather than retry immediately.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            FdsError::TooManyProcesses { .. } | FdsError::Timeout { .. }
        )
    }

    /// Whether the error is something the query author can fix, as opposed to
    /// an installation or tool problem for an operator.
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            FdsError::TooManyProcesses { .. }
                | FdsError::FilterSyntax { .. }
                | FdsError::UnknownPreset(_)
                | FdsError::InvalidQuery(_)
                | FdsError::NoCoverage { .. }
        )
    }

    /// Get a user-friendly help message for this error.
    pub fn hint(&self) -> &'static str {
        match self {
            FdsError::TooManyProcesses { .. } => {
                "Wait for running queries to finish, then retry with backoff."
            }
            FdsError::ProcessStart { .. } => {
                "Check that the configured fdsdump binary exists and is executable."
            }
            FdsError::Initialization { .. } => {
                "Inspect the command above; the file arguments are usually at fault."
            }
            FdsError::FilterSyntax { .. } => "Correct the filter expression before retrying.",
            FdsError::Internal { .. } => "fdsdump failed internally; see the captured output.",
            FdsError::UnknownField(_) => {
                "The field catalog does not match this fdsdump version's output."
            }
            FdsError::UnknownPreset(_) => {
                "Use one of line, long, extended, or a comma-separated field list."
            }
            FdsError::Timeout { .. } => "Narrow the time range or raise timeout_secs.",
            FdsError::NoCoverage { .. } => {
                "Check the source names and that capture files exist for this range."
            }
            FdsError::InvalidQuery(_) => "Fix the query parameters and retry.",
            FdsError::Csv(_) => "fdsdump produced malformed CSV; rerun with --output table.",
            FdsError::Io(_) => "See error details above.",
            FdsError::Config(_) => "Check the fdsq configuration file and FDSQ_* variables.",
        }
    }
}

/// Interpret a tool exit status.
///
/// `command` is the rendered command line and `output` the captured stdout
/// lines; both are embedded in the error so the failure can be diagnosed.
pub fn classify_exit(exit_code: i32, command: &str, output: &[String]) -> FdsResult<()> {
    // Usage text is noise, not diagnostics.
    let output = match output.first() {
        Some(first) if first.trim_start().to_ascii_lowercase().starts_with("usage") => &[][..],
        _ => output,
    };
    let joined = output.join(" ");

    match exit_code {
        EXIT_PROCESS_START => Err(FdsError::ProcessStart { output: joined }),
        EXIT_INITIALIZATION => Err(FdsError::Initialization {
            command: command.to_string(),
        }),
        EXIT_FILTER_SYNTAX => Err(FdsError::FilterSyntax { output: joined }),
        EXIT_INTERNAL => Err(FdsError::Internal { output: joined }),
        _ => Ok(()),
    }
}
