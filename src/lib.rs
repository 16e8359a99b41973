//! fdsq: query compiler and result normalizer for fdsdump flow captures.
//!
//! The library turns a structured [`Query`] into one fdsdump invocation and
//! reshapes the output into canonical field names:
//!
//! - [`timeslots`]: time range + sources → boundary bucket files
//! - [`catalog`]: fdsdump column ↔ canonical field mapping, output presets
//! - [`query`]: query model and command-line compiler
//! - [`process`]: process census and invoker
//! - [`normalize`]: CSV parsing and header translation
//! - [`processor`]: the end-to-end pipeline ([`FdsDump`])
//!
//! The `fdsq` binary wraps all of it behind the [`Cli`] defined here.

pub mod catalog;
pub mod config;
pub mod error;
pub mod normalize;
pub mod process;
pub mod processor;
pub mod query;
pub mod timeslots;

use std::io::Write;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

pub use catalog::FieldCatalog;
pub use config::FdsConfig;
pub use error::{FdsError, FdsResult};
pub use normalize::{CsvTable, Normalized, ResultNormalizer};
pub use processor::{FdsDump, QueryOutput};
pub use query::{CommandLine, OutputMode, Query, QueryCompiler};
pub use timeslots::{TimeRange, TimeRangeResolver};

use process::{ProcessCensus, PsCensus, running_instances};
use query::{parse_instant, parse_range};

#[derive(Parser, Debug)]
#[command(
    name = "fdsq",
    version,
    about = "Query fdsdump flow captures and get canonical field names back"
)]
pub struct Cli {
    /// Configuration file (defaults to ~/.config/fdsq/config.toml)
    #[arg(long, global = true, env = "FDSQ_CONFIG")]
    pub config: Option<PathBuf>,

    /// Machine-readable JSON output, including errors
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a query and print canonical rows
    Query(QueryArgs),
    /// Print the flow files a time range resolves to
    Resolve(RangeArgs),
    /// Print the fdsdump command a query compiles to, without running it
    Compile(QueryArgs),
    /// Check the fdsdump binary, data root and running processes
    Check,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RangeArgs {
    /// Sources, colon separated (e.g. eth0:eth1)
    #[arg(short = 'M', long, value_delimiter = ':', required = true)]
    pub sources: Vec<String>,

    /// Range start (epoch seconds or RFC 3339)
    #[arg(long, requires = "end", conflicts_with = "range")]
    pub start: Option<String>,

    /// Range end (epoch seconds or RFC 3339)
    #[arg(long, requires = "start", conflicts_with = "range")]
    pub end: Option<String>,

    /// Range as START/END
    #[arg(short = 'R', long)]
    pub range: Option<String>,
}

impl RangeArgs {
    fn time_range(&self) -> FdsResult<Option<TimeRange>> {
        if let Some(range) = &self.range {
            return parse_range(range).map(Some);
        }
        match (&self.start, &self.end) {
            (Some(start), Some(end)) => Ok(Some(TimeRange::new(
                parse_instant(start)?,
                parse_instant(end)?,
            ))),
            _ => Ok(None),
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct QueryArgs {
    #[command(flatten)]
    pub range: RangeArgs,

    /// Explicit file pattern relative to each source directory (repeatable)
    #[arg(short = 'r', long = "file")]
    pub files: Vec<String>,

    /// fdsdump filter expression
    #[arg(short = 'f', long)]
    pub filter: Option<String>,

    /// Aggregation keys (fdsdump column names, comma separated)
    #[arg(short = 'a', long, allow_hyphen_values = true)]
    pub aggregate: Option<String>,

    /// Aggregation values (fdsdump column names, comma separated)
    #[arg(short = 's', long)]
    pub values: Option<String>,

    /// Sort field; `tstart` and `tend` are accepted as shorthands
    #[arg(short = 'O', long)]
    pub sort: Option<String>,

    /// Maximum number of records
    #[arg(short = 'n', long)]
    pub limit: Option<u64>,

    /// fdsdump output mode
    #[arg(short = 'o', long, default_value = "csv", value_parser = parse_output_mode)]
    pub output: OutputMode,

    /// Output format: line, long, extended, or a canonical field list
    #[arg(long)]
    pub format: Option<String>,

    /// Extra fdsdump flag, passed through in order (repeatable)
    #[arg(long = "opt", value_name = "FLAG[=VALUE]", allow_hyphen_values = true)]
    pub opts: Vec<String>,
}

fn parse_output_mode(s: &str) -> Result<OutputMode, String> {
    s.parse::<OutputMode>().map_err(|e| e.to_string())
}

/// Split `FLAG=VALUE` into its parts; a bare `FLAG` has no value.
pub fn parse_raw_option(raw: &str) -> FdsResult<(String, Option<String>)> {
    let (flag, value) = match raw.split_once('=') {
        Some((flag, value)) => (flag, Some(value.to_string())),
        None => (raw, None),
    };
    if !flag.starts_with('-') || flag.len() < 2 {
        return Err(FdsError::InvalidQuery(format!(
            "option must look like -X or -X=VALUE, got '{raw}'"
        )));
    }
    Ok((flag.to_string(), value))
}

/// Build a [`Query`] from command-line arguments.
///
/// Flags reach fdsdump in this order: aggregation keys, aggregation values,
/// sort, limit, then `--opt` flags as given. An `-o` passed through `--opt`
/// overrides `--output`.
pub fn build_query(args: &QueryArgs) -> FdsResult<Query> {
    let mut query = Query::new();
    query.set_sources(args.range.sources.iter().cloned());

    if let Some(range) = args.range.time_range()? {
        query.set_time_range(range);
    }
    if !args.files.is_empty() {
        query.set_files(args.files.iter().cloned());
    }
    if let Some(keys) = &args.aggregate {
        query.apply_option("-a", Some(keys))?;
    }
    if let Some(values) = &args.values {
        query.apply_option("-s", Some(values))?;
    }
    if let Some(sort) = &args.sort {
        query.set_sort_field(sort);
    }
    if let Some(limit) = args.limit {
        query.set_limit(limit);
    }
    // before --opt, so an explicit `-o` there wins
    query.set_output(args.output);
    for raw in &args.opts {
        let (flag, value) = parse_raw_option(raw)?;
        query.apply_option(&flag, value.as_deref())?;
    }
    if let Some(filter) = &args.filter {
        query.set_filter(filter.as_str());
    }
    if let Some(format) = &args.format {
        query.set_format(format.as_str());
    }

    query.validate()?;
    Ok(query)
}

/// Error surfaced by the binary.
#[derive(Debug, Clone, Serialize)]
pub struct CliError {
    pub code: i32,
    pub kind: String,
    pub message: String,
    pub hint: Option<String>,
    pub retryable: bool,
}

impl CliError {
    fn usage(message: String, code: i32) -> Self {
        Self {
            code,
            kind: "usage".to_string(),
            message,
            hint: None,
            retryable: false,
        }
    }
}

impl From<FdsError> for CliError {
    fn from(err: FdsError) -> Self {
        Self {
            code: err.exit_code(),
            kind: err.kind().to_string(),
            message: err.to_string(),
            hint: Some(err.hint().to_string()),
            retryable: err.retryable(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        FdsError::Io(err).into()
    }
}

/// Parse command-line arguments. Help and version requests come back as a
/// `CliError` with code 0.
pub fn parse_cli(raw_args: Vec<String>) -> Result<Cli, CliError> {
    Cli::try_parse_from(raw_args).map_err(|err| {
        let code = if err.use_stderr() { 2 } else { 0 };
        CliError::usage(err.render().to_string(), code)
    })
}

/// Install the stderr logger. `FDSQ_LOG` takes precedence over `-v`.
pub fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("FDSQ_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))
}

fn load_config(cli: &Cli) -> Result<FdsConfig, CliError> {
    let config = match &cli.config {
        Some(path) => FdsConfig::load_from(path),
        None => FdsConfig::load(),
    };
    config.map_err(|e| FdsError::Config(e).into())
}

/// Execute a parsed command line.
pub fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match &cli.command {
        Commands::Query(args) => {
            let query = build_query(args)?;
            let output = FdsDump::new(config).execute(&query)?;
            print_query_output(&mut out, &output, cli.json)?;
        }
        Commands::Resolve(args) => {
            let query_args = QueryArgs {
                range: args.clone(),
                ..Default::default()
            };
            let query = build_query(&query_args)?;
            let files = FdsDump::new(config).resolve_files(&query)?;
            if cli.json {
                writeln!(out, "{}", serde_json::json!(files))?;
            } else {
                for file in files {
                    writeln!(out, "{file}")?;
                }
            }
        }
        Commands::Compile(args) => {
            let query = build_query(args)?;
            let (files, command) = FdsDump::new(config).plan(&query)?;
            if cli.json {
                let payload = serde_json::json!({
                    "files": files,
                    "program": command.program,
                    "args": command.args,
                    "command": command.render(),
                });
                writeln!(out, "{payload}")?;
            } else {
                writeln!(out, "{command}")?;
            }
        }
        Commands::Check => {
            let report = check_installation(&config, &PsCensus);
            if cli.json {
                writeln!(out, "{}", serde_json::to_string(&report).map_err(std::io::Error::other)?)?;
            } else {
                writeln!(out, "profile:       {}", report.profile)?;
                writeln!(
                    out,
                    "binary:        {} ({})",
                    config.binary,
                    report.binary_path.as_deref().unwrap_or("not found")
                )?;
                writeln!(
                    out,
                    "profiles-data: {} ({})",
                    config.profiles_data.display(),
                    if report.data_root_exists { "ok" } else { "missing" }
                )?;
                match report.running {
                    Some(n) => writeln!(
                        out,
                        "running:       {n} of {} allowed",
                        config.max_processes
                    )?,
                    None => writeln!(out, "running:       unknown (census failed)")?,
                }
            }
        }
    }
    Ok(())
}

/// Result of `fdsq check`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    /// Profile the installation serves.
    pub profile: String,
    /// Absolute path the binary resolves to, if it does.
    pub binary_path: Option<String>,
    pub data_root_exists: bool,
    /// Running instances per the census, `None` if the census failed.
    pub running: Option<usize>,
    pub max_processes: usize,
}

pub fn check_installation(config: &FdsConfig, census: &dyn ProcessCensus) -> CheckReport {
    CheckReport {
        profile: config.profile.clone(),
        binary_path: which::which(&config.binary)
            .ok()
            .map(|p| p.display().to_string()),
        data_root_exists: config.profiles_data.is_dir(),
        running: census
            .matching_lines(&config.binary)
            .ok()
            .map(|lines| running_instances(lines.len())),
        max_processes: config.max_processes,
    }
}

fn print_query_output(out: &mut impl Write, output: &QueryOutput, json: bool) -> Result<(), CliError> {
    match (&output.result, json) {
        (Normalized::Table(table), true) => {
            let payload = serde_json::json!({
                "files": output.files,
                "command": output.command.render(),
                "exit_code": output.exit_code,
                "fields": table.header,
                "records": table.to_records(),
            });
            writeln!(out, "{payload}")?;
        }
        (Normalized::Table(table), false) => {
            let mut writer = csv::Writer::from_writer(out);
            if !table.header.is_empty() {
                writer.write_record(&table.header).map_err(FdsError::from)?;
            }
            for row in &table.rows {
                writer.write_record(row).map_err(FdsError::from)?;
            }
            writer.flush()?;
        }
        (Normalized::Raw(lines), true) => {
            let payload = serde_json::json!({
                "files": output.files,
                "command": output.command.render(),
                "exit_code": output.exit_code,
                "lines": lines,
            });
            writeln!(out, "{payload}")?;
        }
        (Normalized::Raw(lines), false) => {
            for line in lines {
                writeln!(out, "{line}")?;
            }
        }
    }
    Ok(())
}
