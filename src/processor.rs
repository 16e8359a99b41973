//! End-to-end query execution against fdsdump.
//!
//! [`FdsDump::execute`] runs the whole pipeline for one query:
//!
//! 1. resolve flow files (time range) or take the explicit patterns
//! 2. compile the command line
//! 3. check the process census
//! 4. run fdsdump
//! 5. classify the exit status
//! 6. normalize (and optionally project) the output
//!
//! Each step fails with its own [`FdsError`] variant. Nothing is retried.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::output_format;
use crate::config::FdsConfig;
use crate::error::{FdsError, FdsResult, classify_exit};
use crate::normalize::{Normalized, ResultNormalizer};
use crate::process::{Invoker, ProcessCensus, PsCensus, check_budget};
use crate::query::{CommandLine, OutputMode, Query, QueryCompiler};
use crate::timeslots::TimeRangeResolver;

/// fdsdump flag that switches output to statistics; its output is not a
/// flow table.
const STATS_FLAG: &str = "-I";

/// Everything a caller may want to know about a finished query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutput {
    /// Files handed to fdsdump, relative to each source directory.
    pub files: Vec<String>,
    pub command: CommandLine,
    pub exit_code: i32,
    pub result: Normalized,
}

/// Query processor for one installation.
pub struct FdsDump {
    config: FdsConfig,
    resolver: TimeRangeResolver,
    compiler: QueryCompiler,
    invoker: Invoker,
    normalizer: ResultNormalizer,
    census: Arc<dyn ProcessCensus>,
}

impl FdsDump {
    pub fn new(config: FdsConfig) -> Self {
        let resolver = TimeRangeResolver::new(config.profiles_data.clone())
            .with_clock(config.timezone)
            .with_max_steps(config.max_probe_steps);
        Self {
            resolver,
            compiler: QueryCompiler::from_config(&config),
            invoker: Invoker::new(config.timeout()),
            normalizer: ResultNormalizer::default(),
            census: Arc::new(PsCensus),
            config,
        }
    }

    /// Replace the `ps`-based census.
    pub fn with_census(mut self, census: Arc<dyn ProcessCensus>) -> Self {
        self.census = census;
        self
    }

    pub fn config(&self) -> &FdsConfig {
        &self.config
    }

    /// Files for `query`: explicit patterns as given, or the resolved
    /// boundary buckets. Zero resolved files is [`FdsError::NoCoverage`].
    pub fn resolve_files(&self, query: &Query) -> FdsResult<Vec<String>> {
        query.validate()?;

        if let Some(files) = query.explicit_files() {
            return Ok(files.to_vec());
        }

        let range = query
            .time_range()
            .ok_or_else(|| FdsError::InvalidQuery("missing time range".into()))?;
        let files = self.resolver.resolve(range, query.sources());
        if files.is_empty() {
            return Err(FdsError::NoCoverage {
                sources: query.sources().join(":"),
            });
        }
        debug!(files = ?files, "resolved flow files");
        Ok(files)
    }

    /// Resolve and compile without running anything.
    pub fn plan(&self, query: &Query) -> FdsResult<(Vec<String>, CommandLine)> {
        let files = self.resolve_files(query)?;
        let command = self.compiler.compile(query, &files)?;
        Ok((files, command))
    }

    /// Run `query` and return canonical output.
    pub fn execute(&self, query: &Query) -> FdsResult<QueryOutput> {
        let fields = query.format().map(output_format).transpose()?;
        let (files, command) = self.plan(query)?;

        check_budget(
            self.census.as_ref(),
            &self.config.binary,
            self.config.max_processes,
        )?;

        let raw = self.invoker.run(&command)?;
        let rendered = command.render();
        // the wrapper shell reports start failures on stderr
        let diagnostics: Vec<String> = if raw.lines.is_empty() {
            raw.stderr.lines().map(str::to_string).collect()
        } else {
            raw.lines.clone()
        };
        if let Err(err) = classify_exit(raw.exit_code, &rendered, &diagnostics) {
            warn!(
                kind = err.kind(),
                exit_code = raw.exit_code,
                command = %rendered,
                stderr = %raw.stderr.trim(),
                output = ?raw.lines,
                "fdsdump failed"
            );
            return Err(err);
        }

        let mode = if query.options().contains(STATS_FLAG) {
            OutputMode::Table
        } else {
            query.output()
        };
        let result = match (fields, self.normalizer.normalize(&raw.lines, mode)?) {
            (Some(fields), Normalized::Table(table)) => Normalized::Table(table.project(&fields)),
            (_, result) => result,
        };

        info!(
            files = files.len(),
            exit_code = raw.exit_code,
            elapsed_ms = raw.elapsed.as_millis() as u64,
            "query finished"
        );
        Ok(QueryOutput {
            files,
            command,
            exit_code: raw.exit_code,
            result,
        })
    }
}
