//! Query value types.
//!
//! A [`Query`] keeps every tool flag in one ordered [`OptionList`]. The typed
//! setters (`set_sort_field`, `set_limit`, ...) write into that list, so the
//! order in which a caller sets things is the order the flags reach fdsdump.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FdsError, FdsResult};
use crate::timeslots::TimeRange;

/// Sort aliases accepted in place of full column expressions.
const SORT_ALIASES: &[(&str, &str)] = &[
    ("tstart", "flowStartMicroseconds:min"),
    ("tend", "flowEndMicroseconds:max"),
];

/// Output mode passed to fdsdump with `-o`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Csv,
    Json,
    Table,
}

impl OutputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Table => "table",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputMode {
    type Err = FdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            other => Err(FdsError::InvalidQuery(format!(
                "output mode must be csv, json or table, got '{other}'"
            ))),
        }
    }
}

/// Ordered `(flag, value)` pairs. A `None` value renders as a bare flag.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionList(Vec<(String, Option<String>)>);

impl OptionList {
    /// Set `flag`, replacing an earlier value in place.
    pub fn set(&mut self, flag: impl Into<String>, value: Option<String>) {
        let flag = flag.into();
        match self.0.iter_mut().find(|(f, _)| *f == flag) {
            Some(entry) => entry.1 = value,
            None => self.0.push((flag, value)),
        }
    }

    pub fn get(&self, flag: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(f, _)| f == flag)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.0.iter().any(|(f, _)| f == flag)
    }

    pub fn remove(&mut self, flag: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|(f, _)| f != flag);
        self.0.len() < before
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(f, v)| (f.as_str(), v.as_deref()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// A structured flow query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    sources: Vec<String>,
    time_range: Option<TimeRange>,
    explicit_files: Option<Vec<String>>,
    filter: Option<String>,
    output: OutputMode,
    options: OptionList,
    format: Option<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the source set. Order is kept, duplicates are dropped.
    pub fn set_sources<I, S>(&mut self, sources: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources.clear();
        for source in sources {
            let source = source.into();
            if !source.is_empty() && !self.sources.contains(&source) {
                self.sources.push(source);
            }
        }
        self
    }

    pub fn set_time_range(&mut self, range: TimeRange) -> &mut Self {
        self.time_range = Some(range);
        self
    }

    /// Use explicit file patterns (relative to each source directory) instead
    /// of resolving a time range.
    pub fn set_files<I, S>(&mut self, files: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.explicit_files = Some(files.into_iter().map(Into::into).collect());
        self
    }

    pub fn set_filter(&mut self, filter: impl Into<String>) -> &mut Self {
        let filter = filter.into();
        self.filter = (!filter.trim().is_empty()).then_some(filter);
        self
    }

    pub fn set_output(&mut self, mode: OutputMode) -> &mut Self {
        self.output = mode;
        self
    }

    /// Attach an output format (preset name or field list) used to project
    /// normalized rows.
    pub fn set_format(&mut self, format: impl Into<String>) -> &mut Self {
        self.format = Some(format.into());
        self
    }

    /// Sort field (`-O`). Known aliases are expanded.
    pub fn set_sort_field(&mut self, field: &str) -> &mut Self {
        self.options
            .set("-O", Some(expand_sort_alias(field).to_string()));
        self
    }

    /// Record limit (`-n`).
    pub fn set_limit(&mut self, limit: u64) -> &mut Self {
        self.options.set("-n", Some(limit.to_string()));
        self
    }

    /// Aggregation keys (`-a`).
    pub fn set_aggregation_keys<I, S>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = join_fields(keys);
        self.options
            .set("-a", Some(strip_negation(&joined).to_string()));
        self
    }

    /// Aggregation values (`-s`).
    pub fn set_aggregation_values<I, S>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.options.set("-s", Some(join_fields(values)));
        self
    }

    /// Pass a raw tool flag through unchanged.
    pub fn set_raw_option(&mut self, flag: impl Into<String>, value: Option<String>) -> &mut Self {
        self.options.set(flag, value);
        self
    }

    /// Apply a flag the way the legacy option setter did.
    ///
    /// - `-M a:b` sets the sources
    /// - `-R start/end` sets the time range (epoch seconds or RFC 3339)
    /// - `-r path` sets an explicit file pattern
    /// - `-c n` / `-n n` set the limit
    /// - `-a`, `-O`, `-s`, `-f` go through their typed setters
    /// - `-o mode` is applied only for `csv`, `json` or `table`
    /// - anything else is kept as a raw option
    pub fn apply_option(&mut self, flag: &str, value: Option<&str>) -> FdsResult<&mut Self> {
        let required = || {
            value.ok_or_else(|| FdsError::InvalidQuery(format!("option {flag} requires a value")))
        };

        match flag {
            "-M" => {
                self.set_sources(required()?.split(':'));
            }
            "-R" => {
                let range = parse_range(required()?)?;
                self.set_time_range(range);
            }
            "-r" => {
                self.set_files([required()?]);
            }
            "-c" | "-n" => {
                self.set_limit(parse_limit(required()?)?);
            }
            "-a" => {
                let keys = required()?;
                self.options
                    .set("-a", Some(strip_negation(keys).to_string()));
            }
            "-O" => {
                self.set_sort_field(required()?);
            }
            "-s" => {
                self.options.set("-s", Some(required()?.to_string()));
            }
            "-f" => {
                self.set_filter(required()?);
            }
            "-o" => match required()?.parse::<OutputMode>() {
                Ok(mode) => {
                    self.set_output(mode);
                }
                Err(_) => debug!(value, "ignoring unsupported output mode"),
            },
            _ => {
                self.options.set(flag, value.map(str::to_string));
            }
        }
        Ok(self)
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn time_range(&self) -> Option<&TimeRange> {
        self.time_range.as_ref()
    }

    pub fn explicit_files(&self) -> Option<&[String]> {
        self.explicit_files.as_deref()
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn output(&self) -> OutputMode {
        self.output
    }

    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    pub fn options(&self) -> &OptionList {
        &self.options
    }

    pub fn sort_field(&self) -> Option<&str> {
        self.options.get("-O")
    }

    pub fn limit(&self) -> Option<u64> {
        self.options.get("-n").and_then(|v| v.parse().ok())
    }

    pub fn aggregation_keys(&self) -> Option<Vec<&str>> {
        self.options.get("-a").map(split_fields)
    }

    pub fn aggregation_values(&self) -> Option<Vec<&str>> {
        self.options.get("-s").map(split_fields)
    }

    /// Check the query can be compiled.
    pub fn validate(&self) -> FdsResult<()> {
        if self.sources.is_empty() {
            return Err(FdsError::InvalidQuery("at least one source is required".into()));
        }
        match (&self.time_range, &self.explicit_files) {
            (Some(_), Some(_)) => {
                return Err(FdsError::InvalidQuery(
                    "set either a time range or explicit files, not both".into(),
                ));
            }
            (None, None) => {
                return Err(FdsError::InvalidQuery(
                    "a time range or explicit files are required".into(),
                ));
            }
            (None, Some(files)) if files.is_empty() => {
                return Err(FdsError::InvalidQuery("explicit file list is empty".into()));
            }
            _ => {}
        }
        if let Some(v) = self.options.get("-n") {
            parse_limit(v)?;
        }
        Ok(())
    }
}

/// Expand `tstart` / `tend` into fdsdump column expressions.
pub fn expand_sort_alias(field: &str) -> &str {
    SORT_ALIASES
        .iter()
        .find(|(alias, _)| *alias == field)
        .map(|(_, full)| *full)
        .unwrap_or(field)
}

/// Aggregation keys starting with `-` carry a two-character negation marker
/// that fdsdump does not understand; drop it.
pub fn strip_negation(keys: &str) -> &str {
    if keys.starts_with('-') {
        keys.char_indices().nth(2).map_or("", |(idx, _)| &keys[idx..])
    } else {
        keys
    }
}

/// Parse an instant given as epoch seconds or RFC 3339.
pub fn parse_instant(s: &str) -> FdsResult<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| FdsError::InvalidQuery(format!("timestamp out of range: {s}")));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FdsError::InvalidQuery(format!("invalid instant '{s}': {e}")))
}

/// Parse `start/end`.
pub fn parse_range(s: &str) -> FdsResult<TimeRange> {
    let (start, end) = s
        .split_once('/')
        .ok_or_else(|| FdsError::InvalidQuery(format!("range must be START/END, got '{s}'")))?;
    Ok(TimeRange::new(parse_instant(start)?, parse_instant(end)?))
}

fn parse_limit(s: &str) -> FdsResult<u64> {
    match s.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(FdsError::InvalidQuery(format!(
            "limit must be a positive integer, got '{s}'"
        ))),
    }
}

fn join_fields<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fields
        .into_iter()
        .map(|f| f.as_ref().trim().to_string())
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

fn split_fields(joined: &str) -> Vec<&str> {
    joined.split(',').filter(|f| !f.is_empty()).collect()
}
