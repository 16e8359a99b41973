//! Compile a [`Query`] into one fdsdump invocation.
//!
//! Argument order is fixed:
//!
//! ```text
//! <binary> [-r <file>]... -o <mode> [<flag> [<value>]]... [-f <filter>] [-s <values>] [-a <keys>]
//! ```
//!
//! `-s` and `-a` fall back to the catalog defaults only when the query did not
//! set them. Compilation is pure string construction.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::catalog::{DEFAULT_AGGREGATION_KEYS, DEFAULT_AGGREGATION_VALUES};
use crate::config::FdsConfig;
use crate::error::FdsResult;

use super::types::Query;

/// A compiled invocation: the program plus its argv.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    /// Shell-quoted rendering, each token quoted independently.
    pub fn render(&self) -> String {
        let tokens = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        shell_words::join(tokens)
    }

    /// The values passed with `-r`, in order.
    pub fn file_args(&self) -> Vec<&str> {
        self.args
            .windows(2)
            .filter(|pair| pair[0] == "-r")
            .map(|pair| pair[1].as_str())
            .collect()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Builds command lines for one installation.
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    binary: String,
    data_root: PathBuf,
}

impl QueryCompiler {
    pub fn new(binary: impl Into<String>, data_root: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            data_root: data_root.into(),
        }
    }

    pub fn from_config(config: &FdsConfig) -> Self {
        Self::new(config.binary.clone(), config.profiles_data.clone())
    }

    /// Compile `query` against `files` (bucket paths or patterns relative to a
    /// source directory). Every source is paired with every file.
    pub fn compile(&self, query: &Query, files: &[String]) -> FdsResult<CommandLine> {
        query.validate()?;

        let mut args = Vec::new();

        for source in query.sources() {
            for file in files {
                let path = self.data_root.join(source).join(file);
                args.push("-r".to_string());
                args.push(path.to_string_lossy().into_owned());
            }
        }

        args.push("-o".to_string());
        args.push(query.output().as_str().to_string());

        for (flag, value) in query.options().iter() {
            args.push(flag.to_string());
            if let Some(value) = value {
                args.push(value.to_string());
            }
        }

        if let Some(filter) = query.filter() {
            args.push("-f".to_string());
            args.push(filter.to_string());
        }

        if !query.options().contains("-s") {
            args.push("-s".to_string());
            args.push(DEFAULT_AGGREGATION_VALUES.to_string());
        }
        if !query.options().contains("-a") {
            args.push("-a".to_string());
            args.push(DEFAULT_AGGREGATION_KEYS.to_string());
        }

        Ok(CommandLine {
            program: self.binary.clone(),
            args,
        })
    }
}
