//! Query model and compiler.
//!
//! - [`types`]: [`Query`], [`OutputMode`], [`OptionList`]
//! - [`compile`]: [`QueryCompiler`] and the resulting [`CommandLine`]

pub mod compile;
pub mod types;

pub use compile::{CommandLine, QueryCompiler};
pub use types::{
    OptionList, OutputMode, Query, expand_sort_alias, parse_instant, parse_range, strip_negation,
};
