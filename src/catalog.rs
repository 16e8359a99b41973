//! Field vocabulary shared with callers.
//!
//! fdsdump names its columns after IPFIX elements (`srcip`,
//! `flowStartMicroseconds:min`, ...). Callers get the short nfdump-style
//! names instead (`sa`, `ts`, ...). The mapping is strict: a column without a
//! canonical name is an error, never passed through.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::error::{FdsError, FdsResult};

/// fdsdump column → canonical field name.
const FIELD_PAIRS: &[(&str, &str)] = &[
    ("srcip", "sa"),
    ("dstip", "da"),
    ("srcport", "sp"),
    ("dstport", "dp"),
    ("proto", "pr"),
    ("packets", "opkt"),
    ("bytes", "obyt"),
    ("flowStartMicroseconds:min", "ts"),
    ("flowEndMicroseconds:max", "te"),
    ("flows", "fl"),
    ("biflowdir", "dir"),
];

/// Aggregation values requested when the caller gives none.
pub const DEFAULT_AGGREGATION_VALUES: &str =
    "packets,bytes,flows,flowStartMicroseconds:min,flowEndMicroseconds:max";

/// Aggregation keys requested when the caller gives none.
pub const DEFAULT_AGGREGATION_KEYS: &str = "srcip,dstip,srcport,dstport,proto,biflowdir";

const PRESET_LINE: &[&str] = &["ts", "td", "pr", "sa", "sp", "da", "dp", "ipkt", "ibyt", "fl"];
const PRESET_LONG: &[&str] = &[
    "ts", "td", "pr", "sa", "sp", "da", "dp", "flg", "stos", "dtos", "ipkt", "ibyt", "fl",
];
const PRESET_EXTENDED: &[&str] = &[
    "ts", "td", "pr", "sa", "sp", "da", "dp", "ipkt", "ibyt", "ibps", "ipps", "ibpp",
];

/// Names of the built-in presets.
pub const PRESET_NAMES: &[&str] = &["line", "long", "extended"];

static CATALOG: Lazy<FieldCatalog> = Lazy::new(FieldCatalog::build);

/// Bidirectional column-name mapping.
#[derive(Debug)]
pub struct FieldCatalog {
    to_canonical: HashMap<&'static str, &'static str>,
    to_tool: HashMap<&'static str, &'static str>,
}

impl FieldCatalog {
    fn build() -> Self {
        Self {
            to_canonical: FIELD_PAIRS.iter().copied().collect(),
            to_tool: FIELD_PAIRS.iter().map(|&(tool, canon)| (canon, tool)).collect(),
        }
    }

    /// The process-wide catalog.
    pub fn global() -> &'static FieldCatalog {
        &CATALOG
    }

    pub fn canonical(&self, tool_column: &str) -> Option<&'static str> {
        self.to_canonical.get(tool_column).copied()
    }

    pub fn tool_column(&self, canonical: &str) -> Option<&'static str> {
        self.to_tool.get(canonical).copied()
    }

    /// Translate a raw header row into canonical names.
    ///
    /// Fails on the first unknown column; no partial header is returned.
    pub fn translate_header<S: AsRef<str>>(&self, raw: &[S]) -> FdsResult<Vec<String>> {
        raw.iter()
            .map(|col| {
                let col = col.as_ref().trim();
                self.canonical(col)
                    .map(str::to_string)
                    .ok_or_else(|| FdsError::UnknownField(col.to_string()))
            })
            .collect()
    }

    /// Whether `name` is a canonical field (catalog or preset vocabulary).
    pub fn is_canonical(&self, name: &str) -> bool {
        self.to_tool.contains_key(name)
            || [PRESET_LINE, PRESET_LONG, PRESET_EXTENDED]
                .iter()
                .any(|preset| preset.contains(&name))
    }
}

/// Fields of a built-in preset.
pub fn preset(name: &str) -> FdsResult<&'static [&'static str]> {
    match name {
        "line" => Ok(PRESET_LINE),
        "long" => Ok(PRESET_LONG),
        "extended" => Ok(PRESET_EXTENDED),
        other => Err(FdsError::UnknownPreset(other.to_string())),
    }
}

/// Resolve an output format into an ordered field list.
///
/// A preset name yields the preset. Anything else must be a comma-separated
/// list of canonical names; a list with any other entry (a tool column such
/// as `srcip`, a typo) is an unknown preset.
pub fn output_format(format: &str) -> FdsResult<Vec<String>> {
    let format = format.trim();
    if let Ok(fields) = preset(format) {
        return Ok(fields.iter().map(|f| f.to_string()).collect());
    }

    let fields: Vec<String> = format
        .split(',')
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();

    let catalog = FieldCatalog::global();
    if fields.is_empty() || !fields.iter().all(|f| catalog.is_canonical(f)) {
        return Err(FdsError::UnknownPreset(format.to_string()));
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_known_columns() {
        let header = FieldCatalog::global()
            .translate_header(&["srcip", "dstip", "flowStartMicroseconds:min"])
            .unwrap();
        assert_eq!(header, vec!["sa", "da", "ts"]);
    }

    #[test]
    fn translation_is_repeatable() {
        let raw = ["proto", "bytes", "biflowdir"];
        let catalog = FieldCatalog::global();
        assert_eq!(
            catalog.translate_header(&raw).unwrap(),
            catalog.translate_header(&raw).unwrap()
        );
    }

    #[test]
    fn unknown_column_fails_whole_header() {
        let err = FieldCatalog::global()
            .translate_header(&["srcip", "ipVersion", "dstip"])
            .unwrap_err();
        match err {
            FdsError::UnknownField(col) => assert_eq!(col, "ipVersion"),
            other => panic!("expected unknown field, got {other:?}"),
        }
    }

    #[test]
    fn mapping_is_bidirectional() {
        let catalog = FieldCatalog::global();
        for &(tool, canon) in FIELD_PAIRS {
            assert_eq!(catalog.canonical(tool), Some(canon));
            assert_eq!(catalog.tool_column(canon), Some(tool));
        }
    }

    #[test]
    fn defaults_only_use_catalog_columns() {
        let catalog = FieldCatalog::global();
        for col in DEFAULT_AGGREGATION_VALUES
            .split(',')
            .chain(DEFAULT_AGGREGATION_KEYS.split(','))
        {
            assert!(catalog.canonical(col).is_some(), "{col} missing from catalog");
        }
    }

    #[test]
    fn presets_resolve() {
        for name in PRESET_NAMES {
            assert!(preset(name).is_ok());
        }
        assert_eq!(preset("line").unwrap()[0], "ts");
        assert!(matches!(preset("wide"), Err(FdsError::UnknownPreset(_))));
    }

    #[test]
    fn field_list_passes_through() {
        assert_eq!(output_format("sa,da,obyt").unwrap(), vec!["sa", "da", "obyt"]);
        assert_eq!(output_format("sa").unwrap(), vec!["sa"]);
        assert_eq!(output_format("extended").unwrap().len(), 12);
    }

    #[test]
    fn unknown_keyword_is_rejected() {
        assert!(matches!(
            output_format("fancy"),
            Err(FdsError::UnknownPreset(_))
        ));
        assert!(matches!(output_format(""), Err(FdsError::UnknownPreset(_))));
    }

    #[test]
    fn tool_column_list_is_rejected() {
        match output_format("srcip,dstip") {
            Err(FdsError::UnknownPreset(name)) => assert_eq!(name, "srcip,dstip"),
            other => panic!("expected unknown preset, got {other:?}"),
        }
        assert!(matches!(
            output_format("sa,dstip"),
            Err(FdsError::UnknownPreset(_))
        ));
    }
}
