//! Reshape fdsdump output into canonical rows.
//!
//! In CSV mode the first record is the header; it is translated through the
//! [`FieldCatalog`] and the remaining records are kept positionally. JSON and
//! table output are handed back untouched.
//!
//! Every record after the header is data. fdsdump's CSV mode has no summary
//! footer, so nothing is trimmed from the end and no row is skipped by its
//! first cell.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::catalog::FieldCatalog;
use crate::error::FdsResult;
use crate::query::OutputMode;

/// Parsed CSV output with a canonical header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CsvTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.rows.is_empty()
    }

    /// Keep only `fields`, in the order given. Fields the header lacks are
    /// skipped; short rows are padded with empty values.
    pub fn project<S: AsRef<str>>(&self, fields: &[S]) -> CsvTable {
        let columns: Vec<usize> = fields
            .iter()
            .filter_map(|f| self.header.iter().position(|h| h == f.as_ref()))
            .collect();

        CsvTable {
            header: columns.iter().map(|&i| self.header[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| {
                    columns
                        .iter()
                        .map(|&i| row.get(i).cloned().unwrap_or_default())
                        .collect()
                })
                .collect(),
        }
    }

    /// Header first, then data rows.
    pub fn into_rows(self) -> Vec<Vec<String>> {
        let mut out = Vec::with_capacity(self.rows.len() + 1);
        if !self.header.is_empty() {
            out.push(self.header);
        }
        out.extend(self.rows);
        out
    }

    /// Rows as header-keyed JSON objects.
    pub fn to_records(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let map: Map<String, Value> = self
                    .header
                    .iter()
                    .zip(row.iter())
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                Value::Object(map)
            })
            .collect()
    }
}

/// Normalized result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum Normalized {
    Table(CsvTable),
    Raw(Vec<String>),
}

impl Normalized {
    pub fn as_table(&self) -> Option<&CsvTable> {
        match self {
            Normalized::Table(t) => Some(t),
            Normalized::Raw(_) => None,
        }
    }
}

/// Translates raw tool output using a field catalog.
#[derive(Debug, Clone, Copy)]
pub struct ResultNormalizer {
    catalog: &'static FieldCatalog,
}

impl Default for ResultNormalizer {
    fn default() -> Self {
        Self {
            catalog: FieldCatalog::global(),
        }
    }
}

impl ResultNormalizer {
    pub fn normalize(&self, lines: &[String], mode: OutputMode) -> FdsResult<Normalized> {
        match mode {
            OutputMode::Csv => self.parse_csv(lines).map(Normalized::Table),
            OutputMode::Json | OutputMode::Table => Ok(Normalized::Raw(lines.to_vec())),
        }
    }

    fn parse_csv(&self, lines: &[String]) -> FdsResult<CsvTable> {
        let text = lines.join("\n");
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut records = reader.records();
        let Some(first) = records.next().transpose()? else {
            return Ok(CsvTable::default());
        };
        let header = self.catalog.translate_header(&first.iter().collect::<Vec<_>>())?;

        let rows = records
            .map(|record| -> FdsResult<Vec<String>> {
                Ok(record?.iter().map(str::to_string).collect())
            })
            .collect::<FdsResult<Vec<_>>>()?;

        Ok(CsvTable { header, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FdsError;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn table(out: Normalized) -> CsvTable {
        match out {
            Normalized::Table(t) => t,
            other => panic!("expected table, got {other:?}"),
        }
    }

    #[test]
    fn header_is_translated_rows_kept() {
        let out = ResultNormalizer::default()
            .normalize(&lines(&["srcip,dstip", "10.0.0.1,10.0.0.2"]), OutputMode::Csv)
            .unwrap();
        let t = table(out);
        assert_eq!(t.header, vec!["sa", "da"]);
        assert_eq!(t.rows, vec![vec!["10.0.0.1", "10.0.0.2"]]);
        assert_eq!(
            t.into_rows(),
            vec![vec!["sa", "da"], vec!["10.0.0.1", "10.0.0.2"]]
        );
    }

    #[test]
    fn quoted_values_are_unquoted() {
        let out = ResultNormalizer::default()
            .normalize(
                &lines(&["srcip,proto", "\"10.0.0.1\",\"tcp, udp\""]),
                OutputMode::Csv,
            )
            .unwrap();
        assert_eq!(table(out).rows[0], vec!["10.0.0.1", "tcp, udp"]);
    }

    #[test]
    fn unknown_column_fails() {
        let err = ResultNormalizer::default()
            .normalize(&lines(&["srcip,tcpflags", "1,2"]), OutputMode::Csv)
            .unwrap_err();
        assert!(matches!(err, FdsError::UnknownField(c) if c == "tcpflags"));
    }

    #[test]
    fn every_record_after_header_is_data() {
        let out = ResultNormalizer::default()
            .normalize(
                &lines(&[
                    "srcip,dstip",
                    "limit,10.0.0.9",
                    "error,10.0.0.8",
                    "10.0.0.1,10.0.0.2",
                    "10.0.0.3,10.0.0.4",
                    "10.0.0.5,10.0.0.6",
                    "10.0.0.7,10.0.0.8",
                ]),
                OutputMode::Csv,
            )
            .unwrap();
        let t = table(out);
        assert_eq!(t.rows.len(), 6);
        assert_eq!(t.rows[0][0], "limit");
        assert_eq!(t.rows[5], vec!["10.0.0.7", "10.0.0.8"]);
    }

    #[test]
    fn empty_output_is_empty_table() {
        let out = ResultNormalizer::default()
            .normalize(&[], OutputMode::Csv)
            .unwrap();
        assert!(table(out).is_empty());
    }

    #[test]
    fn non_csv_passes_through() {
        let raw = lines(&["[{\"srcip\": \"10.0.0.1\"}]"]);
        let out = ResultNormalizer::default()
            .normalize(&raw, OutputMode::Json)
            .unwrap();
        assert_eq!(out, Normalized::Raw(raw));
    }

    #[test]
    fn projection_uses_requested_order() {
        let t = CsvTable {
            header: lines(&["sa", "da", "obyt"]),
            rows: vec![lines(&["a", "b", "9"]), lines(&["c", "d"])],
        };
        let p = t.project(&["obyt", "td", "sa"]);
        assert_eq!(p.header, vec!["obyt", "sa"]);
        assert_eq!(p.rows, vec![vec!["9", "a"], vec!["", "c"]]);
    }

    #[test]
    fn records_are_keyed_by_header() {
        let t = CsvTable {
            header: lines(&["sa", "dp"]),
            rows: vec![lines(&["10.0.0.1", "53"])],
        };
        let records = t.to_records();
        assert_eq!(records[0]["sa"], "10.0.0.1");
        assert_eq!(records[0]["dp"], "53");
    }
}
