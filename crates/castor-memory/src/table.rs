//! Tables held by the in-memory server and their on-disk form.

use castor_abstraction::{RemoteError, RemoteResult, Row};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;

/// A server-side table: ordered columns, rows and extended attributes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MemTable {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Row>,
    /// Extended attributes attached with `add_attributes`.
    #[serde(default)]
    pub attributes: Vec<Row>,
    /// Binary payload of an exported store. Never written to disk.
    #[serde(skip)]
    pub blob: Option<Vec<u8>>,
}

impl MemTable {
    #[must_use]
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    /// Append a row given as `(column, value)` pairs.
    #[must_use]
    pub fn with_row<I, K>(mut self, cells: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.rows.push(cells.into_iter().map(|(k, v)| (k.into(), v)).collect());
        self
    }

    /// A small architecture table whose `modeltype` row declares `model_type`.
    #[must_use]
    pub fn architecture(model_type: &str) -> Self {
        Self::new(model_type, &["_DLKey0_", "_DLKey1_", "_DLLayerID_", "_DLNumVal_"])
            .with_row([
                ("_DLKey0_", json!(model_type)),
                ("_DLKey1_", json!("modeltype")),
                ("_DLLayerID_", json!(-1)),
                ("_DLNumVal_", json!(0)),
            ])
            .with_row([
                ("_DLKey0_", json!("data")),
                ("_DLKey1_", json!("layertype")),
                ("_DLLayerID_", json!(0)),
                ("_DLNumVal_", json!(1)),
            ])
            .with_row([
                ("_DLKey0_", json!("conv1")),
                ("_DLKey1_", json!("layertype")),
                ("_DLLayerID_", json!(1)),
                ("_DLNumVal_", json!(2)),
            ])
    }

    /// A weight table with one row per parameter.
    #[must_use]
    pub fn weights(name: impl Into<String>, parameters: usize) -> Self {
        let mut table = Self::new(name, &["_LayerID_", "_WeightID_", "_Weight_"]);
        table.rows = (0..parameters)
            .map(|i| {
                Row::from([
                    ("_LayerID_".to_string(), json!(1)),
                    ("_WeightID_".to_string(), json!(i)),
                    ("_Weight_".to_string(), json!(0.01 * (i as f64 + 1.0))),
                ])
            })
            .collect();
        table
    }

    /// Rows matching `clause`, or every row when there is none.
    pub fn select(&self, clause: Option<&str>) -> RemoteResult<Vec<Row>> {
        let Some(clause) = clause.filter(|c| !c.trim().is_empty()) else {
            return Ok(self.rows.clone());
        };
        let filter = WhereClause::parse(clause)?;
        Ok(self.rows.iter().filter(|row| filter.matches(row)).cloned().collect())
    }
}

/// Persist `table` as `{directory}/{file}`.
pub fn write_table_file(directory: &Path, file: &str, table: &MemTable) -> std::io::Result<()> {
    let encoded = serde_json::to_vec_pretty(table)?;
    std::fs::write(directory.join(file), encoded)
}

pub(crate) fn read_table_file(directory: &Path, file: &str) -> RemoteResult<MemTable> {
    let path = directory.join(file);
    let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RemoteError::NotFound(path.display().to_string()),
        _ => RemoteError::Other(format!("{}: {e}", path.display())),
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| RemoteError::Rejected(format!("{}: {e}", path.display())))
}

/// Conjunction of `column = value` comparisons, e.g. `_DLKey1_ = "modeltype" and _partind_ = 1`.
#[derive(Debug, Clone, PartialEq)]
struct WhereClause {
    terms: Vec<(String, Value)>,
}

impl WhereClause {
    fn parse(clause: &str) -> RemoteResult<Self> {
        let lowered = clause.to_ascii_lowercase();
        let mut terms = Vec::new();
        let mut rest = clause;
        let mut rest_lower = lowered.as_str();
        loop {
            let (term, next) = match rest_lower.find(" and ") {
                Some(at) => (&rest[..at], Some(at + " and ".len())),
                None => (rest, None),
            };
            let (column, value) = term.split_once('=').ok_or_else(|| {
                RemoteError::Rejected(format!("unsupported where clause: {clause}"))
            })?;
            terms.push((column.trim().to_string(), parse_literal(value.trim())));
            match next {
                Some(at) => {
                    rest = &rest[at..];
                    rest_lower = &rest_lower[at..];
                }
                None => break,
            }
        }
        Ok(Self { terms })
    }

    fn matches(&self, row: &Row) -> bool {
        self.terms.iter().all(|(column, expected)| {
            row.iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(column))
                .is_some_and(|(_, actual)| values_equal(actual, expected))
        })
    }
}

fn parse_literal(literal: &str) -> Value {
    let quoted = ['"', '\'']
        .iter()
        .find_map(|q| literal.strip_prefix(*q).and_then(|s| s.strip_suffix(*q)));
    match quoted {
        Some(text) => Value::String(text.to_string()),
        None => literal
            .parse::<f64>()
            .map_or_else(|_| Value::String(literal.to_string()), |n| json!(n)),
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => a.trim() == b,
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => false,
    }
}

/// Label used for grouping a cell in a frequency table.
pub(crate) fn label(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_model_type_row() {
        let arch = MemTable::architecture("LeNet");
        let rows = arch.select(Some("_DLKey1_ = \"modeltype\"")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("_DLKey0_"), Some(&json!("LeNet")));
    }

    #[test]
    fn test_select_conjunction_and_numbers() {
        let arch = MemTable::architecture("LeNet");
        let rows = arch.select(Some("_DLKey1_ = 'layertype' AND _DLLayerID_ = 1")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("_DLKey0_"), Some(&json!("conv1")));
    }

    #[test]
    fn test_select_rejects_unparseable_clause() {
        let arch = MemTable::architecture("LeNet");
        assert!(matches!(
            arch.select(Some("_DLKey1_ like 'model%'")),
            Err(RemoteError::Rejected(_))
        ));
    }

    #[test]
    fn test_table_file_round_trip_drops_blob() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = MemTable::weights("lenet_weights", 3);
        table.blob = Some(vec![1, 2, 3]);
        write_table_file(dir.path(), "lenet_weights.sashdat", &table).unwrap();

        let read = read_table_file(dir.path(), "lenet_weights.sashdat").unwrap();
        assert_eq!(read.rows, table.rows);
        assert!(read.blob.is_none());
        assert!(matches!(
            read_table_file(dir.path(), "missing.sashdat"),
            Err(RemoteError::NotFound(_))
        ));
    }
}
