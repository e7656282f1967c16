use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One fetched row, keyed by column name.
pub type Row = BTreeMap<String, Value>;

/// Canonical, fully structured description of a server-side table.
///
/// Location options the core does not interpret (`replace`, `promote`, ...)
/// are carried through in `options`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caslib: Option<String>,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vars: Option<Vec<String>>,
    #[serde(default, flatten)]
    pub options: Map<String, Value>,
}

impl TableDescriptor {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    #[must_use]
    pub fn with_caslib(mut self, caslib: impl Into<String>) -> Self {
        self.caslib = Some(caslib.into());
        self
    }

    #[must_use]
    pub fn with_where(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    /// Table names are case-insensitive on the server.
    #[must_use]
    pub fn name_matches(&self, other: &str) -> bool {
        self.name.eq_ignore_ascii_case(other)
    }
}

/// Handle to a table that already exists on the server.
///
/// Returned by every call that creates or loads a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableHandle {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caslib: Option<String>,
}

impl TableHandle {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), caslib: None }
    }
}

impl From<TableHandle> for TableDescriptor {
    fn from(handle: TableHandle) -> Self {
        TableDescriptor { name: handle.name, caslib: handle.caslib, ..TableDescriptor::default() }
    }
}

impl std::fmt::Display for TableHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.caslib {
            Some(caslib) => write!(f, "{caslib}.{}", self.name),
            None => self.name.fmt(f),
        }
    }
}

/// A temporary registration giving the server file-system access to one directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StagingHandle {
    /// Server-side library name of the registration.
    pub name: String,
    /// Directory the registration points at.
    pub path: String,
}
