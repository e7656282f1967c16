//! Naming conventions for the tables and files that make up one model.
//!
//! A model `lenet` owns the tables `lenet`, `lenet_weights` and
//! `lenet_weights_attr`, and is persisted as `lenet.sashdat`,
//! `lenet_weights.sashdat`, `lenet_weights_attr.sashdat` (or `lenet.astore`).

use crate::error::{ModelError, ModelResult};
use std::path::Path;

pub const WEIGHTS_SUFFIX: &str = "_weights";
pub const ATTR_SUFFIX: &str = "_attr";

#[must_use]
pub fn weights_table_name(model: &str) -> String {
    format!("{model}{WEIGHTS_SUFFIX}")
}

#[must_use]
pub fn weight_attrs_table_name(model: &str) -> String {
    format!("{model}{WEIGHTS_SUFFIX}{ATTR_SUFFIX}")
}

/// File stem used when persisting a model: spaces become underscores.
#[must_use]
pub fn sanitize_stem(model: &str) -> String {
    model.replace(' ', "_")
}

/// A server-side path split at its last `/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerPath<'a> {
    pub directory: &'a str,
    pub file: &'a str,
}

impl<'a> ServerPath<'a> {
    /// Paths are in Linux format and must name a file inside a directory.
    pub fn parse(path: &'a str) -> ModelResult<Self> {
        let (directory, file) = path
            .rsplit_once('/')
            .ok_or_else(|| ModelError::InvalidPath(path.to_string()))?;
        if file.is_empty() {
            return Err(ModelError::InvalidPath(path.to_string()));
        }
        Ok(Self { directory, file })
    }
}

/// Split `lenet.sashdat` into (`lenet`, `.sashdat`). The extension keeps its dot
/// and is empty when there is none.
#[must_use]
pub fn split_file_name(file: &str) -> (&str, &str) {
    let path = Path::new(file);
    match (path.file_stem().and_then(|s| s.to_str()), path.extension().and_then(|e| e.to_str())) {
        (Some(stem), Some(ext)) => (stem, &file[file.len() - ext.len() - 1..]),
        _ => (file, ""),
    }
}

/// Files that may sit next to a loaded architecture or weight file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingFiles {
    pub weights: String,
    pub weight_attrs: String,
}

impl SiblingFiles {
    /// `lenet.sashdat` → `lenet_weights.sashdat`, `lenet_weights_attr.sashdat`.
    #[must_use]
    pub fn for_architecture(file: &str) -> Self {
        let (stem, ext) = split_file_name(file);
        Self {
            weights: format!("{stem}{WEIGHTS_SUFFIX}{ext}"),
            weight_attrs: format!("{stem}{WEIGHTS_SUFFIX}{ATTR_SUFFIX}{ext}"),
        }
    }

    /// Attribute file next to a weight file:
    /// `lenet_weights.sashdat` → `lenet_weights_attr.sashdat`.
    #[must_use]
    pub fn attrs_for_weights(file: &str) -> String {
        let (stem, ext) = split_file_name(file);
        format!("{stem}{ATTR_SUFFIX}{ext}")
    }
}

/// File names used when a model is saved as a set of tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportLayout {
    stem: String,
    extension: String,
}

impl ExportLayout {
    #[must_use]
    pub fn new(model: &str, extension: &str) -> Self {
        Self { stem: sanitize_stem(model), extension: extension.to_string() }
    }

    #[must_use]
    pub fn architecture_file(&self) -> String {
        format!("{}{}", self.stem, self.extension)
    }

    #[must_use]
    pub fn weights_file(&self) -> String {
        format!("{}{WEIGHTS_SUFFIX}{}", self.stem, self.extension)
    }

    #[must_use]
    pub fn weight_attrs_file(&self) -> String {
        format!("{}{WEIGHTS_SUFFIX}{ATTR_SUFFIX}{}", self.stem, self.extension)
    }
}
