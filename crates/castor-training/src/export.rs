//! Persisting a trained model outside the server session.

use crate::artifacts::ArtifactKind;
use crate::error::{ModelError, ModelResult};
use crate::layout::ExportLayout;
use crate::notice::Notice;
use crate::session::ModelSession;
use castor_abstraction::{StagingHandle, TableDescriptor};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

pub(crate) const PORTABLE_ACTION_SET: &str = "astore";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployFormat {
    /// One self-contained blob written to the client file system.
    Portable,
    /// Architecture, weights and attributes saved as server-side table files.
    Tables,
}

impl FromStr for DeployFormat {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "astore" => Ok(Self::Portable),
            "castable" | "table" => Ok(Self::Tables),
            _ => Err(ModelError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// File names written by [`ModelSession::export_tables`], relative to `directory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableExport {
    pub directory: String,
    pub architecture: String,
    pub weights: String,
    pub weight_attrs: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deployment {
    Portable(PathBuf),
    Tables(TableExport),
}

impl ModelSession {
    /// Export the model as a portable store and write it to `{path}/{name}.astore`
    /// on the local file system. `path` is created when missing.
    pub async fn export_portable(&self, path: impl AsRef<Path>) -> ModelResult<PathBuf> {
        self.ensure_action_set(PORTABLE_ACTION_SET)
            .await
            .map_err(|e| {
                ModelError::Export(format!(
                    "action set '{PORTABLE_ACTION_SET}' is not available: {e}"
                ))
            })?;
        let weights = self
            .bound_weights()
            .ok_or_else(|| {
                ModelError::Export(format!(
                    "model '{}' has no trained or loaded weights",
                    self.name
                ))
            })?;

        let destination = self.names.generate("Model_astore");
        let export = &self.services.export;
        let store = export
            .export_portable(&self.name, &weights, &destination)
            .await
            .map_err(|e| ModelError::remote("export", ArtifactKind::PortableStore, &self.name, e))?;
        let blob = export
            .download(&store)
            .await
            .map_err(|e| {
                ModelError::remote("download", ArtifactKind::PortableStore, store.to_string(), e)
            })?;

        let directory = std::path::absolute(path.as_ref())?;
        tokio::fs::create_dir_all(&directory).await?;
        let file = directory.join(format!("{}{}", self.name, self.config.portable_extension));
        tokio::fs::write(&file, &blob).await?;

        info!(
            model = %self.name,
            path = %file.display(),
            bytes = blob.len(),
            "Portable store written"
        );
        self.notify(Notice::Exported {
            model: self.name.clone(),
            location: file.display().to_string(),
        });
        Ok(file)
    }

    /// Save architecture, weights and weight attributes as table files in the
    /// server-side directory `path`.
    pub async fn export_tables(&self, path: &str) -> ModelResult<TableExport> {
        let weights = self
            .bound_weights()
            .ok_or_else(|| {
                ModelError::Export(format!(
                    "model '{}' has no trained or loaded weights",
                    self.name
                ))
            })?;

        let area = self.open_staging_area(path).await?;
        let result = self.save_tables(&area, &weights).await;
        let export = self.close_staging_area(area, result).await?;

        self.notify(Notice::Exported {
            model: self.name.clone(),
            location: export.directory.clone(),
        });
        Ok(export)
    }

    /// Export in `format`, one of `astore`, `castable` or `table` (any case).
    pub async fn deploy(&self, path: &str, format: &str) -> ModelResult<Deployment> {
        match format.parse::<DeployFormat>()? {
            DeployFormat::Portable => self.export_portable(path).await.map(Deployment::Portable),
            DeployFormat::Tables => self.export_tables(path).await.map(Deployment::Tables),
        }
    }

    async fn save_tables(
        &self,
        area: &StagingHandle,
        weights: &TableDescriptor,
    ) -> ModelResult<TableExport> {
        let layout = ExportLayout::new(&self.name, &self.config.table_extension);
        let tables = &self.services.tables;

        let architecture = layout.architecture_file();
        tables
            .save_table(&self.architecture_table(), area, &architecture)
            .await
            .map_err(|e| {
                ModelError::remote("save table", ArtifactKind::Architecture, &architecture, e)
            })?;

        let weights_file = layout.weights_file();
        tables
            .save_table(weights, area, &weights_file)
            .await
            .map_err(|e| {
                ModelError::remote("save table", ArtifactKind::Weights, &weights_file, e)
            })?;

        let scratch = self.names.generate("Attr_Tbl");
        let attrs = tables
            .convert_attributes(weights, &scratch)
            .await
            .map(TableDescriptor::from)
            .map_err(|e| {
                ModelError::remote(
                    "convert attributes",
                    ArtifactKind::WeightAttributes,
                    &weights.name,
                    e,
                )
            })?;

        let weight_attrs = layout.weight_attrs_file();
        let saved = tables
            .save_table(&attrs, area, &weight_attrs)
            .await
            .map_err(|e| {
                ModelError::remote("save table", ArtifactKind::WeightAttributes, &weight_attrs, e)
            });
        if let Err(e) = tables.drop_table(&attrs).await {
            warn!(table = %attrs.name, error = %e, "Failed to drop temporary attribute table");
        }
        saved?;

        debug!(model = %self.name, directory = %area.path, "Model tables saved");
        Ok(TableExport {
            directory: area.path.clone(),
            architecture,
            weights: weights_file,
            weight_attrs,
        })
    }
}
