//! Binding server-side artifacts (architecture, weights, attributes) to a session.

use crate::artifacts::{ArchitectureLoad, ArtifactKind, RenameOutcome, SiblingLoad};
use crate::error::{ModelError, ModelResult};
use crate::layout::{ServerPath, SiblingFiles};
use crate::notice::Notice;
use crate::session::ModelSession;
use crate::table_ref::TableRef;
use castor_abstraction::{StagingHandle, TableDescriptor};
use tracing::{debug, info, warn};

/// Row of the architecture table holding the model's own type name.
const MODEL_TYPE_FILTER: &str = "_DLKey1_ = \"modeltype\"";
const MODEL_TYPE_COLUMN: &str = "_DLKey0_";

impl ModelSession {
    /// Bind `weights` as this model's weight table.
    ///
    /// A table already named `{name}_weights` is bound as is. Any other table is
    /// copied under that name and the source is dropped.
    pub async fn bind_weights(&mut self, weights: impl Into<TableRef>) -> ModelResult<()> {
        let source = weights.into().normalize()?;
        let canonical = self.weights_table();

        if !source.name_matches(&canonical.name) {
            debug!(
                model = %self.name,
                source = %source.name,
                "Copying weights under canonical name"
            );
            let tables = &self.services.tables;
            tables
                .materialize_copy(&source, &canonical.name)
                .await
                .map_err(|e| {
                    ModelError::remote("copy table", ArtifactKind::Weights, &source.name, e)
                })?;
            tables
                .drop_table(&source)
                .await
                .map_err(|e| {
                    ModelError::remote("drop table", ArtifactKind::Weights, &source.name, e)
                })?;
        }

        self.weights_bound = true;
        self.weight_attrs = None;
        info!(model = %self.name, weights = %canonical.name, "Weights bound");
        self.notify(Notice::WeightsAttached { model: self.name.clone(), weights: canonical.name });
        Ok(())
    }

    /// Attach the rows of `attributes` to the weight table. With `clear`, the
    /// attribute table is dropped once attached; a failed drop only logs a
    /// warning since the attributes are already on the weights.
    pub async fn bind_weight_attrs(
        &mut self,
        attributes: impl Into<TableRef>,
        clear: bool,
    ) -> ModelResult<()> {
        let attrs = attributes.into().normalize()?;
        let weights = self.weights_table();

        self.services.tables.add_attributes(&weights, &attrs).await.map_err(|source| {
            ModelError::AttributeBind {
                attributes: attrs.name.clone(),
                weights: weights.name.clone(),
                source,
            }
        })?;
        info!(model = %self.name, attributes = %attrs.name, "Weight attributes attached");

        if clear && let Err(error) = self.services.tables.drop_table(&attrs).await {
            warn!(attributes = %attrs.name, %error, "Failed to drop attached attribute table");
        }

        self.weight_attrs = Some(attrs);
        self.notify(Notice::AttributesAttached { model: self.name.clone(), weights: weights.name });
        Ok(())
    }

    /// Load an architecture table from a server-side file such as
    /// `/models/lenet.sashdat`, together with `lenet_weights.sashdat` and
    /// `lenet_weights_attr.sashdat` when they sit in the same directory.
    ///
    /// If the table declares a model name other than the session's, the session
    /// takes the declared name and the returned `rename` says so.
    pub async fn load_architecture(&mut self, path: &str) -> ModelResult<ArchitectureLoad> {
        let path = ServerPath::parse(path)?;
        let area = self.open_staging_area(path.directory).await?;
        match self.load_architecture_from(&area, path.file).await {
            // The load may already have renamed the session; keep it visible.
            Ok(load) => match self.close_staging_area(area, Ok(())).await {
                Ok(()) => Ok(load),
                Err(cleanup) => Err(ModelError::ArchitectureCleanup {
                    load: Box::new(load),
                    cleanup: Box::new(cleanup),
                }),
            },
            Err(err) => self.close_staging_area(area, Err(err)).await,
        }
    }

    /// Load a weight table from a file, plus its `_attr` sibling when present.
    pub async fn load_weights(&mut self, path: &str) -> ModelResult<SiblingLoad> {
        let path = ServerPath::parse(path)?;
        let area = self.open_staging_area(path.directory).await?;
        let result = self.load_weights_from(&area, path.file).await;
        self.close_staging_area(area, result).await
    }

    /// Load a weight-attribute table from a file and attach it to the weights.
    pub async fn load_weight_attrs(&mut self, path: &str) -> ModelResult<()> {
        let path = ServerPath::parse(path)?;
        let area = self.open_staging_area(path.directory).await?;
        let result = self.load_weight_attrs_from(&area, path.file).await;
        self.close_staging_area(area, result).await
    }

    async fn load_architecture_from(
        &mut self,
        area: &StagingHandle,
        file: &str,
    ) -> ModelResult<ArchitectureLoad> {
        let tables = self.services.tables.clone();
        let context = format!("{}/{file}", area.path);

        let loaded = tables
            .load_table(area, file, &self.name)
            .await
            .map(TableDescriptor::from)
            .map_err(|e| {
                ModelError::remote("load table", ArtifactKind::Architecture, &context, e)
            })?;

        let rows = tables
            .fetch_rows(&loaded, Some(MODEL_TYPE_FILTER))
            .await
            .map_err(|e| {
                ModelError::remote("read model type", ArtifactKind::Architecture, &context, e)
            })?;
        let declared = rows
            .first()
            .and_then(|row| row.get(MODEL_TYPE_COLUMN))
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let rename = match declared {
            Some(declared) if !declared.eq_ignore_ascii_case(&self.name) => {
                Some(self.rename_loaded_architecture(&loaded, declared, &context).await?)
            }
            Some(_) => None,
            None => {
                warn!(
                    model = %self.name,
                    file,
                    "Architecture table declares no model type; keeping current name"
                );
                None
            }
        };

        let siblings = SiblingFiles::for_architecture(file);
        let files = match tables.list_files(area).await {
            Ok(files) => files,
            Err(e) => {
                let error =
                    ModelError::remote("list files", ArtifactKind::StagingArea, &area.path, e);
                warn!(model = %self.name, %error, "Could not look for sibling files");
                return Ok(ArchitectureLoad {
                    rename,
                    weights: SiblingLoad::Unlisted { error },
                    weight_attrs: SiblingLoad::Absent,
                });
            }
        };

        let weights = if files.contains(&siblings.weights) {
            match self.load_weights_file(area, &siblings.weights).await {
                Ok(()) => SiblingLoad::Bound { file: siblings.weights },
                Err(error) => SiblingLoad::Failed { file: siblings.weights, error },
            }
        } else {
            SiblingLoad::Absent
        };

        // Attributes only make sense on top of freshly loaded weights.
        let weight_attrs = if weights.is_bound() && files.contains(&siblings.weight_attrs) {
            match self.load_weight_attrs_from(area, &siblings.weight_attrs).await {
                Ok(()) => SiblingLoad::Bound { file: siblings.weight_attrs },
                Err(error) => SiblingLoad::Failed { file: siblings.weight_attrs, error },
            }
        } else {
            SiblingLoad::Absent
        };

        info!(model = %self.name, file, "Architecture loaded");
        Ok(ArchitectureLoad { rename, weights, weight_attrs })
    }

    async fn rename_loaded_architecture(
        &mut self,
        loaded: &TableDescriptor,
        declared: String,
        context: &str,
    ) -> ModelResult<RenameOutcome> {
        let tables = self.services.tables.clone();
        tables
            .materialize_copy(loaded, &declared)
            .await
            .map_err(|e| ModelError::remote("copy table", ArtifactKind::Architecture, context, e))?;
        tables
            .drop_table(loaded)
            .await
            .map_err(|e| {
                ModelError::remote("drop table", ArtifactKind::Architecture, &loaded.name, e)
            })?;

        let old_name = std::mem::replace(&mut self.name, declared);
        // Bindings belonged to the old name.
        self.weights_bound = false;
        self.weight_attrs = None;

        info!(from = %old_name, to = %self.name, "Model renamed to declared model type");
        self.notify(Notice::ModelRenamed { from: old_name.clone(), to: self.name.clone() });
        Ok(RenameOutcome { old_name, new_name: self.name.clone() })
    }

    async fn load_weights_from(
        &mut self,
        area: &StagingHandle,
        file: &str,
    ) -> ModelResult<SiblingLoad> {
        self.load_weights_file(area, file).await?;

        let attrs_file = SiblingFiles::attrs_for_weights(file);
        let files = self
            .services
            .tables
            .list_files(area)
            .await
            .map_err(|e| {
                ModelError::remote("list files", ArtifactKind::StagingArea, &area.path, e)
            })?;

        if !files.contains(&attrs_file) {
            return Ok(SiblingLoad::Absent);
        }
        Ok(match self.load_weight_attrs_from(area, &attrs_file).await {
            Ok(()) => SiblingLoad::Bound { file: attrs_file },
            Err(error) => SiblingLoad::Failed { file: attrs_file, error },
        })
    }

    async fn load_weights_file(&mut self, area: &StagingHandle, file: &str) -> ModelResult<()> {
        let destination = self.weights_table().name;
        let loaded = self
            .services
            .tables
            .load_table(area, file, &destination)
            .await
            .map_err(|e| {
                ModelError::remote(
                    "load table",
                    ArtifactKind::Weights,
                    format!("{}/{file}", area.path),
                    e,
                )
            })?;
        self.bind_weights(loaded).await
    }

    async fn load_weight_attrs_from(
        &mut self,
        area: &StagingHandle,
        file: &str,
    ) -> ModelResult<()> {
        let destination = self.weight_attrs_table_name();
        let loaded = self
            .services
            .tables
            .load_table(area, file, &destination)
            .await
            .map_err(|e| {
                ModelError::remote(
                    "load table",
                    ArtifactKind::WeightAttributes,
                    format!("{}/{file}", area.path),
                    e,
                )
            })?;
        self.bind_weight_attrs(loaded, true).await
    }
}
