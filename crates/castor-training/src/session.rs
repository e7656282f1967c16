//! The model session: one logical model identity and its bound server tables.

use crate::artifacts::ArtifactKind;
use crate::config::SessionConfig;
use crate::error::{ModelError, ModelResult};
use crate::feature_maps::FeatureMaps;
use crate::history::TrainingHistory;
use crate::layout::{weight_attrs_table_name, weights_table_name};
use crate::names::{NameGenerator, RandomNames};
use crate::notice::{Notice, NoticeSink, StdoutNoticeSink};
use crate::scoring::ValidationResult;
use crate::table_ref::TableRef;
use castor_abstraction::{
    ActionSetService, ExportService, ImageService, ScoringService, StagingHandle, TableDescriptor,
    TableStore, TrainingService,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub(crate) const DEEP_LEARN_ACTION_SET: &str = "deepLearn";

/// The remote collaborators a session talks to.
#[derive(Clone)]
pub struct Services {
    pub training: Arc<dyn TrainingService>,
    pub scoring: Arc<dyn ScoringService>,
    pub tables: Arc<dyn TableStore>,
    pub export: Arc<dyn ExportService>,
    pub images: Arc<dyn ImageService>,
    pub action_sets: Arc<dyn ActionSetService>,
}

impl Services {
    /// Use one backend for every collaborator.
    #[must_use]
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: TrainingService
            + ScoringService
            + TableStore
            + ExportService
            + ImageService
            + ActionSetService
            + 'static,
    {
        Self {
            training: backend.clone(),
            scoring: backend.clone(),
            tables: backend.clone(),
            export: backend.clone(),
            images: backend.clone(),
            action_sets: backend,
        }
    }
}

/// Builder for [`ModelSession`].
pub struct SessionBuilder {
    services: Services,
    name: Option<String>,
    weights: Option<TableRef>,
    config: SessionConfig,
    names: Arc<dyn NameGenerator>,
    notices: Arc<dyn NoticeSink>,
}

impl SessionBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Weights to bind right after the session is opened.
    #[must_use]
    pub fn weights(mut self, weights: impl Into<TableRef>) -> Self {
        self.weights = Some(weights.into());
        self
    }

    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn names(mut self, names: Arc<dyn NameGenerator>) -> Self {
        self.names = names;
        self
    }

    #[must_use]
    pub fn notices(mut self, notices: Arc<dyn NoticeSink>) -> Self {
        self.notices = notices;
        self
    }

    /// Open the session: make sure the deep-learning actions are loaded and
    /// bind the initial weights, if any.
    pub async fn build(self) -> ModelResult<ModelSession> {
        self.config.validate().map_err(ModelError::InvalidOptions)?;

        let name = match self.name {
            Some(name) if name.trim().is_empty() => {
                return Err(ModelError::InvalidName("model name must not be empty".to_string()));
            }
            Some(name) => name,
            None => self.names.generate("Model"),
        };

        let mut session = ModelSession {
            services: self.services,
            config: self.config,
            names: self.names,
            notices: self.notices,
            name,
            weights_bound: false,
            weight_attrs: None,
            history: TrainingHistory::new(),
            validation: None,
            feature_maps: None,
        };

        session
            .ensure_action_set(DEEP_LEARN_ACTION_SET)
            .await
            .map_err(|source| {
                ModelError::remote(
                    "load action set",
                    ArtifactKind::ActionSet,
                    DEEP_LEARN_ACTION_SET,
                    source,
                )
            })?;

        if let Some(weights) = self.weights {
            session.bind_weights(weights).await?;
        }

        debug!(model = %session.name, "Model session opened");
        Ok(session)
    }
}

/// A logical model bound to its architecture, weight and weight-attribute tables.
///
/// All operations take `&mut self` (or `&self`) and run one remote call at a
/// time; the session owns its name, bindings, history and last results.
pub struct ModelSession {
    pub(crate) services: Services,
    pub(crate) config: SessionConfig,
    pub(crate) names: Arc<dyn NameGenerator>,
    pub(crate) notices: Arc<dyn NoticeSink>,
    pub(crate) name: String,
    pub(crate) weights_bound: bool,
    pub(crate) weight_attrs: Option<TableDescriptor>,
    pub(crate) history: TrainingHistory,
    pub(crate) validation: Option<ValidationResult>,
    pub(crate) feature_maps: Option<FeatureMaps>,
}

impl std::fmt::Debug for ModelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSession")
            .field("name", &self.name)
            .field("weights_bound", &self.weights_bound)
            .field("weight_attrs", &self.weight_attrs)
            .field("cumulative_epochs", &self.history.cumulative_epochs())
            .finish_non_exhaustive()
    }
}

impl ModelSession {
    #[must_use]
    pub fn builder(services: Services) -> SessionBuilder {
        SessionBuilder {
            services,
            name: None,
            weights: None,
            config: SessionConfig::default(),
            names: Arc::new(RandomNames::default()),
            notices: Arc::new(StdoutNoticeSink),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The architecture table, named after the model.
    #[must_use]
    pub fn architecture_table(&self) -> TableDescriptor {
        TableDescriptor::named(&self.name)
    }

    /// The weight table this model trains into: always `{name}_weights`.
    #[must_use]
    pub fn weights_table(&self) -> TableDescriptor {
        TableDescriptor::named(weights_table_name(&self.name))
    }

    /// Whether weights have been trained or loaded for the current name.
    #[must_use]
    pub fn weights_bound(&self) -> bool {
        self.weights_bound
    }

    #[must_use]
    pub fn bound_weights(&self) -> Option<TableDescriptor> {
        self.weights_bound.then(|| self.weights_table())
    }

    /// Attribute table last attached to the weights, if any.
    #[must_use]
    pub fn weight_attrs(&self) -> Option<&TableDescriptor> {
        self.weight_attrs.as_ref()
    }

    /// Forget the attribute binding. The server-side weight table is untouched.
    pub fn detach_weight_attrs(&mut self) -> Option<TableDescriptor> {
        self.weight_attrs.take()
    }

    #[must_use]
    pub fn weight_attrs_table_name(&self) -> String {
        weight_attrs_table_name(&self.name)
    }

    #[must_use]
    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    #[must_use]
    pub fn validation(&self) -> Option<&ValidationResult> {
        self.validation.as_ref()
    }

    #[must_use]
    pub fn feature_maps(&self) -> Option<&FeatureMaps> {
        self.feature_maps.as_ref()
    }

    /// Layer summary of the architecture table.
    pub async fn model_info(&self) -> ModelResult<Value> {
        self.services
            .training
            .model_info(&self.name)
            .await
            .map_err(|source| {
                ModelError::remote("model info", ArtifactKind::Architecture, &self.name, source)
            })
    }

    pub(crate) fn notify(&self, notice: Notice) {
        self.notices.on_notice(notice);
    }

    pub(crate) async fn ensure_action_set(
        &self,
        action_set: &str,
    ) -> castor_abstraction::RemoteResult<()> {
        if !self.services.action_sets.is_loaded(action_set).await? {
            debug!(action_set, "Loading action set");
            self.services.action_sets.load(action_set).await?;
        }
        Ok(())
    }

    pub(crate) async fn open_staging_area(&self, directory: &str) -> ModelResult<StagingHandle> {
        let name = self.names.generate("Caslib");
        let area = self
            .services
            .tables
            .register_staging_area(&name, directory)
            .await
            .map_err(|source| {
                ModelError::remote(
                    "register staging area",
                    ArtifactKind::StagingArea,
                    directory,
                    source,
                )
            })?;
        debug!(staging_area = %area.name, directory, "Staging area registered");
        Ok(area)
    }

    /// Deregister `area` and hand back `result`. A deregistration failure only
    /// surfaces when the work itself succeeded.
    pub(crate) async fn close_staging_area<T>(
        &self,
        area: StagingHandle,
        result: ModelResult<T>,
    ) -> ModelResult<T> {
        let released = self.services.tables.deregister_staging_area(&area).await;
        debug!(staging_area = %area.name, released = released.is_ok(), "Staging area deregistered");
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(source)) => Err(ModelError::remote(
                "deregister staging area",
                ArtifactKind::StagingArea,
                area.path,
                source,
            )),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(source)) => {
                warn!(
                    staging_area = %area.name,
                    error = %source,
                    "Failed to deregister staging area after error"
                );
                Err(err)
            }
        }
    }
}
