//! Scoring: validation predictions and dense-layer feature extraction.

use crate::artifacts::ArtifactKind;
use crate::error::{ModelError, ModelResult};
use crate::session::ModelSession;
use crate::table_ref::TableRef;
use castor_abstraction::{
    Augmentation, CrossTab, LayerImageType, LayerOutput, ScoreOutcome, ScoreRequest,
    TableDescriptor,
};
use serde_json::{Map, Value};
use tracing::debug;

/// Column the scoring service writes predicted labels into.
pub const PREDICTED_LABEL_COLUMN: &str = "_dl_predname_";

/// Outcome of the last `predict` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// Scored rows with the copied input and target columns.
    pub table: TableDescriptor,
    pub score: ScoreOutcome,
    /// Target (rows) by predicted label (columns).
    pub confusion_matrix: CrossTab,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictOptions {
    pub inputs: String,
    pub target: String,
    pub extra: Map<String, Value>,
}

/// Features extracted from one layer, aligned with the response column.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    /// One row per observation.
    pub x: Vec<Vec<f64>>,
    pub y: Vec<Value>,
}

impl FeatureMatrix {
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.x.len()
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.x.first().map_or(0, Vec::len)
    }
}

fn replace_table(name: &str) -> TableDescriptor {
    let mut desc = TableDescriptor::named(name);
    desc.options.insert("replace".to_string(), Value::Bool(true));
    desc
}

impl ModelSession {
    #[must_use]
    pub fn predict_options(&self) -> PredictOptions {
        PredictOptions {
            inputs: self.config.inputs.clone(),
            target: self.config.target.clone(),
            extra: Map::new(),
        }
    }

    /// Score `data` with the current weights and keep the result, summary and
    /// confusion matrix as the session's validation result.
    pub async fn predict(
        &mut self,
        data: impl Into<TableRef>,
        options: PredictOptions,
    ) -> ModelResult<ScoreOutcome> {
        let table = data.into().normalize()?;
        let destination = self.names.generate("Valid_Res");

        let request = ScoreRequest {
            model: self.name.clone(),
            init_weights: self.weights_table(),
            table: table.clone(),
            copy_columns: vec![options.inputs, options.target.clone()],
            augmentation: Augmentation::none(),
            casout: Some(replace_table(&destination)),
            layer_output: None,
            extra: options.extra,
        };

        debug!(
            model = %self.name,
            data = %table.name,
            destination = %destination,
            "Scoring validation data"
        );
        let score = self
            .services
            .scoring
            .score(request)
            .await
            .map_err(|e| ModelError::remote("score", ArtifactKind::ScoringData, &table.name, e))?;

        let results = score
            .result_table
            .clone()
            .map_or_else(|| TableDescriptor::named(&destination), TableDescriptor::from);
        let confusion_matrix = self
            .services
            .scoring
            .crosstab(&results, &options.target, PREDICTED_LABEL_COLUMN)
            .await
            .map_err(|e| {
                ModelError::remote("crosstab", ArtifactKind::ValidationResults, &results.name, e)
            })?;

        self.validation =
            Some(ValidationResult { table: results, score: score.clone(), confusion_matrix });
        Ok(score)
    }

    /// Extract the activations of `dense_layer` for every row of `data`.
    pub async fn extract_features(
        &self,
        data: impl Into<TableRef>,
        dense_layer: &str,
        target: &str,
        extra: Map<String, Value>,
    ) -> ModelResult<FeatureMatrix> {
        let table = data.into().normalize()?;
        if dense_layer.trim().is_empty() {
            return Err(ModelError::InvalidOptions("dense_layer must not be empty".to_string()));
        }
        let destination = replace_table(&self.names.generate("Features"));

        let request = ScoreRequest {
            model: self.name.clone(),
            init_weights: self.weights_table(),
            table: table.clone(),
            copy_columns: Vec::new(),
            augmentation: Augmentation::none(),
            casout: None,
            layer_output: Some(LayerOutput {
                destination: destination.clone(),
                image_type: LayerImageType::Wide,
                layers: vec![dense_layer.to_string()],
            }),
            extra,
        };

        debug!(
            model = %self.name,
            layer = dense_layer,
            destination = %destination.name,
            "Extracting features"
        );
        self.services
            .scoring
            .score(request)
            .await
            .map_err(|e| ModelError::remote("score", ArtifactKind::ScoringData, &table.name, e))?;

        let tables = &self.services.tables;
        let x = tables
            .fetch_matrix(&TableDescriptor::named(&destination.name))
            .await
            .map_err(|e| {
                ModelError::remote("fetch", ArtifactKind::Features, &destination.name, e)
            })?;
        let y = tables
            .fetch_column(&table, target)
            .await
            .map_err(|e| ModelError::remote("fetch", ArtifactKind::ScoringData, &table.name, e))?;

        Ok(FeatureMatrix { x, y })
    }
}
