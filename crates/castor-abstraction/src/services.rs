//! Collaborator traits and the payloads they exchange.
//!
//! Every trait is `Send + Sync` so one backend can be shared behind an `Arc`
//! by several sessions. None of them carries client-side bookkeeping: they
//! are thin request/response seams over the remote server.

use crate::table::{Row, StagingHandle, TableDescriptor, TableHandle};
use crate::RemoteResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Optimization algorithm options of a training request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmConfig {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_grad_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_grad_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lr_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_size: Option<u32>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

/// Fully resolved optimizer configuration sent with a training request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerConfig {
    /// `None` leaves the algorithm to the service default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<AlgorithmConfig>,
    pub mini_batch_size: u32,
    pub max_epochs: u32,
    pub log_level: u8,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainRequest {
    /// Architecture table name.
    pub model: String,
    pub table: TableDescriptor,
    pub inputs: Vec<String>,
    pub target: String,
    /// Warm-start weights; `None` trains from scratch.
    pub init_weights: Option<TableDescriptor>,
    /// Destination of the trained weights.
    pub model_weights: TableDescriptor,
    /// Overwrite `model_weights` in place.
    pub replace: bool,
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

/// One row of the per-iteration history returned by the training service.
///
/// `epoch` is zero-based and may come back as a float.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub epoch: f64,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainOutcome {
    pub iteration_history: Vec<IterationRecord>,
    /// Whatever else the service reported (model summary, timing, ...).
    #[serde(default)]
    pub summary: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RandomFlip {
    #[default]
    None,
    H,
    V,
    Hv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RandomCrop {
    #[default]
    None,
    Unique,
}

/// Data augmentation applied while scoring. Scoring from the core always disables it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Augmentation {
    pub random_flip: RandomFlip,
    pub random_crop: RandomCrop,
}

impl Augmentation {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerImageType {
    /// One image column per (layer, image index) pair.
    Image,
    /// One numeric column per feature, one row per observation.
    Wide,
}

/// Requests per-layer activations in addition to (or instead of) predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerOutput {
    pub destination: TableDescriptor,
    pub image_type: LayerImageType,
    /// Restrict output to these layers; empty means every layer.
    #[serde(default)]
    pub layers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub model: String,
    pub init_weights: TableDescriptor,
    pub table: TableDescriptor,
    #[serde(default)]
    pub copy_columns: Vec<String>,
    #[serde(default)]
    pub augmentation: Augmentation,
    #[serde(default)]
    pub casout: Option<TableDescriptor>,
    #[serde(default)]
    pub layer_output: Option<LayerOutput>,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

/// One `Descr`/`Value` line of a score summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub descr: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub score_info: Vec<ScoreEntry>,
    #[serde(default)]
    pub result_table: Option<TableHandle>,
}

impl ScoreOutcome {
    /// Look up a summary value by its description.
    #[must_use]
    pub fn value(&self, descr: &str) -> Option<&str> {
        self.score_info
            .iter()
            .find(|e| e.descr.eq_ignore_ascii_case(descr))
            .map(|e| e.value.as_str())
    }
}

/// Frequency table of two columns (e.g. true label by predicted label).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CrossTab {
    pub row_labels: Vec<String>,
    pub col_labels: Vec<String>,
    /// `counts[row][col]`.
    pub counts: Vec<Vec<u64>>,
}

/// Decoded image returned by the image service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    /// 1 (gray), 3 (RGB) or 4 (RGBA).
    pub channels: u8,
    /// Row-major, interleaved channels.
    pub pixels: Vec<u8>,
}

#[async_trait]
pub trait TrainingService: Send + Sync {
    async fn train(&self, request: TrainRequest) -> RemoteResult<TrainOutcome>;

    /// Layer-by-layer summary of an architecture table.
    async fn model_info(&self, model: &str) -> RemoteResult<Value>;
}

#[async_trait]
pub trait ScoringService: Send + Sync {
    async fn score(&self, request: ScoreRequest) -> RemoteResult<ScoreOutcome>;

    async fn crosstab(
        &self,
        table: &TableDescriptor,
        row: &str,
        col: &str,
    ) -> RemoteResult<CrossTab>;
}

/// Table storage, staging areas and table-level actions.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn register_staging_area(
        &self,
        name: &str,
        directory: &str,
    ) -> RemoteResult<StagingHandle>;

    async fn deregister_staging_area(&self, handle: &StagingHandle) -> RemoteResult<()>;

    /// Load `file` from the staging area into a table named `destination` (replacing it).
    async fn load_table(
        &self,
        area: &StagingHandle,
        file: &str,
        destination: &str,
    ) -> RemoteResult<TableHandle>;

    /// Names of the regular files directly under the staging area.
    async fn list_files(&self, area: &StagingHandle) -> RemoteResult<Vec<String>>;

    async fn save_table(
        &self,
        table: &TableDescriptor,
        area: &StagingHandle,
        file: &str,
    ) -> RemoteResult<()>;

    /// Materialize a full copy of `source` under `destination` (replacing it).
    async fn materialize_copy(
        &self,
        source: &TableDescriptor,
        destination: &str,
    ) -> RemoteResult<TableHandle>;

    async fn drop_table(&self, table: &TableDescriptor) -> RemoteResult<()>;

    async fn table_exists(&self, name: &str) -> RemoteResult<bool>;

    async fn column_names(&self, table: &TableDescriptor) -> RemoteResult<Vec<String>>;

    async fn fetch_rows(
        &self,
        table: &TableDescriptor,
        where_clause: Option<&str>,
    ) -> RemoteResult<Vec<Row>>;

    /// All numeric columns of the table, one inner vector per row.
    async fn fetch_matrix(&self, table: &TableDescriptor) -> RemoteResult<Vec<Vec<f64>>>;

    async fn fetch_column(&self, table: &TableDescriptor, column: &str) -> RemoteResult<Vec<Value>>;

    /// Attach the rows of `attributes` as extended attributes of `table` (task ADD).
    async fn add_attributes(
        &self,
        table: &TableDescriptor,
        attributes: &TableDescriptor,
    ) -> RemoteResult<()>;

    /// Extract the extended attributes of `table` into a new table `destination` (task CONVERT).
    async fn convert_attributes(
        &self,
        table: &TableDescriptor,
        destination: &str,
    ) -> RemoteResult<TableHandle>;
}

#[async_trait]
pub trait ExportService: Send + Sync {
    /// Export architecture + weights into a portable store held in table `destination`.
    async fn export_portable(
        &self,
        model: &str,
        weights: &TableDescriptor,
        destination: &str,
    ) -> RemoteResult<TableHandle>;

    async fn download(&self, store: &TableHandle) -> RemoteResult<Vec<u8>>;
}

#[async_trait]
pub trait ImageService: Send + Sync {
    /// Fetch the first image stored in `column`.
    async fn fetch_image(&self, table: &TableDescriptor, column: &str) -> RemoteResult<Image>;
}

#[async_trait]
pub trait ActionSetService: Send + Sync {
    async fn is_loaded(&self, action_set: &str) -> RemoteResult<bool>;

    async fn load(&self, action_set: &str) -> RemoteResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_optimizer_config_serializes_camel_case() {
        let config = OptimizerConfig {
            algorithm: Some(AlgorithmConfig {
                method: "momentum".to_string(),
                learning_rate: Some(0.01),
                clip_grad_min: Some(-1000.0),
                clip_grad_max: Some(1000.0),
                lr_policy: Some("step".to_string()),
                step_size: Some(15),
                extra: Map::new(),
            }),
            mini_batch_size: 1,
            max_epochs: 5,
            log_level: 3,
            extra: Map::new(),
        };

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["miniBatchSize"], json!(1));
        assert_eq!(value["maxEpochs"], json!(5));
        assert_eq!(value["algorithm"]["clipGradMax"], json!(1000.0));
        assert_eq!(value["algorithm"]["stepSize"], json!(15));
    }

    #[test]
    fn test_augmentation_defaults_to_none() {
        let aug = Augmentation::none();
        assert_eq!(aug.random_flip, RandomFlip::None);
        assert_eq!(aug.random_crop, RandomCrop::None);
        assert_eq!(serde_json::to_value(aug.random_flip).unwrap(), json!("NONE"));
    }

    #[test]
    fn test_score_outcome_value_lookup() {
        let outcome = ScoreOutcome {
            score_info: vec![ScoreEntry {
                descr: "Misclassification Error (%)".to_string(),
                value: "12.5".to_string(),
            }],
            result_table: None,
        };
        assert_eq!(outcome.value("misclassification error (%)"), Some("12.5"));
        assert_eq!(outcome.value("Loss"), None);
    }
}
