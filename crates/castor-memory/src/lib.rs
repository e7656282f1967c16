//! In-memory Castor server.
//!
//! `InMemoryServer` implements every collaborator trait of `castor-abstraction`
//! inside the current process. Tables live in a map keyed by their
//! case-folded name, staging areas point at real local directories and table
//! files are JSON documents. Every call is recorded, and failures can be
//! injected per operation, which makes the server the backbone of the
//! integration tests.

pub mod table;

use async_trait::async_trait;
use castor_abstraction::{
    ActionSetService, CrossTab, ExportService, Image, ImageService, IterationRecord, LayerImageType,
    RemoteError, RemoteResult, Row, ScoreEntry, ScoreOutcome, ScoreRequest, ScoringService,
    StagingHandle, TableDescriptor, TableHandle, TableStore, TrainOutcome, TrainRequest,
    TrainingService,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

pub use table::{write_table_file, MemTable};

/// Columns per layer in wide (feature) layer output.
const WIDE_FEATURES_PER_LAYER: usize = 4;
const IMAGE_SIDE: u32 = 4;

/// Every remote operation the server answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    RegisterStagingArea,
    DeregisterStagingArea,
    LoadTable,
    ListFiles,
    SaveTable,
    MaterializeCopy,
    DropTable,
    TableExists,
    ColumnNames,
    FetchRows,
    FetchMatrix,
    FetchColumn,
    AddAttributes,
    ConvertAttributes,
    Train,
    ModelInfo,
    Score,
    Crosstab,
    ExportPortable,
    Download,
    FetchImage,
    IsActionSetLoaded,
    LoadActionSet,
}

/// One recorded call: the operation and the object it was about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub operation: Operation,
    pub target: String,
}

#[derive(Debug, Clone)]
struct Failure {
    operation: Operation,
    /// Case-insensitive substring of the call target; empty matches every call.
    target: String,
    error: RemoteError,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, MemTable>,
    staging_areas: BTreeMap<String, PathBuf>,
    loaded_action_sets: BTreeSet<String>,
    unavailable_action_sets: BTreeSet<String>,
    calls: Vec<Call>,
    failures: Vec<Failure>,
    train_requests: Vec<TrainRequest>,
    score_requests: Vec<ScoreRequest>,
    layer_shapes: BTreeMap<u32, u32>,
    early_stop: Option<u32>,
}

impl State {
    /// Record the call, then fail it if a matching failure was injected.
    fn enter(&mut self, operation: Operation, target: &str) -> RemoteResult<()> {
        debug!(?operation, target, "In-memory server call");
        self.calls.push(Call { operation, target: target.to_string() });
        let target = target.to_ascii_lowercase();
        match self
            .failures
            .iter()
            .find(|f| f.operation == operation && target.contains(&f.target))
        {
            Some(failure) => Err(failure.error.clone()),
            None => Ok(()),
        }
    }

    fn table(&self, name: &str) -> RemoteResult<&MemTable> {
        self.tables
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| RemoteError::NotFound(format!("table '{name}'")))
    }

    fn table_mut(&mut self, name: &str) -> RemoteResult<&mut MemTable> {
        self.tables
            .get_mut(&name.to_ascii_lowercase())
            .ok_or_else(|| RemoteError::NotFound(format!("table '{name}'")))
    }

    fn insert(&mut self, table: MemTable) -> TableHandle {
        let handle = TableHandle::new(&table.name);
        self.tables.insert(table.name.to_ascii_lowercase(), table);
        handle
    }

    fn staging_dir(&self, area: &StagingHandle) -> RemoteResult<PathBuf> {
        self.staging_areas
            .get(&area.name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("staging area '{}'", area.name)))
    }

    /// Rows of `table` after applying the descriptor's own where clause.
    fn rows(&self, table: &TableDescriptor) -> RemoteResult<Vec<Row>> {
        self.table(&table.name)?.select(table.where_clause.as_deref())
    }
}

/// An in-process compute server.
#[derive(Debug, Default)]
pub struct InMemoryServer {
    state: Mutex<State>,
}

impl InMemoryServer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Activation images per layer produced by layer-image scoring.
    #[must_use]
    pub fn with_layer_shapes(self, shapes: impl IntoIterator<Item = (u32, u32)>) -> Self {
        self.lock().layer_shapes = shapes.into_iter().collect();
        self
    }

    /// Stop every training call after at most `epochs` epochs.
    #[must_use]
    pub fn with_early_stop(self, epochs: u32) -> Self {
        self.lock().early_stop = Some(epochs);
        self
    }

    #[must_use]
    pub fn with_loaded_action_set(self, action_set: &str) -> Self {
        self.lock().loaded_action_sets.insert(action_set.to_ascii_lowercase());
        self
    }

    /// Make loading `action_set` fail with `Unavailable`.
    #[must_use]
    pub fn with_unavailable_action_set(self, action_set: &str) -> Self {
        self.lock().unavailable_action_sets.insert(action_set.to_ascii_lowercase());
        self
    }

    /// Fail every `operation` whose target contains `target` (case-insensitive).
    pub fn fail_on(&self, operation: Operation, target: &str, error: RemoteError) {
        self.lock().failures.push(Failure {
            operation,
            target: target.to_ascii_lowercase(),
            error,
        });
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn insert_table(&self, table: MemTable) -> TableHandle {
        self.lock().insert(table)
    }

    #[must_use]
    pub fn table(&self, name: &str) -> Option<MemTable> {
        self.lock().tables.get(&name.to_ascii_lowercase()).cloned()
    }

    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.lock().tables.contains_key(&name.to_ascii_lowercase())
    }

    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.lock().tables.values().map(|t| t.name.clone()).collect()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Targets of every recorded call of `operation`, in call order.
    #[must_use]
    pub fn calls_of(&self, operation: Operation) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .map(|c| c.target.clone())
            .collect()
    }

    #[must_use]
    pub fn train_requests(&self) -> Vec<TrainRequest> {
        self.lock().train_requests.clone()
    }

    #[must_use]
    pub fn score_requests(&self) -> Vec<ScoreRequest> {
        self.lock().score_requests.clone()
    }

    /// Names of the staging areas that are still registered.
    #[must_use]
    pub fn registered_staging_areas(&self) -> Vec<String> {
        self.lock().staging_areas.keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TableStore for InMemoryServer {
    async fn register_staging_area(
        &self,
        name: &str,
        directory: &str,
    ) -> RemoteResult<StagingHandle> {
        let mut state = self.lock();
        state.enter(Operation::RegisterStagingArea, directory)?;
        let path = PathBuf::from(directory);
        if !path.is_dir() {
            return Err(RemoteError::NotFound(format!("directory '{directory}'")));
        }
        if state.staging_areas.contains_key(&name.to_ascii_lowercase()) {
            return Err(RemoteError::Rejected(format!("staging area '{name}' already exists")));
        }
        state.staging_areas.insert(name.to_ascii_lowercase(), path);
        Ok(StagingHandle { name: name.to_string(), path: directory.to_string() })
    }

    async fn deregister_staging_area(&self, handle: &StagingHandle) -> RemoteResult<()> {
        let mut state = self.lock();
        state.enter(Operation::DeregisterStagingArea, &handle.name)?;
        state
            .staging_areas
            .remove(&handle.name.to_ascii_lowercase())
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(format!("staging area '{}'", handle.name)))
    }

    async fn load_table(
        &self,
        area: &StagingHandle,
        file: &str,
        destination: &str,
    ) -> RemoteResult<TableHandle> {
        let mut state = self.lock();
        state.enter(Operation::LoadTable, file)?;
        let directory = state.staging_dir(area)?;
        let mut table = table::read_table_file(&directory, file)?;
        table.name = destination.to_string();
        Ok(state.insert(table))
    }

    async fn list_files(&self, area: &StagingHandle) -> RemoteResult<Vec<String>> {
        let mut state = self.lock();
        state.enter(Operation::ListFiles, &area.name)?;
        let directory = state.staging_dir(area)?;
        let entries = std::fs::read_dir(&directory).map_err(|e| RemoteError::Other(e.to_string()))?;
        let mut files: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().to_str().map(ToString::to_string))
            .collect();
        files.sort();
        Ok(files)
    }

    async fn save_table(
        &self,
        table: &TableDescriptor,
        area: &StagingHandle,
        file: &str,
    ) -> RemoteResult<()> {
        let mut state = self.lock();
        state.enter(Operation::SaveTable, file)?;
        let directory = state.staging_dir(area)?;
        let source = state.table(&table.name)?;
        write_table_file(&directory, file, source).map_err(|e| RemoteError::Other(e.to_string()))
    }

    async fn materialize_copy(
        &self,
        source: &TableDescriptor,
        destination: &str,
    ) -> RemoteResult<TableHandle> {
        let mut state = self.lock();
        state.enter(Operation::MaterializeCopy, &source.name)?;
        let original = state.table(&source.name)?;
        let copy = MemTable {
            name: destination.to_string(),
            columns: original.columns.clone(),
            rows: original.select(source.where_clause.as_deref())?,
            attributes: original.attributes.clone(),
            blob: original.blob.clone(),
        };
        Ok(state.insert(copy))
    }

    async fn drop_table(&self, table: &TableDescriptor) -> RemoteResult<()> {
        let mut state = self.lock();
        state.enter(Operation::DropTable, &table.name)?;
        state
            .tables
            .remove(&table.name.to_ascii_lowercase())
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(format!("table '{}'", table.name)))
    }

    async fn table_exists(&self, name: &str) -> RemoteResult<bool> {
        let mut state = self.lock();
        state.enter(Operation::TableExists, name)?;
        Ok(state.tables.contains_key(&name.to_ascii_lowercase()))
    }

    async fn column_names(&self, table: &TableDescriptor) -> RemoteResult<Vec<String>> {
        let mut state = self.lock();
        state.enter(Operation::ColumnNames, &table.name)?;
        Ok(state.table(&table.name)?.columns.clone())
    }

    async fn fetch_rows(
        &self,
        table: &TableDescriptor,
        where_clause: Option<&str>,
    ) -> RemoteResult<Vec<Row>> {
        let mut state = self.lock();
        state.enter(Operation::FetchRows, &table.name)?;
        let found = state.table(&table.name)?;
        let clause = match (table.where_clause.as_deref(), where_clause) {
            (Some(a), Some(b)) => Some(format!("{a} and {b}")),
            (a, b) => a.or(b).map(ToString::to_string),
        };
        found.select(clause.as_deref())
    }

    async fn fetch_matrix(&self, table: &TableDescriptor) -> RemoteResult<Vec<Vec<f64>>> {
        let mut state = self.lock();
        state.enter(Operation::FetchMatrix, &table.name)?;
        let columns = state.table(&table.name)?.columns.clone();
        let rows = state.rows(table)?;
        Ok(rows
            .iter()
            .map(|row| columns.iter().filter_map(|c| row.get(c).and_then(Value::as_f64)).collect())
            .collect())
    }

    async fn fetch_column(
        &self,
        table: &TableDescriptor,
        column: &str,
    ) -> RemoteResult<Vec<Value>> {
        let mut state = self.lock();
        state.enter(Operation::FetchColumn, &table.name)?;
        let found = state.table(&table.name)?;
        let name = found
            .columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(column))
            .cloned()
            .ok_or_else(|| {
                RemoteError::NotFound(format!("column '{column}' in '{}'", table.name))
            })?;
        let rows = state.rows(table)?;
        Ok(rows.iter().map(|row| row.get(&name).cloned().unwrap_or(Value::Null)).collect())
    }

    async fn add_attributes(
        &self,
        table: &TableDescriptor,
        attributes: &TableDescriptor,
    ) -> RemoteResult<()> {
        let mut state = self.lock();
        state.enter(Operation::AddAttributes, &attributes.name)?;
        let rows = state.rows(attributes)?;
        state.table_mut(&table.name)?.attributes = rows;
        Ok(())
    }

    async fn convert_attributes(
        &self,
        table: &TableDescriptor,
        destination: &str,
    ) -> RemoteResult<TableHandle> {
        let mut state = self.lock();
        state.enter(Operation::ConvertAttributes, &table.name)?;
        let attributes = state.table(&table.name)?.attributes.clone();
        let columns: BTreeSet<&String> = attributes.iter().flat_map(|row| row.keys()).collect();
        let converted = MemTable {
            name: destination.to_string(),
            columns: columns.into_iter().cloned().collect(),
            rows: attributes.clone(),
            ..MemTable::default()
        };
        Ok(state.insert(converted))
    }
}

#[async_trait]
impl TrainingService for InMemoryServer {
    async fn train(&self, request: TrainRequest) -> RemoteResult<TrainOutcome> {
        let mut state = self.lock();
        state.enter(Operation::Train, &request.model)?;
        state.table(&request.model)?;
        state.rows(&request.table)?;
        if let Some(init) = &request.init_weights {
            state.table(&init.name)?;
        }
        if !request.replace && state.table(&request.model_weights.name).is_ok() {
            return Err(RemoteError::Rejected(format!(
                "table '{}' already exists",
                request.model_weights.name
            )));
        }

        let requested = request.optimizer.max_epochs;
        let epochs = state.early_stop.map_or(requested, |stop| stop.min(requested));
        let learning_rate =
            request.optimizer.algorithm.as_ref().and_then(|a| a.learning_rate).unwrap_or(0.0);
        let iteration_history = (0..epochs)
            .map(|epoch| {
                let step = f64::from(epoch) + 1.0;
                IterationRecord {
                    epoch: f64::from(epoch),
                    metrics: BTreeMap::from([
                        ("Loss".to_string(), 2.0 / step),
                        ("FitError".to_string(), 0.5 / step),
                        ("LearningRate".to_string(), learning_rate),
                    ]),
                }
            })
            .collect();

        state.insert(MemTable::weights(&request.model_weights.name, 8));
        let summary = json!({
            "model": request.model,
            "epochs": epochs,
            "warmStart": request.init_weights.is_some(),
        });
        state.train_requests.push(request);
        Ok(TrainOutcome { iteration_history, summary })
    }

    async fn model_info(&self, model: &str) -> RemoteResult<Value> {
        let mut state = self.lock();
        state.enter(Operation::ModelInfo, model)?;
        let layers = state.table(model)?.select(Some("_DLKey1_ = \"layertype\""))?;
        let names: Vec<Value> =
            layers.iter().filter_map(|row| row.get("_DLKey0_").cloned()).collect();
        Ok(json!({ "model": model, "layers": names }))
    }
}

#[async_trait]
impl ScoringService for InMemoryServer {
    async fn score(&self, request: ScoreRequest) -> RemoteResult<ScoreOutcome> {
        let mut state = self.lock();
        state.enter(Operation::Score, &request.table.name)?;
        state.table(&request.model)?;
        state.table(&request.init_weights.name)?;
        let rows = state.rows(&request.table)?;

        let result_table = match &request.casout {
            Some(casout) => {
                let mut columns = request.copy_columns.clone();
                columns.push("_dl_predname_".to_string());
                let scored: Vec<Row> = rows
                    .iter()
                    .map(|row| {
                        let mut out: Row = request
                            .copy_columns
                            .iter()
                            .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                            .collect();
                        let predicted = request
                            .copy_columns
                            .last()
                            .and_then(|c| row.get(c))
                            .cloned()
                            .unwrap_or(Value::Null);
                        out.insert("_dl_predname_".to_string(), predicted);
                        out
                    })
                    .collect();
                Some(state.insert(MemTable {
                    name: casout.name.clone(),
                    columns,
                    rows: scored,
                    ..MemTable::default()
                }))
            }
            None => None,
        };

        if let Some(layer_output) = &request.layer_output {
            let table = match layer_output.image_type {
                LayerImageType::Image => {
                    let columns: Vec<String> = state
                        .layer_shapes
                        .iter()
                        .flat_map(|(layer, count)| {
                            (0..*count).map(move |i| format!("_LayerAct_{layer}_IMG_{i}_"))
                        })
                        .collect();
                    let row: Row = columns.iter().map(|c| (c.clone(), json!(c))).collect();
                    MemTable {
                        name: layer_output.destination.name.clone(),
                        columns,
                        rows: vec![row],
                        ..MemTable::default()
                    }
                }
                LayerImageType::Wide => {
                    let columns: Vec<String> = layer_output
                        .layers
                        .iter()
                        .flat_map(|layer| {
                            (0..WIDE_FEATURES_PER_LAYER).map(move |k| format!("{layer}_{k}"))
                        })
                        .collect();
                    let features: Vec<Row> = rows
                        .iter()
                        .enumerate()
                        .map(|(i, _)| {
                            columns
                                .iter()
                                .enumerate()
                                .map(|(k, c)| (c.clone(), json!(i as f64 + k as f64 / 10.0)))
                                .collect()
                        })
                        .collect();
                    MemTable {
                        name: layer_output.destination.name.clone(),
                        columns,
                        rows: features,
                        ..MemTable::default()
                    }
                }
            };
            state.insert(table);
        }

        let score_info = vec![
            ScoreEntry {
                descr: "Number of Observations Read".to_string(),
                value: rows.len().to_string(),
            },
            ScoreEntry {
                descr: "Number of Observations Used".to_string(),
                value: rows.len().to_string(),
            },
            ScoreEntry {
                descr: "Misclassification Error (%)".to_string(),
                value: "0".to_string(),
            },
        ];
        state.score_requests.push(request);
        Ok(ScoreOutcome { score_info, result_table })
    }

    async fn crosstab(
        &self,
        table: &TableDescriptor,
        row: &str,
        col: &str,
    ) -> RemoteResult<CrossTab> {
        let mut state = self.lock();
        state.enter(Operation::Crosstab, &table.name)?;
        let rows = state.rows(table)?;
        let pairs: Vec<(String, String)> = rows
            .iter()
            .map(|r| {
                let get = |c: &str| r.get(c).map_or_else(String::new, crate::table::label);
                (get(row), get(col))
            })
            .collect();

        let row_labels: Vec<String> =
            pairs.iter().map(|(r, _)| r.clone()).collect::<BTreeSet<_>>().into_iter().collect();
        let col_labels: Vec<String> =
            pairs.iter().map(|(_, c)| c.clone()).collect::<BTreeSet<_>>().into_iter().collect();
        let mut counts = vec![vec![0_u64; col_labels.len()]; row_labels.len()];
        for (r, c) in &pairs {
            if let (Ok(i), Ok(j)) = (row_labels.binary_search(r), col_labels.binary_search(c)) {
                counts[i][j] += 1;
            }
        }
        Ok(CrossTab { row_labels, col_labels, counts })
    }
}

#[async_trait]
impl ExportService for InMemoryServer {
    async fn export_portable(
        &self,
        model: &str,
        weights: &TableDescriptor,
        destination: &str,
    ) -> RemoteResult<TableHandle> {
        let mut state = self.lock();
        state.enter(Operation::ExportPortable, model)?;
        let architecture = state.table(model)?.rows.len();
        let parameters = state.table(&weights.name)?.rows.len();
        let blob = serde_json::to_vec(&json!({
            "model": model,
            "architectureRows": architecture,
            "parameters": parameters,
        }))
        .map_err(|e| RemoteError::Other(e.to_string()))?;
        Ok(state.insert(MemTable {
            name: destination.to_string(),
            blob: Some(blob),
            ..MemTable::default()
        }))
    }

    async fn download(&self, store: &TableHandle) -> RemoteResult<Vec<u8>> {
        let mut state = self.lock();
        state.enter(Operation::Download, &store.name)?;
        state
            .table(&store.name)?
            .blob
            .clone()
            .ok_or_else(|| RemoteError::Rejected(format!("table '{}' holds no store", store.name)))
    }
}

#[async_trait]
impl ImageService for InMemoryServer {
    async fn fetch_image(&self, table: &TableDescriptor, column: &str) -> RemoteResult<Image> {
        let mut state = self.lock();
        state.enter(Operation::FetchImage, column)?;
        let found = state.table(&table.name)?;
        if !found.columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
            return Err(RemoteError::NotFound(format!("column '{column}' in '{}'", table.name)));
        }
        let seed = column.bytes().fold(0_u8, u8::wrapping_add);
        let pixels = (0..IMAGE_SIDE * IMAGE_SIDE)
            .flat_map(|i| {
                let v = seed.wrapping_add(i as u8);
                [v, v.wrapping_add(1), v.wrapping_add(2)]
            })
            .collect();
        Ok(Image { width: IMAGE_SIDE, height: IMAGE_SIDE, channels: 3, pixels })
    }
}

#[async_trait]
impl ActionSetService for InMemoryServer {
    async fn is_loaded(&self, action_set: &str) -> RemoteResult<bool> {
        let mut state = self.lock();
        state.enter(Operation::IsActionSetLoaded, action_set)?;
        Ok(state.loaded_action_sets.contains(&action_set.to_ascii_lowercase()))
    }

    async fn load(&self, action_set: &str) -> RemoteResult<()> {
        let mut state = self.lock();
        state.enter(Operation::LoadActionSet, action_set)?;
        let key = action_set.to_ascii_lowercase();
        if state.unavailable_action_sets.contains(&key) {
            return Err(RemoteError::Unavailable(format!("action set '{action_set}'")));
        }
        state.loaded_action_sets.insert(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> TableDescriptor {
        TableDescriptor::named(name)
    }

    #[tokio::test]
    async fn test_tables_are_case_insensitive() {
        let server = InMemoryServer::new();
        server.insert_table(MemTable::weights("LeNet_Weights", 2));

        assert!(server.table_exists("lenet_weights").await.unwrap());
        let copy = server.materialize_copy(&descriptor("LENET_WEIGHTS"), "copy").await.unwrap();
        assert_eq!(copy.name, "copy");
        server.drop_table(&descriptor("lenet_weights")).await.unwrap();
        assert!(!server.has_table("LeNet_Weights"));
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded() {
        let server = InMemoryServer::new();
        server.insert_table(MemTable::weights("w", 1));
        server.fail_on(Operation::DropTable, "w", RemoteError::Rejected("locked".to_string()));

        let err = server.drop_table(&descriptor("w")).await.unwrap_err();
        assert_eq!(err, RemoteError::Rejected("locked".to_string()));
        assert_eq!(server.calls_of(Operation::DropTable), vec!["w".to_string()]);
        assert!(server.has_table("w"));
    }

    #[tokio::test]
    async fn test_staging_area_load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();
        write_table_file(dir.path(), "lenet.sashdat", &MemTable::architecture("LeNet")).unwrap();

        let server = InMemoryServer::new();
        let area = server.register_staging_area("Caslib_1", path).await.unwrap();
        assert_eq!(server.list_files(&area).await.unwrap(), vec!["lenet.sashdat".to_string()]);

        let loaded = server.load_table(&area, "lenet.sashdat", "Model_1").await.unwrap();
        server.save_table(&loaded.into(), &area, "copy.sashdat").await.unwrap();
        assert_eq!(server.list_files(&area).await.unwrap().len(), 2);

        server.deregister_staging_area(&area).await.unwrap();
        assert!(server.registered_staging_areas().is_empty());
        assert!(server.list_files(&area).await.is_err());
    }

    #[tokio::test]
    async fn test_crosstab_counts_pairs() {
        let server = InMemoryServer::new();
        server.insert_table(
            MemTable::new("scored", &["_label_", "_dl_predname_"])
                .with_row([("_label_", json!("cat")), ("_dl_predname_", json!("cat"))])
                .with_row([("_label_", json!("dog")), ("_dl_predname_", json!("cat"))])
                .with_row([("_label_", json!("dog")), ("_dl_predname_", json!("dog"))]),
        );

        let tab = server.crosstab(&descriptor("scored"), "_label_", "_dl_predname_").await.unwrap();
        assert_eq!(tab.row_labels, vec!["cat".to_string(), "dog".to_string()]);
        assert_eq!(tab.counts, vec![vec![1, 0], vec![1, 1]]);
    }

    #[tokio::test]
    async fn test_unavailable_action_set() {
        let server = InMemoryServer::new().with_unavailable_action_set("astore");
        assert!(!server.is_loaded("astore").await.unwrap());
        assert!(matches!(server.load("astore").await, Err(RemoteError::Unavailable(_))));
        server.load("deepLearn").await.unwrap();
        assert!(server.is_loaded("DEEPLEARN").await.unwrap());
    }
}
