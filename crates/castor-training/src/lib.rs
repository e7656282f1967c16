//! Castor Training
//!
//! Client-side lifecycle of a deep-learning model held on a remote compute server:
//! - Binding architecture, weight and weight-attribute tables to one model identity
//! - Training with epoch numbering that continues across `fit` calls
//! - Validation scoring, feature extraction and feature-map decoding
//! - Exporting the trained model as a portable store or as table files

pub mod artifacts;
mod binder;
pub mod config;
pub mod error;
pub mod export;
pub mod feature_maps;
pub mod history;
pub mod layout;
pub mod names;
pub mod notice;
pub mod scoring;
pub mod session;
pub mod table_ref;
pub mod trainer;

pub use artifacts::{ArchitectureLoad, ArtifactKind, RenameOutcome, SiblingLoad};
pub use config::{
    load_session_config, EpochAccounting, OptimizerDefaults, SessionConfig, SessionConfigError,
};
pub use error::{ModelError, ModelResult};
pub use export::{DeployFormat, Deployment, TableExport};
pub use feature_maps::{
    FeatureMapFigure, FeatureMapPanel, FeatureMapStructure, FeatureMaps, GridLayout,
};
pub use history::{EpochRecord, HistoryPlot, TrainingHistory, DEFAULT_PLOT_ITEMS};
pub use names::{NameGenerator, RandomNames, SequentialNames};
pub use notice::{Notice, NoticeSink, RecordingNoticeSink, StdoutNoticeSink, TracingNoticeSink};
pub use scoring::{FeatureMatrix, PredictOptions, ValidationResult, PREDICTED_LABEL_COLUMN};
pub use session::{ModelSession, SessionBuilder, Services};
pub use table_ref::TableRef;
pub use trainer::{resolve_optimizer, FitOptions, OptimizerOverride};
