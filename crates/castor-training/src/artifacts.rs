use crate::error::ModelError;
use serde::{Deserialize, Serialize};

/// Kind of server-side object an operation touched; used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Architecture,
    Weights,
    WeightAttributes,
    TrainingData,
    ScoringData,
    ValidationResults,
    FeatureMaps,
    Features,
    PortableStore,
    StagingArea,
    ActionSet,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Architecture => "architecture",
            Self::Weights => "weights",
            Self::WeightAttributes => "weight attributes",
            Self::TrainingData => "training data",
            Self::ScoringData => "scoring data",
            Self::ValidationResults => "validation results",
            Self::FeatureMaps => "feature maps",
            Self::Features => "features",
            Self::PortableStore => "portable store",
            Self::StagingArea => "staging area",
            Self::ActionSet => "action set",
        };
        f.write_str(label)
    }
}

/// The model was renamed to the type name declared inside its architecture table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameOutcome {
    pub old_name: String,
    pub new_name: String,
}

/// What happened to an optional sibling file found next to a loaded artifact.
#[derive(Debug)]
pub enum SiblingLoad {
    /// No such file in the directory.
    Absent,
    /// Loaded and bound to the model.
    Bound { file: String },
    /// Present, but loading or binding it failed. The primary artifact stays bound.
    Failed { file: String, error: ModelError },
    /// The directory could not be listed, so whether the file exists is unknown.
    Unlisted { error: ModelError },
}

impl SiblingLoad {
    #[must_use]
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound { .. })
    }

    #[must_use]
    pub fn error(&self) -> Option<&ModelError> {
        match self {
            Self::Failed { error, .. } | Self::Unlisted { error } => Some(error),
            Self::Absent | Self::Bound { .. } => None,
        }
    }
}

/// Result of loading an architecture table from a file.
#[derive(Debug)]
pub struct ArchitectureLoad {
    /// Set when the table declared a different model name than the session had.
    pub rename: Option<RenameOutcome>,
    pub weights: SiblingLoad,
    pub weight_attrs: SiblingLoad,
}
