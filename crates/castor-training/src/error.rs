use crate::artifacts::{ArchitectureLoad, ArtifactKind};
use crate::config::SessionConfigError;
use castor_abstraction::RemoteError;
use thiserror::Error;

pub type ModelResult<T> = std::result::Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid table reference: {0}")]
    InvalidTableReference(String),

    #[error("invalid path '{0}': expected '<directory>/<file>'")]
    InvalidPath(String),

    #[error("invalid model name: {0}")]
    InvalidName(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("{operation} failed for {artifact} '{context}': {source}")]
    RemoteOperation {
        operation: &'static str,
        artifact: ArtifactKind,
        context: String,
        #[source]
        source: RemoteError,
    },

    #[error("failed to attach attributes from '{attributes}' to '{weights}': {source}")]
    AttributeBind {
        attributes: String,
        weights: String,
        #[source]
        source: RemoteError,
    },

    /// The architecture was loaded, and the session possibly renamed, but the
    /// staging area could not be released afterwards.
    #[error("architecture loaded but cleanup failed: {cleanup}")]
    ArchitectureCleanup {
        load: Box<ArchitectureLoad>,
        #[source]
        cleanup: Box<ModelError>,
    },

    #[error("layer {0} has no feature maps")]
    UnknownLayer(u32),

    #[error("no feature maps have been extracted for this model")]
    NoFeatureMaps,

    #[error("unsupported deploy format '{0}': expected \"astore\", \"castable\" or \"table\"")]
    UnsupportedFormat(String),

    #[error("export error: {0}")]
    Export(String),

    #[error(transparent)]
    Config(#[from] SessionConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ModelError {
    /// Wrap a collaborator failure with the artifact and location it concerned.
    pub(crate) fn remote(
        operation: &'static str,
        artifact: ArtifactKind,
        context: impl Into<String>,
        source: RemoteError,
    ) -> Self {
        Self::RemoteOperation { operation, artifact, context: context.into(), source }
    }

    /// The underlying remote failure, if this error came from the server.
    #[must_use]
    pub fn remote_source(&self) -> Option<&RemoteError> {
        match self {
            Self::RemoteOperation { source, .. } | Self::AttributeBind { source, .. } => {
                Some(source)
            }
            Self::ArchitectureCleanup { cleanup, .. } => cleanup.remote_source(),
            _ => None,
        }
    }

    /// What an architecture load achieved before a cleanup failure.
    #[must_use]
    pub fn architecture_load(&self) -> Option<&ArchitectureLoad> {
        match self {
            Self::ArchitectureCleanup { load, .. } => Some(load.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_operation_message_names_artifact_and_path() {
        let err = ModelError::remote(
            "load table",
            ArtifactKind::Architecture,
            "/models/lenet.sashdat",
            RemoteError::NotFound("lenet.sashdat".to_string()),
        );
        let message = err.to_string();
        assert!(message.contains("load table"));
        assert!(message.contains("architecture"));
        assert!(message.contains("/models/lenet.sashdat"));
        assert!(err.remote_source().is_some_and(RemoteError::is_not_found));
    }

    #[test]
    fn test_local_errors_have_no_remote_source() {
        assert!(ModelError::InvalidPath("lenet.sashdat".to_string()).remote_source().is_none());
        assert!(ModelError::UnknownLayer(3).remote_source().is_none());
    }
}
