//! Remote-service abstraction layer for Castor.
//!
//! This crate defines the collaborator traits the model-lifecycle core talks to
//! (training, scoring, table storage, export, images, action sets) together
//! with the request and response types that cross that boundary.

pub mod services;
pub mod table;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use services::{
    ActionSetService, AlgorithmConfig, Augmentation, CrossTab, ExportService, Image, ImageService,
    IterationRecord, LayerImageType, LayerOutput, OptimizerConfig, RandomCrop, RandomFlip,
    ScoreEntry, ScoreOutcome, ScoreRequest, ScoringService, TableStore, TrainOutcome,
    TrainRequest, TrainingService,
};
pub use table::{Row, StagingHandle, TableDescriptor, TableHandle};

/// Result alias for calls against the remote server.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Represents an error returned by (or while reaching) the remote compute server.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteError {
    /// The request could not be delivered (connection, transport, encoding).
    #[error("Request Error: {0}")]
    Request(String),

    /// The server received the request and rejected it (bad parameters, schema mismatch).
    #[error("Rejected: {0}")]
    Rejected(String),

    /// A table, file or staging area referenced by the request does not exist.
    #[error("Not Found: {0}")]
    NotFound(String),

    /// The action or action set needed for the request is not available.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Other unexpected errors.
    #[error("Other Remote Error: {0}")]
    Other(String),
}

impl RemoteError {
    /// Whether the error means the referenced object is missing on the server.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::Rejected("attribute table schema mismatch".to_string());
        assert_eq!(err.to_string(), "Rejected: attribute table schema mismatch");
    }

    #[test]
    fn test_remote_error_roundtrips_through_json() {
        let err = RemoteError::NotFound("lenet_weights".to_string());
        let json = serde_json::to_string(&err).unwrap();
        let back: RemoteError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
        assert!(back.is_not_found());
    }
}
