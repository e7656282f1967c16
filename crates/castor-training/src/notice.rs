use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;

/// Human-readable confirmations emitted by session operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    WeightsAttached { model: String, weights: String },
    AttributesAttached { model: String, weights: String },
    ModelRenamed { from: String, to: String },
    TrainingFromScratch { model: String },
    TrainingFinished { model: String, total_epochs: u32 },
    Exported { model: String, location: String },
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WeightsAttached { weights, .. } => {
                write!(f, "Model weights are attached successfully! ({weights})")
            }
            Self::AttributesAttached { weights, .. } => {
                write!(f, "Model attributes are attached successfully! ({weights})")
            }
            Self::ModelRenamed { to, .. } => write!(
                f,
                "Model table is loaded successfully! Model is renamed to \"{to}\" according to the model name in the table."
            ),
            Self::TrainingFromScratch { .. } => f.write_str("Training from scratch."),
            Self::TrainingFinished { model, total_epochs } => {
                write!(f, "Model \"{model}\" has been trained for {total_epochs} epochs in total.")
            }
            Self::Exported { location, .. } => write!(f, "Model is saved to {location}."),
        }
    }
}

pub trait NoticeSink: Send + Sync {
    fn on_notice(&self, notice: Notice);
}

#[derive(Debug, Default)]
pub struct StdoutNoticeSink;

impl NoticeSink for StdoutNoticeSink {
    fn on_notice(&self, notice: Notice) {
        println!("NOTE: {notice}");
    }
}

/// Forwards notices to `tracing` at info level.
#[derive(Debug, Default)]
pub struct TracingNoticeSink;

impl NoticeSink for TracingNoticeSink {
    fn on_notice(&self, notice: Notice) {
        info!(notice = ?notice, "{notice}");
    }
}

/// Keeps every notice in memory; handy for asserting on them.
#[derive(Debug, Default)]
pub struct RecordingNoticeSink {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNoticeSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

impl NoticeSink for RecordingNoticeSink {
    fn on_notice(&self, notice: Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingNoticeSink::new();
        sink.on_notice(Notice::TrainingFromScratch { model: "lenet".to_string() });
        sink.on_notice(Notice::WeightsAttached {
            model: "lenet".to_string(),
            weights: "lenet_weights".to_string(),
        });

        let notices = sink.notices();
        assert_eq!(notices.len(), 2);
        assert!(matches!(notices[0], Notice::TrainingFromScratch { .. }));
    }

    #[test]
    fn test_rename_notice_mentions_new_name() {
        let notice = Notice::ModelRenamed { from: "model_a".to_string(), to: "LeNet".to_string() };
        assert!(notice.to_string().contains("\"LeNet\""));
    }
}
