//! Shared setup for the session integration tests.

#![allow(dead_code)]

use castor_memory::{InMemoryServer, MemTable};
use castor_training::{ModelSession, RecordingNoticeSink, SequentialNames, Services, SessionConfig};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub const TRAIN_DATA: &str = "train_data";

pub struct Harness {
    pub server: Arc<InMemoryServer>,
    pub notices: Arc<RecordingNoticeSink>,
}

impl Harness {
    pub fn new(server: InMemoryServer) -> Self {
        init_tracing();
        Self { server: Arc::new(server), notices: Arc::new(RecordingNoticeSink::new()) }
    }

    /// A server holding an architecture table for `model` and a four-row training table.
    pub fn with_model(server: InMemoryServer, model: &str) -> Self {
        let harness = Self::new(server);
        harness.server.insert_table(MemTable::architecture(model));
        harness.server.insert_table(training_table());
        harness
    }

    pub async fn open(&self, name: &str) -> ModelSession {
        self.open_with(name, SessionConfig::default()).await
    }

    pub async fn open_with(&self, name: &str, config: SessionConfig) -> ModelSession {
        ModelSession::builder(Services::from_backend(self.server.clone()))
            .name(name)
            .config(config)
            .names(Arc::new(SequentialNames::new()))
            .notices(self.notices.clone())
            .build()
            .await
            .expect("session opens")
    }
}

/// Route session logs to the test output; `RUST_LOG=castor_training=debug` shows the remote calls.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn training_table() -> MemTable {
    ["cat", "dog", "dog", "cat"].iter().enumerate().fold(
        MemTable::new(TRAIN_DATA, &["_id_", "_image_", "_label_"]),
        |table, (i, label)| {
            table.with_row([
                ("_id_", json!(i)),
                ("_image_", json!(format!("img{i}.jpg"))),
                ("_label_", json!(label)),
            ])
        },
    )
}

pub fn path_of(dir: &Path, file: &str) -> String {
    format!("{}/{file}", dir.display())
}
