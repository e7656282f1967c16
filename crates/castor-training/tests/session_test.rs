//! Integration tests for opening a model session.

mod common;

use castor_memory::{InMemoryServer, Operation};
use castor_training::{load_session_config, ArtifactKind, ModelError, ModelSession, Services};
use common::Harness;
use std::sync::Arc;

#[tokio::test]
async fn test_session_without_name_gets_generated_one() {
    let server = Arc::new(InMemoryServer::new());
    let session =
        ModelSession::builder(Services::from_backend(server.clone())).build().await.unwrap();

    assert!(session.name().starts_with("Model_"));
    assert_eq!(session.name().len(), "Model_".len() + 6);
    assert!(!session.weights_bound());
    assert!(session.history().is_empty());
    assert_eq!(server.calls_of(Operation::LoadActionSet), vec!["deepLearn".to_string()]);
}

#[tokio::test]
async fn test_loaded_action_set_is_not_reloaded() {
    let harness = Harness::new(InMemoryServer::new().with_loaded_action_set("deepLearn"));
    let _session = harness.open("LeNet").await;

    assert_eq!(harness.server.calls_of(Operation::IsActionSetLoaded).len(), 1);
    assert!(harness.server.calls_of(Operation::LoadActionSet).is_empty());
}

#[tokio::test]
async fn test_blank_name_is_rejected() {
    let server = Arc::new(InMemoryServer::new());
    let err =
        ModelSession::builder(Services::from_backend(server)).name("  ").build().await.unwrap_err();

    assert!(matches!(err, ModelError::InvalidName(_)));
}

#[tokio::test]
async fn test_unavailable_deep_learning_actions() {
    let server = Arc::new(InMemoryServer::new().with_unavailable_action_set("deepLearn"));
    let err = ModelSession::builder(Services::from_backend(server))
        .name("LeNet")
        .build()
        .await
        .unwrap_err();

    assert!(matches!(err, ModelError::RemoteOperation { artifact: ArtifactKind::ActionSet, .. }));
}

#[tokio::test]
async fn test_model_info_lists_layers() {
    let harness = Harness::with_model(InMemoryServer::new(), "LeNet");
    let session = harness.open("LeNet").await;

    let info = session.model_info().await.unwrap();

    assert_eq!(info["model"], "LeNet");
    assert_eq!(info["layers"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_session_uses_workspace_config() {
    let workspace = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(workspace.path().join(".castor")).unwrap();
    std::fs::write(
        workspace.path().join(".castor/config.toml"),
        "[session]\nmax_epochs = 3\nbatch_size = 16\nepoch_accounting = \"observed\"\n",
    )
    .unwrap();

    let config = load_session_config(workspace.path()).unwrap();
    let harness = Harness::with_model(InMemoryServer::new(), "LeNet");
    let mut session = harness.open_with("LeNet", config).await;
    session.fit(common::TRAIN_DATA, session.fit_options()).await.unwrap();

    let request = harness.server.train_requests().remove(0);
    assert_eq!(request.optimizer.max_epochs, 3);
    assert_eq!(request.optimizer.mini_batch_size, 16);
    assert_eq!(session.history().cumulative_epochs(), 3);
}
