//! Integration tests for binding architecture, weight and attribute tables.

mod common;

use castor_abstraction::RemoteError;
use castor_memory::{write_table_file, InMemoryServer, MemTable, Operation};
use castor_training::{ModelError, ModelSession, Notice, Services, SiblingLoad, TableRef};
use common::{path_of, Harness};
use serde_json::json;

fn attribute_table() -> MemTable {
    MemTable::new("attrs", &["_key_", "_value_"])
        .with_row([("_key_", json!("nClasses")), ("_value_", json!(2))])
}

#[tokio::test]
async fn test_load_architecture_renames_to_declared_model_type() {
    let dir = tempfile::tempdir().unwrap();
    write_table_file(dir.path(), "lenet.sashdat", &MemTable::architecture("LeNet")).unwrap();

    let harness = Harness::new(InMemoryServer::new());
    let mut session = harness.open("model_a").await;
    let loaded = session.load_architecture(&path_of(dir.path(), "lenet.sashdat")).await.unwrap();

    let rename = loaded.rename.expect("model is renamed");
    assert_eq!(rename.old_name, "model_a");
    assert_eq!(rename.new_name, "LeNet");
    assert_eq!(session.name(), "LeNet");
    assert_eq!(session.weights_table().name, "LeNet_weights");
    assert!(harness.server.has_table("LeNet"));
    assert!(!harness.server.has_table("model_a"));
    assert!(matches!(loaded.weights, SiblingLoad::Absent));
    assert!(harness.server.registered_staging_areas().is_empty());
    assert!(harness.notices.notices().iter().any(|n| {
        matches!(n, Notice::ModelRenamed { to, .. } if to == "LeNet")
    }));
}

#[tokio::test]
async fn test_load_architecture_keeps_name_when_types_match() {
    let dir = tempfile::tempdir().unwrap();
    write_table_file(dir.path(), "lenet.sashdat", &MemTable::architecture("lenet")).unwrap();

    let harness = Harness::new(InMemoryServer::new());
    let mut session = harness.open("LeNet").await;
    let loaded = session.load_architecture(&path_of(dir.path(), "lenet.sashdat")).await.unwrap();

    assert!(loaded.rename.is_none());
    assert_eq!(session.name(), "LeNet");
    assert!(harness.server.calls_of(Operation::MaterializeCopy).is_empty());
}

#[tokio::test]
async fn test_load_architecture_binds_sibling_weights_and_attributes() {
    let dir = tempfile::tempdir().unwrap();
    write_table_file(dir.path(), "lenet.sashdat", &MemTable::architecture("LeNet")).unwrap();
    write_table_file(dir.path(), "lenet_weights.sashdat", &MemTable::weights("w", 4)).unwrap();
    write_table_file(dir.path(), "lenet_weights_attr.sashdat", &attribute_table()).unwrap();

    let harness = Harness::new(InMemoryServer::new());
    let mut session = harness.open("LeNet").await;
    let loaded = session.load_architecture(&path_of(dir.path(), "lenet.sashdat")).await.unwrap();

    assert!(matches!(
        loaded.weights,
        SiblingLoad::Bound { ref file } if file == "lenet_weights.sashdat"
    ));
    assert!(matches!(
        loaded.weight_attrs,
        SiblingLoad::Bound { ref file } if file == "lenet_weights_attr.sashdat"
    ));
    assert!(session.weights_bound());
    assert_eq!(session.weight_attrs().map(|t| t.name.as_str()), Some("LeNet_weights_attr"));

    let weights = harness.server.table("LeNet_weights").expect("weights loaded");
    assert_eq!(weights.attributes.len(), 1);
    // The attribute table is cleared once attached.
    assert!(!harness.server.has_table("LeNet_weights_attr"));
    assert!(harness.server.registered_staging_areas().is_empty());
}

#[tokio::test]
async fn test_sibling_weight_failure_is_reported_not_raised() {
    let dir = tempfile::tempdir().unwrap();
    write_table_file(dir.path(), "lenet.sashdat", &MemTable::architecture("LeNet")).unwrap();
    write_table_file(dir.path(), "lenet_weights.sashdat", &MemTable::weights("w", 4)).unwrap();
    write_table_file(dir.path(), "lenet_weights_attr.sashdat", &attribute_table()).unwrap();

    let harness = Harness::new(InMemoryServer::new());
    harness.server.fail_on(
        Operation::LoadTable,
        "lenet_weights.sashdat",
        RemoteError::Rejected("corrupt".to_string()),
    );
    let mut session = harness.open("LeNet").await;
    let loaded = session.load_architecture(&path_of(dir.path(), "lenet.sashdat")).await.unwrap();

    assert!(matches!(
        loaded.weights,
        SiblingLoad::Failed { ref file, .. } if file == "lenet_weights.sashdat"
    ));
    assert_eq!(
        loaded.weights.error().and_then(ModelError::remote_source),
        Some(&RemoteError::Rejected("corrupt".to_string()))
    );
    assert!(matches!(loaded.weight_attrs, SiblingLoad::Absent));
    assert!(!session.weights_bound());
    assert!(harness.server.registered_staging_areas().is_empty());
}

#[tokio::test]
async fn test_staging_area_released_when_load_fails() {
    let dir = tempfile::tempdir().unwrap();

    let harness = Harness::new(InMemoryServer::new());
    let mut session = harness.open("LeNet").await;
    let err = session.load_architecture(&path_of(dir.path(), "missing.sashdat")).await.unwrap_err();

    assert!(matches!(err.remote_source(), Some(RemoteError::NotFound(_))));
    assert_eq!(harness.server.calls_of(Operation::DeregisterStagingArea).len(), 1);
    assert!(harness.server.registered_staging_areas().is_empty());
}

#[tokio::test]
async fn test_deregistration_failure_keeps_rename_visible() {
    let dir = tempfile::tempdir().unwrap();
    write_table_file(dir.path(), "lenet.sashdat", &MemTable::architecture("LeNet")).unwrap();

    let harness = Harness::new(InMemoryServer::new());
    harness.server.fail_on(
        Operation::DeregisterStagingArea,
        "",
        RemoteError::Other("busy".to_string()),
    );
    let mut session = harness.open("model_a").await;
    let err = session.load_architecture(&path_of(dir.path(), "lenet.sashdat")).await.unwrap_err();

    let ModelError::ArchitectureCleanup { ref cleanup, .. } = err else {
        panic!("expected a cleanup failure, got {err:?}");
    };
    assert!(matches!(
        **cleanup,
        ModelError::RemoteOperation { operation: "deregister staging area", .. }
    ));
    assert_eq!(err.remote_source(), Some(&RemoteError::Other("busy".to_string())));

    let rename = err.architecture_load().and_then(|load| load.rename.as_ref());
    assert_eq!(rename.map(|r| r.old_name.as_str()), Some("model_a"));
    assert_eq!(rename.map(|r| r.new_name.as_str()), Some("LeNet"));
    assert_eq!(session.name(), "LeNet");
}

#[tokio::test]
async fn test_listing_failure_leaves_siblings_unknown() {
    let dir = tempfile::tempdir().unwrap();
    write_table_file(dir.path(), "lenet.sashdat", &MemTable::architecture("LeNet")).unwrap();

    let harness = Harness::new(InMemoryServer::new());
    harness.server.fail_on(Operation::ListFiles, "", RemoteError::Other("denied".to_string()));
    let mut session = harness.open("LeNet").await;
    let loaded = session.load_architecture(&path_of(dir.path(), "lenet.sashdat")).await.unwrap();

    assert!(matches!(loaded.weights, SiblingLoad::Unlisted { .. }));
    assert_eq!(
        loaded.weights.error().and_then(ModelError::remote_source),
        Some(&RemoteError::Other("denied".to_string()))
    );
    assert!(matches!(loaded.weight_attrs, SiblingLoad::Absent));
    assert!(!session.weights_bound());
}

#[tokio::test]
async fn test_invalid_path_makes_no_remote_call() {
    let harness = Harness::new(InMemoryServer::new());
    let mut session = harness.open("LeNet").await;
    let before = harness.server.calls().len();

    let err = session.load_architecture("lenet.sashdat").await.unwrap_err();
    assert!(matches!(err, ModelError::InvalidPath(_)));
    assert!(matches!(session.load_weights("/models/").await, Err(ModelError::InvalidPath(_))));
    assert_eq!(harness.server.calls().len(), before);
}

#[tokio::test]
async fn test_binding_canonical_weights_makes_no_copy() {
    let harness = Harness::new(InMemoryServer::new());
    harness.server.insert_table(MemTable::weights("LeNet_weights", 2));
    let mut session = harness.open("LeNet").await;

    session.bind_weights("lenet_WEIGHTS").await.unwrap();

    assert!(session.weights_bound());
    assert!(harness.server.calls_of(Operation::MaterializeCopy).is_empty());
    assert!(harness.server.calls_of(Operation::DropTable).is_empty());
    assert!(harness.server.has_table("LeNet_weights"));
}

#[tokio::test]
async fn test_binding_other_weights_copies_and_drops_source() {
    let harness = Harness::new(InMemoryServer::new());
    harness.server.insert_table(MemTable::weights("trained", 3));
    let mut session = harness.open("LeNet").await;

    session.bind_weights(TableRef::try_from(json!({ "name": "trained" })).unwrap()).await.unwrap();

    assert_eq!(session.bound_weights().map(|t| t.name), Some("LeNet_weights".to_string()));
    assert_eq!(harness.server.table("LeNet_weights").map(|t| t.rows.len()), Some(3));
    assert!(!harness.server.has_table("trained"));
    assert!(matches!(
        harness.notices.notices().last(),
        Some(Notice::WeightsAttached { weights, .. }) if weights == "LeNet_weights"
    ));
}

#[tokio::test]
async fn test_builder_binds_initial_weights() {
    let harness = Harness::new(InMemoryServer::new());
    harness.server.insert_table(MemTable::weights("pretrained", 3));

    let session = ModelSession::builder(Services::from_backend(harness.server.clone()))
        .name("LeNet")
        .weights("pretrained")
        .notices(harness.notices.clone())
        .build()
        .await
        .unwrap();

    assert!(session.weights_bound());
    assert!(harness.server.has_table("LeNet_weights"));
}

#[tokio::test]
async fn test_load_weights_binds_attribute_sibling() {
    let dir = tempfile::tempdir().unwrap();
    write_table_file(dir.path(), "w.sashdat", &MemTable::weights("w", 2)).unwrap();
    write_table_file(dir.path(), "w_attr.sashdat", &attribute_table()).unwrap();

    let harness = Harness::new(InMemoryServer::new());
    let mut session = harness.open("LeNet").await;
    let attrs = session.load_weights(&path_of(dir.path(), "w.sashdat")).await.unwrap();

    assert!(matches!(attrs, SiblingLoad::Bound { ref file } if file == "w_attr.sashdat"));
    assert!(session.weights_bound());
    assert!(session.weight_attrs().is_some());
}

#[tokio::test]
async fn test_load_weight_attrs_from_file() {
    let dir = tempfile::tempdir().unwrap();
    write_table_file(dir.path(), "lenet_weights_attr.sashdat", &attribute_table()).unwrap();

    let harness = Harness::new(InMemoryServer::new());
    harness.server.insert_table(MemTable::weights("LeNet_weights", 2));
    let mut session = harness.open("LeNet").await;
    session.load_weight_attrs(&path_of(dir.path(), "lenet_weights_attr.sashdat")).await.unwrap();

    assert_eq!(harness.server.table("LeNet_weights").map(|t| t.attributes.len()), Some(1));
    assert!(harness.server.registered_staging_areas().is_empty());
}

#[tokio::test]
async fn test_attribute_bind_failure() {
    let harness = Harness::new(InMemoryServer::new());
    harness.server.insert_table(attribute_table());
    harness.server.fail_on(
        Operation::AddAttributes,
        "attrs",
        RemoteError::Rejected("bad task".to_string()),
    );
    let mut session = harness.open("LeNet").await;

    let err = session.bind_weight_attrs("attrs", true).await.unwrap_err();

    assert!(matches!(
        err,
        ModelError::AttributeBind { ref weights, .. } if weights == "LeNet_weights"
    ));
    assert!(session.weight_attrs().is_none());
    assert!(harness.server.has_table("attrs"));
}

#[tokio::test]
async fn test_attributes_kept_without_clear() {
    let harness = Harness::new(InMemoryServer::new());
    harness.server.insert_table(MemTable::weights("LeNet_weights", 2));
    harness.server.insert_table(attribute_table());
    let mut session = harness.open("LeNet").await;

    session.bind_weight_attrs("attrs", false).await.unwrap();

    assert!(harness.server.has_table("attrs"));
    assert!(harness.server.calls_of(Operation::DropTable).is_empty());
    assert_eq!(harness.server.table("LeNet_weights").map(|t| t.attributes.len()), Some(1));
    assert_eq!(session.weight_attrs().map(|t| t.name.as_str()), Some("attrs"));
}

#[tokio::test]
async fn test_failed_attribute_drop_still_records_binding() {
    let harness = Harness::new(InMemoryServer::new());
    harness.server.insert_table(MemTable::weights("LeNet_weights", 2));
    harness.server.insert_table(attribute_table());
    harness.server.fail_on(
        Operation::DropTable,
        "attrs",
        RemoteError::Rejected("locked".to_string()),
    );
    let mut session = harness.open("LeNet").await;

    session.bind_weight_attrs("attrs", true).await.unwrap();

    assert_eq!(harness.server.calls_of(Operation::DropTable), vec!["attrs".to_string()]);
    assert!(harness.server.has_table("attrs"));
    assert_eq!(session.weight_attrs().map(|t| t.name.as_str()), Some("attrs"));
    assert!(matches!(harness.notices.notices().last(), Some(Notice::AttributesAttached { .. })));
}
