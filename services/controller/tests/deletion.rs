//! Integration tests for installation teardown.

mod common;

use landform_api::{
    condition_reasons, condition_types, get_condition, DataExport, DataImport, Execution,
    Installation, Phase, TargetExport, TargetImport, FINALIZER, OPERATION_ANNOTATION,
};
use landform_controller::store::Client;
use landform_reconcile::Action;
use serde_json::json;

use common::{installation, key, Harness, RETRY};

async fn delete(h: &Harness, name: &str) {
    h.store.delete::<Installation>(&key(name)).await.unwrap();
}

fn exporting_data(name: &str, data_ref: &str) -> Installation {
    let mut inst = installation(name, "leaf");
    inst.spec.exports.data.push(DataExport {
        name: "out".into(),
        data_ref: data_ref.into(),
    });
    inst
}

fn importing_data(name: &str, data_ref: &str) -> Installation {
    let mut inst = installation(name, "leaf");
    inst.spec.imports.data.push(DataImport {
        name: "in".into(),
        data_ref: data_ref.into(),
    });
    inst
}

#[tokio::test]
async fn test_leaf_installation_is_removed() {
    let h = Harness::new();
    h.write_leaf_blueprint("leaf");
    h.create(installation("a", "leaf")).await;
    h.settle("a").await;

    delete(&h, "a").await;
    assert!(h.exists("a").await);

    assert_eq!(h.reconcile("a").await, Action::Done);
    assert!(!h.exists("a").await);
}

#[tokio::test]
async fn test_installation_without_finalizer_is_purged_directly() {
    let h = Harness::new();
    h.create(installation("a", "leaf")).await;
    delete(&h, "a").await;
    assert!(!h.exists("a").await);
    assert_eq!(h.reconcile("a").await, Action::Done);
}

#[tokio::test]
async fn test_blocked_by_sibling_data_import() {
    let h = Harness::new();
    h.write_leaf_blueprint("leaf");
    h.create(exporting_data("network", "vpc-id")).await;
    h.create(importing_data("db", "vpc-id")).await;
    h.settle("network").await;
    h.settle("db").await;

    delete(&h, "network").await;
    assert_eq!(h.reconcile("network").await, Action::RequeueAfter(RETRY));
    assert_eq!(h.reconcile("network").await, Action::RequeueAfter(RETRY));

    let network = h.get("network").await;
    assert_eq!(network.status.phase, Phase::Deleting);
    assert!(network.status.last_error.is_none());
    assert!(network.metadata.has_finalizer(FINALIZER));
    let deleted = get_condition(&network.status.conditions, condition_types::DELETED).unwrap();
    assert_eq!(deleted.reason, condition_reasons::SIBLING_IMPORT);
    assert!(deleted.message.contains("db"));

    // The importer drops the import: teardown proceeds.
    let mut db = h.get("db").await;
    db.spec.imports.data.clear();
    h.store.update(&db).await.unwrap();

    assert_eq!(h.reconcile("network").await, Action::Done);
    assert!(!h.exists("network").await);
}

#[tokio::test]
async fn test_blocked_by_sibling_target_import_until_importer_is_gone() {
    let h = Harness::new();
    h.write_leaf_blueprint("leaf");
    let mut cluster = installation("cluster", "leaf");
    cluster.spec.exports.targets.push(TargetExport {
        name: "kubeconfig".into(),
        target: "shoot".into(),
    });
    let mut app = installation("app", "leaf");
    app.spec.imports.targets.push(TargetImport {
        name: "cluster".into(),
        target: "shoot".into(),
    });
    h.create(cluster).await;
    h.create(app).await;
    h.settle("cluster").await;
    h.settle("app").await;

    delete(&h, "cluster").await;
    delete(&h, "app").await;

    assert_eq!(h.reconcile("cluster").await, Action::RequeueAfter(RETRY));
    assert_eq!(h.reconcile("app").await, Action::Done);
    assert!(!h.exists("app").await);

    assert_eq!(h.reconcile("cluster").await, Action::Done);
    assert!(!h.exists("cluster").await);
}

#[tokio::test]
async fn test_siblings_in_other_scopes_do_not_block() {
    let h = Harness::new();
    h.write_leaf_blueprint("leaf");
    h.create(exporting_data("network", "vpc-id")).await;
    let mut nested = importing_data("db", "vpc-id");
    nested
        .metadata
        .labels
        .insert(landform_api::ENCOMPASSED_BY_LABEL.into(), "stack".into());
    h.create(nested).await;
    h.settle("network").await;

    delete(&h, "network").await;
    assert_eq!(h.reconcile("network").await, Action::Done);
    assert!(!h.exists("network").await);
}

#[tokio::test]
async fn test_execution_teardown_is_two_phase_and_never_reissued() {
    let h = Harness::new();
    h.write_blueprint(
        "app",
        "v1",
        json!({
            "name": "app",
            "deployItems": [{ "name": "chart", "type": "landform.io/helm" }]
        }),
    );
    h.create(installation("web", "app")).await;
    h.settle("web").await;

    // The deploy item subsystem guards the execution with its own finalizer.
    let mut exec: Execution = h.store.get(&key("web")).await.unwrap();
    exec.metadata.add_finalizer("deployer.landform.io");
    h.store.update(&exec).await.unwrap();

    delete(&h, "web").await;
    assert_eq!(h.reconcile("web").await, Action::RequeueAfter(RETRY));
    let exec: Execution = h.store.get(&key("web")).await.unwrap();
    assert!(exec.metadata.is_deleting());

    let inst = h.get("web").await;
    let deleted = get_condition(&inst.status.conditions, condition_types::DELETED).unwrap();
    assert_eq!(deleted.reason, condition_reasons::WAITING_FOR_DELETION);

    // Further cycles wait without issuing another delete.
    for _ in 0..3 {
        assert_eq!(h.reconcile("web").await, Action::RequeueAfter(RETRY));
    }
    assert_eq!(h.store.delete_requests::<Execution>(&key("web")).await, 1);
    assert!(h.exists("web").await);

    // The execution goes away; only then is the finalizer removed.
    let mut exec: Execution = h.store.get(&key("web")).await.unwrap();
    exec.metadata.remove_finalizer("deployer.landform.io");
    h.store.update(&exec).await.unwrap();

    assert_eq!(h.reconcile("web").await, Action::Done);
    assert!(!h.exists("web").await);
}

#[tokio::test]
async fn test_sub_installations_are_torn_down_before_parent() {
    let h = Harness::new();
    h.write_leaf_blueprint("leaf");
    h.write_blueprint(
        "stack",
        "v1",
        json!({
            "name": "stack",
            "subInstallations": [
                { "name": "db", "blueprint": { "type": "local", "name": "leaf", "version": "v1" } },
                { "name": "cache", "blueprint": { "type": "local", "name": "leaf", "version": "v1" } }
            ]
        }),
    );
    h.create(installation("stack", "stack")).await;
    h.settle("stack").await;
    h.settle("stack-db").await;
    h.settle("stack-cache").await;
    h.reconcile("stack").await;
    assert_eq!(h.get("stack").await.status.phase, Phase::Completed);

    delete(&h, "stack").await;
    assert_eq!(h.reconcile("stack").await, Action::RequeueAfter(RETRY));
    assert!(h.get("stack-db").await.metadata.is_deleting());
    assert!(h.get("stack-cache").await.metadata.is_deleting());

    assert_eq!(h.reconcile("stack").await, Action::RequeueAfter(RETRY));
    assert_eq!(h.store.delete_requests::<Installation>(&key("stack-db")).await, 1);

    assert_eq!(h.reconcile("stack-db").await, Action::Done);
    assert_eq!(h.reconcile("stack").await, Action::RequeueAfter(RETRY));
    assert!(h.exists("stack").await);

    assert_eq!(h.reconcile("stack-cache").await, Action::Done);
    assert_eq!(h.reconcile("stack").await, Action::Done);
    assert!(!h.exists("stack").await);
}

#[tokio::test]
async fn test_dropped_execution_is_awaited_before_parent_is_removed() {
    let h = Harness::new();
    h.write_blueprint(
        "app",
        "v1",
        json!({
            "name": "app",
            "deployItems": [{ "name": "chart", "type": "landform.io/helm" }]
        }),
    );
    h.create(installation("web", "app")).await;
    h.settle("web").await;

    let mut exec: Execution = h.store.get(&key("web")).await.unwrap();
    exec.metadata.add_finalizer("deployer.landform.io");
    h.store.update(&exec).await.unwrap();

    // The blueprint stops deploying anything.
    h.write_blueprint("app", "v1", json!({ "name": "app" }));
    let mut inst = h.get("web").await;
    inst.metadata
        .annotations
        .insert(OPERATION_ANNOTATION.into(), "reconcile".into());
    h.store.update(&inst).await.unwrap();

    assert_eq!(h.reconcile("web").await, Action::Done);
    let inst = h.get("web").await;
    assert!(inst.status.execution_ref.is_some());
    assert_eq!(inst.status.phase, Phase::Progressing);
    let exec: Execution = h.store.get(&key("web")).await.unwrap();
    assert!(exec.metadata.is_deleting());

    delete(&h, "web").await;
    assert_eq!(h.reconcile("web").await, Action::RequeueAfter(RETRY));
    assert_eq!(h.reconcile("web").await, Action::RequeueAfter(RETRY));
    assert!(h.exists("web").await);
    assert_eq!(h.store.delete_requests::<Execution>(&key("web")).await, 1);

    let mut exec: Execution = h.store.get(&key("web")).await.unwrap();
    exec.metadata.remove_finalizer("deployer.landform.io");
    h.store.update(&exec).await.unwrap();

    assert_eq!(h.reconcile("web").await, Action::Done);
    assert!(!h.exists("web").await);
}

#[tokio::test]
async fn test_execution_and_sub_installations_must_both_be_gone() {
    let h = Harness::new();
    h.write_leaf_blueprint("leaf");
    h.write_blueprint(
        "full",
        "v1",
        json!({
            "name": "full",
            "deployItems": [{ "name": "chart", "type": "landform.io/helm" }],
            "subInstallations": [
                { "name": "db", "blueprint": { "type": "local", "name": "leaf", "version": "v1" } }
            ]
        }),
    );
    h.create(installation("stack", "full")).await;
    h.settle("stack").await;
    h.settle("stack-db").await;

    let mut exec: Execution = h.store.get(&key("stack")).await.unwrap();
    exec.metadata.add_finalizer("deployer.landform.io");
    h.store.update(&exec).await.unwrap();

    delete(&h, "stack").await;
    assert_eq!(h.reconcile("stack").await, Action::RequeueAfter(RETRY));
    let exec: Execution = h.store.get(&key("stack")).await.unwrap();
    assert!(exec.metadata.is_deleting());
    assert!(h.get("stack-db").await.metadata.is_deleting());

    // Sub-installation gone, execution still terminating.
    assert_eq!(h.reconcile("stack-db").await, Action::Done);
    assert!(!h.exists("stack-db").await);
    assert_eq!(h.reconcile("stack").await, Action::RequeueAfter(RETRY));
    assert!(h.exists("stack").await);
    assert_eq!(h.store.delete_requests::<Execution>(&key("stack")).await, 1);
    assert_eq!(h.store.delete_requests::<Installation>(&key("stack-db")).await, 1);

    let mut exec: Execution = h.store.get(&key("stack")).await.unwrap();
    exec.metadata.remove_finalizer("deployer.landform.io");
    h.store.update(&exec).await.unwrap();

    assert_eq!(h.reconcile("stack").await, Action::Done);
    assert!(!h.exists("stack").await);
}
