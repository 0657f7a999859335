//! Deployments persisted through the file store

use std::sync::Arc;

use serde_json::{json, Map};

use tfbroker::app::options::FeatureFlags;
use tfbroker::deploy::manager::DeploymentManager;
use tfbroker::errors::BrokerError;
use tfbroker::filesys::dir::Dir;
use tfbroker::models::deployment::{OperationState, OperationType};
use tfbroker::storage::FileStore;
use tfbroker::workspace::Workspace;

use crate::support::{state, PROVISION_TEMPLATE};

fn manager(dir: &std::path::Path) -> DeploymentManager {
    let store = FileStore::new(Dir::new(dir.join("deployments")));
    DeploymentManager::new(Arc::new(store), FeatureFlags::default())
}

#[test]
fn test_deployment_survives_restart() {
    let temp = tempfile::tempdir().unwrap();

    tokio_test::block_on(async {
        let mut workspace = Workspace::new(
            json!({"name": "db"}).as_object().unwrap(),
            PROVISION_TEMPLATE,
            &Default::default(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        )
        .unwrap();
        workspace.state = Some(state("1.6.0", Map::new()));
        workspace
            .additional_state
            .insert("ca.pem".to_string(), vec![0, 159, 146, 150]);

        let first = manager(temp.path());
        let mut deployment = first.create_and_save_deployment("tf:i1:", workspace).await.unwrap();
        first
            .mark_operation_started(&mut deployment, OperationType::Provision)
            .await
            .unwrap();
        first.mark_operation_finished(&mut deployment, Ok(())).await.unwrap();

        let second = manager(temp.path());
        let loaded = second.get_terraform_deployment("tf:i1:").await.unwrap();
        assert_eq!(loaded.workspace, deployment.workspace);
        assert_eq!(loaded.last_operation_state, OperationState::Succeeded);
        assert_eq!(loaded.last_operation_message, "provision succeeded");

        let status = second.operation_status("tf:i1:").await.unwrap();
        assert!(status.finished);
        assert!(status.error.is_none());
    });
}

#[test]
fn test_failure_is_persisted() {
    let temp = tempfile::tempdir().unwrap();

    tokio_test::block_on(async {
        let manager = manager(temp.path());
        let mut deployment = manager
            .create_and_save_deployment("tf:i1:b1", Workspace::default())
            .await
            .unwrap();
        manager
            .mark_operation_started(&mut deployment, OperationType::Bind)
            .await
            .unwrap();
        let err = BrokerError::Execution {
            message: "Error: quota exceeded exit status 1".to_string(),
            exit_code: Some(1),
        };
        manager
            .mark_operation_finished(&mut deployment, Err(&err))
            .await
            .unwrap();

        let bindings = manager.get_binding_deployments("i1").await.unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].last_operation_state, OperationState::Failed);
        assert_eq!(
            bindings[0].last_operation_message,
            "Error: quota exceeded exit status 1"
        );
    });
}
