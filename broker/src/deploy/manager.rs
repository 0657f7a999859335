//! Deployment manager: persistence and the last-operation state machine

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info};

use crate::app::options::FeatureFlags;
use crate::deploy::fsm::{OperationEvent, OperationFsm};
use crate::errors::{BrokerError, Result};
use crate::models::definition::ActionSettings;
use crate::models::deployment::{Deployment, OperationState, OperationType};
use crate::models::varcontext::VarContext;
use crate::storage::store::DeploymentStore;
use crate::workspace::Workspace;

/// Output whose value is appended to the success message
pub const STATUS_OUTPUT: &str = "status";

/// Result of polling a deployment
#[derive(Debug)]
pub struct OperationStatus {
    pub finished: bool,
    pub message: String,
    /// Set iff the operation failed; displays the stored message verbatim
    pub error: Option<BrokerError>,
}

/// Owns all mutation of deployment records
#[derive(Clone)]
pub struct DeploymentManager {
    store: Arc<dyn DeploymentStore>,
    flags: FeatureFlags,
}

fn store_unavailable(err: BrokerError) -> BrokerError {
    match err {
        BrokerError::StoreUnavailable(_) => err,
        other => BrokerError::StoreUnavailable(other.to_string()),
    }
}

/// String form of a JSON value, without quotes for strings
fn value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl DeploymentManager {
    pub fn new(store: Arc<dyn DeploymentStore>, flags: FeatureFlags) -> Self {
        Self { store, flags }
    }

    pub fn flags(&self) -> FeatureFlags {
        self.flags
    }

    /// Stage a workspace under `id`, keeping the operation history of an existing record
    pub async fn create_and_save_deployment(&self, id: &str, workspace: Workspace) -> Result<Deployment> {
        let exists = self
            .store
            .exists_terraform_deployment(id)
            .await
            .map_err(store_unavailable)?;

        let deployment = if exists {
            let mut deployment = self.get_terraform_deployment(id).await.map_err(store_unavailable)?;
            deployment.workspace = workspace;
            deployment
        } else {
            let mut deployment = Deployment::new(id, workspace);
            OperationFsm::staged().apply_to(&mut deployment);
            deployment
        };

        self.save(&deployment).await.map_err(store_unavailable)?;
        Ok(deployment)
    }

    /// Begin an operation and persist it
    pub async fn mark_operation_started(
        &self,
        deployment: &mut Deployment,
        operation_type: OperationType,
    ) -> Result<()> {
        self.transition(deployment, OperationEvent::Start(operation_type))?;
        info!(deployment_id = %deployment.id, "{}", deployment.last_operation_message);
        self.save(deployment).await
    }

    /// Record the outcome of the running operation and persist it
    pub async fn mark_operation_finished(
        &self,
        deployment: &mut Deployment,
        outcome: std::result::Result<(), &BrokerError>,
    ) -> Result<()> {
        let operation_type = deployment.last_operation_type;

        let event = match outcome {
            Ok(()) => {
                let mut message = format!("{} succeeded", operation_type);
                let outputs = deployment
                    .workspace
                    .outputs(deployment.workspace.default_instance_name());
                if let Some(status) = outputs.ok().as_ref().and_then(|o| o.get(STATUS_OUTPUT)) {
                    message = format!("{}: {}", message, value_string(status));
                }
                info!(deployment_id = %deployment.id, "{}", message);
                OperationEvent::Succeed(message)
            }
            Err(err) => {
                error!(deployment_id = %deployment.id, "{} failed: {}", operation_type, err);
                OperationEvent::Fail(err.to_string())
            }
        };
        self.transition(deployment, event)?;

        match deployment.to_record() {
            Ok(record) => self.store.store_terraform_deployment(record).await,
            Err(e) => {
                error!(deployment_id = %deployment.id, "cannot serialize workspace: {}", e);
                deployment.last_operation_state = OperationState::Failed;
                deployment.last_operation_message = format!(
                    "error saving state after {}, operator cleanup may be required: {}",
                    operation_type, e
                );

                // Keep the last workspace that could be stored
                let mut record = self.store.get_terraform_deployment(&deployment.id).await?;
                record.last_operation_type = deployment.last_operation_type;
                record.last_operation_state = deployment.last_operation_state;
                record.last_operation_message = deployment.last_operation_message.clone();
                self.store.store_terraform_deployment(record).await
            }
        }
    }

    /// Poll the last operation of `id`
    pub async fn operation_status(&self, id: &str) -> Result<OperationStatus> {
        let record = self.store.get_terraform_deployment(id).await?;
        debug!(deployment_id = id, "operation state {}", record.last_operation_state);

        let message = record.last_operation_message;
        Ok(match record.last_operation_state {
            OperationState::Succeeded => OperationStatus {
                finished: true,
                message,
                error: None,
            },
            OperationState::Failed => OperationStatus {
                finished: true,
                error: Some(BrokerError::OperationFailed(message.clone())),
                message,
            },
            OperationState::InProgress => OperationStatus {
                finished: false,
                message,
                error: None,
            },
        })
    }

    /// Replace the stored HCL with the current template, keeping state
    pub async fn update_workspace_hcl(
        &self,
        id: &str,
        action: &ActionSettings,
        vars: &VarContext,
    ) -> Result<()> {
        if !self.flags.hcl_updates_enabled() {
            return Ok(());
        }

        let mut deployment = self.get_terraform_deployment(id).await?;
        let mut workspace = Workspace::new(
            &vars.to_map(),
            &action.template,
            &action.templates,
            Vec::new(),
            Vec::new(),
            Vec::new(),
        )?;
        workspace.state = deployment.workspace.state.take();
        workspace.additional_state = std::mem::take(&mut deployment.workspace.additional_state);
        deployment.workspace = workspace;

        debug!(deployment_id = id, "updating workspace HCL");
        self.save(&deployment)
            .await
            .map_err(|e| BrokerError::DeploymentCreateFailed(e.to_string()))
    }

    pub async fn get_terraform_deployment(&self, id: &str) -> Result<Deployment> {
        let record = self.store.get_terraform_deployment(id).await?;
        Deployment::from_record(record)
    }

    pub async fn get_binding_deployments(&self, instance_id: &str) -> Result<Vec<Deployment>> {
        self.store
            .get_binding_deployments(instance_id)
            .await?
            .into_iter()
            .map(Deployment::from_record)
            .collect()
    }

    pub async fn delete_terraform_deployment(&self, id: &str) -> Result<()> {
        self.store.delete_terraform_deployment(id).await
    }

    pub async fn list_terraform_deployments(&self) -> Result<Vec<Deployment>> {
        self.store
            .list_terraform_deployments()
            .await?
            .into_iter()
            .map(Deployment::from_record)
            .collect()
    }

    fn transition(&self, deployment: &mut Deployment, event: OperationEvent) -> Result<()> {
        let mut fsm = OperationFsm::from_deployment(deployment);
        fsm.process(event).map_err(BrokerError::InvalidTransition)?;
        fsm.apply_to(deployment);
        Ok(())
    }

    async fn save(&self, deployment: &Deployment) -> Result<()> {
        self.store
            .store_terraform_deployment(deployment.to_record()?)
            .await
    }
}
