//! Orchestrator operations over one service definition

mod bind;
mod deprovision;
mod imports;
mod outputs;
mod provision;
mod unbind;
mod update;
mod upgrade;

use std::sync::Arc;

use semver::Version;
use tracing::debug;

use crate::app::options::{BrokerOptions, TfBinariesContext};
use crate::deploy::invoker::{InvokerFactory, TerraformInvoker};
use crate::deploy::manager::{DeploymentManager, OperationStatus};
use crate::errors::{BrokerError, Result};
use crate::models::context::RequestContext;
use crate::models::definition::ServiceDefinition;
use crate::models::deployment::{OperationState, OperationType};
use crate::storage::store::DeploymentStore;
use crate::utils::deployment_id;
use crate::workers::poller;

/// Request variable holding the deployment ID
pub const TF_ID: &str = "tf_id";

/// Returned by operations that run in the background
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDetails {
    pub operation_guid: String,
    pub operation_type: OperationType,
}

/// Drives IaC deployments for one service definition
#[derive(Clone)]
pub struct TerraformProvider {
    definition: Arc<ServiceDefinition>,
    binaries: TfBinariesContext,
    invokers: Arc<dyn InvokerFactory>,
    manager: DeploymentManager,
    poller: poller::Options,
}

impl TerraformProvider {
    pub fn new(
        definition: ServiceDefinition,
        options: &BrokerOptions,
        invokers: Arc<dyn InvokerFactory>,
        store: Arc<dyn DeploymentStore>,
    ) -> Self {
        Self {
            definition: Arc::new(definition),
            binaries: options.binaries.clone(),
            invokers,
            manager: DeploymentManager::new(store, options.flags),
            poller: poller::Options {
                interval: options.poll_interval,
            },
        }
    }

    pub fn definition(&self) -> &ServiceDefinition {
        &self.definition
    }

    pub fn manager(&self) -> &DeploymentManager {
        &self.manager
    }

    /// Invoker for the broker's default engine version
    pub fn default_invoker(&self) -> Arc<dyn TerraformInvoker> {
        self.versioned_invoker(&self.binaries.default_version)
    }

    pub fn versioned_invoker(&self, version: &Version) -> Arc<dyn TerraformInvoker> {
        self.invokers.versioned_invoker(version)
    }

    /// Block until the operation on `id` finishes or `ctx` is cancelled
    pub async fn wait(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        poller::wait(ctx, &self.manager, id, &self.poller).await
    }

    /// Last operation of an instance
    pub async fn poll_instance(&self, _ctx: &RequestContext, instance_guid: &str) -> Result<OperationStatus> {
        self.manager
            .operation_status(&deployment_id(instance_guid, ""))
            .await
    }

    /// Reject a deprovision while a provision of the same deployment is still running
    pub async fn check_operation_constraints(
        &self,
        id: &str,
        operation_type: OperationType,
    ) -> Result<()> {
        if operation_type != OperationType::Deprovision {
            return Ok(());
        }

        let deployment = match self.manager.get_terraform_deployment(id).await {
            Ok(deployment) => deployment,
            Err(BrokerError::MissingDeployment(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        debug!(
            deployment_id = id,
            "last operation {} {}", deployment.last_operation_type, deployment.last_operation_state
        );
        if deployment.last_operation_state == OperationState::InProgress
            && deployment.last_operation_type == OperationType::Provision
        {
            return Err(BrokerError::DestroyDuringProvision);
        }
        Ok(())
    }
}
