use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{TerraformProvider, TF_ID};
use crate::errors::{BrokerError, Result};
use crate::models::context::RequestContext;
use crate::models::deployment::{Deployment, OperationType};
use crate::models::varcontext::VarContext;
use crate::utils::parse_deployment_id;
use crate::workers::jobs::spawn_detached;
use crate::workspace::Workspace;

impl TerraformProvider {
    /// Fail when the instance state was written by an engine older than the default one
    pub async fn check_upgrade_available(&self, id: &str) -> Result<()> {
        let deployment = self.manager.get_terraform_deployment(id).await?;
        let current = deployment.workspace.state_version()?;

        if current < self.binaries.default_version {
            return Err(BrokerError::UpgradeRequired);
        }
        Ok(())
    }

    /// Upgrade an instance and then each of its bindings to the default engine version.
    ///
    /// The instance stays in progress until every binding is done. The first
    /// binding failure fails the instance and stops the run.
    pub async fn upgrade(
        &self,
        ctx: &RequestContext,
        instance_vars: &VarContext,
        binding_vars: &[VarContext],
    ) -> Result<JoinHandle<()>> {
        debug!(correlation_id = ctx.correlation_id(), "upgrade with {}", instance_vars.to_json());

        let instance_id = instance_vars.get_string(TF_ID)?;
        self.manager
            .update_workspace_hcl(&instance_id, &self.definition.provision_settings, instance_vars)
            .await?;

        let mut instance = self.manager.get_terraform_deployment(&instance_id).await?;
        let instance_guid = parse_deployment_id(&instance_id)
            .map(|(instance_guid, _)| instance_guid)
            .unwrap_or(instance_id.as_str());
        let bindings = self.manager.get_binding_deployments(instance_guid).await?;
        self.manager
            .mark_operation_started(&mut instance, OperationType::Upgrade)
            .await?;

        let provider = self.clone();
        let binding_vars = binding_vars.to_vec();
        let job_ctx = ctx.detached();
        Ok(spawn_detached(ctx, &instance_id, async move {
            let outcome = provider
                .upgrade_job(&job_ctx, &mut instance, &bindings, &binding_vars)
                .await;
            provider
                .manager
                .mark_operation_finished(&mut instance, outcome.as_ref().map(|_| ()))
                .await
        }))
    }

    async fn upgrade_job(
        &self,
        ctx: &RequestContext,
        instance: &mut Deployment,
        bindings: &[Deployment],
        binding_vars: &[VarContext],
    ) -> Result<()> {
        self.perform_terraform_upgrade(ctx, &mut instance.workspace).await?;

        for binding in bindings {
            self.upgrade_binding(ctx, &binding.id, binding_vars).await?;
        }
        Ok(())
    }

    async fn upgrade_binding(
        &self,
        ctx: &RequestContext,
        id: &str,
        binding_vars: &[VarContext],
    ) -> Result<()> {
        let vars = binding_vars
            .iter()
            .find(|vars| vars.get_string(TF_ID).ok().as_deref() == Some(id));
        if let Some(vars) = vars {
            self.manager
                .update_workspace_hcl(id, &self.definition.bind_settings, vars)
                .await?;
        }

        let mut binding = self.manager.get_terraform_deployment(id).await?;
        self.manager
            .mark_operation_started(&mut binding, OperationType::Upgrade)
            .await?;

        let outcome = self.perform_terraform_upgrade(ctx, &mut binding.workspace).await;
        self.manager
            .mark_operation_finished(&mut binding, outcome.as_ref().map(|_| ()))
            .await?;
        outcome
    }

    /// Apply `workspace` with each engine version on the upgrade path above its state version
    pub(super) async fn perform_terraform_upgrade(
        &self,
        ctx: &RequestContext,
        workspace: &mut Workspace,
    ) -> Result<()> {
        let current = workspace.state_version()?;
        if current >= self.binaries.default_version {
            return Ok(());
        }
        if self.binaries.upgrade_path.is_empty() {
            return Err(BrokerError::UpgradeMismatch);
        }

        for step in &self.binaries.upgrade_path {
            if current < *step {
                info!(correlation_id = ctx.correlation_id(), "applying with {} (state at {})", step, current);
                self.versioned_invoker(step).apply(ctx, workspace).await?;
            }
        }
        Ok(())
    }
}
