use tracing::debug;

use super::TerraformProvider;
use crate::errors::Result;
use crate::models::context::RequestContext;
use crate::models::deployment::OperationType;
use crate::models::varcontext::VarContext;
use crate::utils::deployment_id;
use crate::workers::jobs::spawn_operation;
use crate::workspace::Workspace;

impl TerraformProvider {
    /// Start destroying an instance. Returns the operation ID to poll.
    pub async fn deprovision(
        &self,
        ctx: &RequestContext,
        instance_guid: &str,
        vars: &VarContext,
    ) -> Result<String> {
        let tf_id = deployment_id(instance_guid, "");
        debug!(correlation_id = ctx.correlation_id(), deployment_id = %tf_id, "deprovision");

        self.manager
            .update_workspace_hcl(&tf_id, &self.definition.provision_settings, vars)
            .await?;
        self.destroy(ctx, &tf_id, vars, OperationType::Deprovision)
            .await?;

        Ok(tf_id)
    }

    /// Start a background destroy of deployment `id`
    pub(super) async fn destroy(
        &self,
        ctx: &RequestContext,
        id: &str,
        vars: &VarContext,
        operation_type: OperationType,
    ) -> Result<()> {
        let mut deployment = self.manager.get_terraform_deployment(id).await?;
        let vars = vars.to_map();
        deployment.workspace.update_instance_configuration(&vars)?;

        self.manager
            .mark_operation_started(&mut deployment, operation_type)
            .await?;

        let provider = self.clone();
        spawn_operation(ctx, self.manager.clone(), deployment, move |ctx, mut deployment| async move {
            let result = provider.destroy_job(&ctx, &mut deployment.workspace).await;
            (deployment, result)
        });
        Ok(())
    }

    async fn destroy_job(&self, ctx: &RequestContext, workspace: &mut Workspace) -> Result<()> {
        if self.manager.flags().tf_upgrades_enabled {
            self.perform_terraform_upgrade(ctx, workspace).await?;
        }
        self.default_invoker().destroy(ctx, workspace).await
    }
}
