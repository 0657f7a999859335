use tracing::debug;

use super::TerraformProvider;
use crate::errors::Result;
use crate::models::context::RequestContext;
use crate::models::deployment::OperationType;
use crate::models::varcontext::VarContext;
use crate::utils::deployment_id;
use crate::workers::poller;

impl TerraformProvider {
    /// Destroy a binding and wait for it. The record is kept until [`Self::delete_binding_data`].
    pub async fn unbind(
        &self,
        ctx: &RequestContext,
        instance_guid: &str,
        binding_id: &str,
        vars: &VarContext,
    ) -> Result<()> {
        let tf_id = deployment_id(instance_guid, binding_id);
        debug!(correlation_id = ctx.correlation_id(), deployment_id = %tf_id, "unbind");

        self.manager
            .update_workspace_hcl(&tf_id, &self.definition.bind_settings, vars)
            .await?;
        self.destroy(ctx, &tf_id, vars, OperationType::Unbind).await?;

        poller::wait_for_upstream(ctx, &self.manager, &tf_id, &self.poller).await
    }

    /// Remove the record of an unbound binding
    pub async fn delete_binding_data(
        &self,
        _ctx: &RequestContext,
        instance_guid: &str,
        binding_id: &str,
    ) -> Result<()> {
        self.manager
            .delete_terraform_deployment(&deployment_id(instance_guid, binding_id))
            .await
    }
}
