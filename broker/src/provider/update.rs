use serde_json::{Map, Value};
use tracing::debug;

use super::{InstanceDetails, TerraformProvider, TF_ID};
use crate::errors::{BrokerError, Result};
use crate::models::context::RequestContext;
use crate::models::deployment::OperationType;
use crate::models::varcontext::VarContext;
use crate::workers::jobs::spawn_operation;
use crate::workspace::Workspace;

impl TerraformProvider {
    /// Re-apply an instance with new parameters and the current templates
    pub async fn update(&self, ctx: &RequestContext, vars: &VarContext) -> Result<InstanceDetails> {
        debug!(correlation_id = ctx.correlation_id(), "update with {}", vars.to_json());

        if self.definition.provision_settings.is_tf_import(vars) {
            return Err(BrokerError::CannotUpdateSubsumePlan);
        }

        let tf_id = vars.get_string(TF_ID)?;

        self.manager
            .update_workspace_hcl(&tf_id, &self.definition.provision_settings, vars)
            .await?;

        let mut deployment = self.manager.get_terraform_deployment(&tf_id).await?;
        self.manager
            .mark_operation_started(&mut deployment, OperationType::Update)
            .await?;

        let provider = self.clone();
        let vars = vars.to_map();
        spawn_operation(ctx, self.manager.clone(), deployment, move |ctx, mut deployment| async move {
            let result = provider.update_job(&ctx, &mut deployment.workspace, &vars).await;
            (deployment, result)
        });

        Ok(InstanceDetails {
            operation_guid: tf_id,
            operation_type: OperationType::Update,
        })
    }

    async fn update_job(
        &self,
        ctx: &RequestContext,
        workspace: &mut Workspace,
        vars: &Map<String, Value>,
    ) -> Result<()> {
        if self.manager.flags().tf_upgrades_enabled {
            self.perform_terraform_upgrade(ctx, workspace).await?;
        }
        workspace.update_instance_configuration(vars)?;
        self.default_invoker().apply(ctx, workspace).await
    }
}
