use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info};

use super::{InstanceDetails, TerraformProvider, TF_ID};
use crate::deploy::invoker::TerraformInvoker;
use crate::deploy::plan_guard::check_plan;
use crate::errors::Result;
use crate::models::context::RequestContext;
use crate::models::definition::ActionSettings;
use crate::models::deployment::OperationType;
use crate::models::varcontext::VarContext;
use crate::workers::jobs::spawn_operation;
use crate::workspace::Workspace;

/// Name of the secondary definition holding the transformed import HCL
const IMPORTED_DEFINITION: &str = "main";

impl TerraformProvider {
    /// Stage and start a provision, either from the templates or by importing existing resources
    pub async fn provision(&self, ctx: &RequestContext, vars: &VarContext) -> Result<InstanceDetails> {
        debug!(
            correlation_id = ctx.correlation_id(),
            "provision with {}",
            vars.to_json()
        );

        let action = &self.definition.provision_settings;
        let tf_id = if action.is_tf_import(vars) {
            self.import_create(ctx, vars, action).await?
        } else {
            self.create(ctx, vars, action, OperationType::Provision).await?
        };

        Ok(InstanceDetails {
            operation_guid: tf_id,
            operation_type: OperationType::Provision,
        })
    }

    /// Stage a workspace from `action` and apply it in the background. Returns the deployment ID.
    pub(super) async fn create(
        &self,
        ctx: &RequestContext,
        vars: &VarContext,
        action: &ActionSettings,
        operation_type: OperationType,
    ) -> Result<String> {
        let tf_id = vars.get_string(TF_ID)?;

        let workspace = Workspace::new(
            &vars.to_map(),
            &action.template,
            &action.templates,
            Vec::new(),
            Vec::new(),
            Vec::new(),
        )?;

        let mut deployment = self.manager.create_and_save_deployment(&tf_id, workspace).await?;
        self.manager
            .mark_operation_started(&mut deployment, operation_type)
            .await?;

        let invoker = self.default_invoker();
        spawn_operation(ctx, self.manager.clone(), deployment, move |ctx, mut deployment| async move {
            let result = invoker.apply(&ctx, &mut deployment.workspace).await;
            (deployment, result)
        });

        Ok(tf_id)
    }

    /// Stage a workspace that adopts existing resources and run the import in the background
    async fn import_create(
        &self,
        ctx: &RequestContext,
        vars: &VarContext,
        action: &ActionSettings,
    ) -> Result<String> {
        let vars_map = vars.to_map();
        let resources = action.import_resources(&vars_map)?;
        let tf_id = vars.get_string(TF_ID)?;

        let workspace = Workspace::new(
            &vars_map,
            "",
            &action.templates,
            action.import_parameter_mappings.clone(),
            action.import_parameters_to_delete.clone(),
            action.import_parameters_to_add.clone(),
        )?;

        let mut deployment = self.manager.create_and_save_deployment(&tf_id, workspace).await?;
        self.manager
            .mark_operation_started(&mut deployment, OperationType::Provision)
            .await?;

        let invoker = self.default_invoker();
        spawn_operation(ctx, self.manager.clone(), deployment, move |ctx, mut deployment| async move {
            let result = import_job(&ctx, invoker.as_ref(), &mut deployment.workspace, &resources).await;
            (deployment, result)
        });

        Ok(tf_id)
    }
}

/// import, show, rewrite the shown HCL, guard against destroys, apply
async fn import_job(
    ctx: &RequestContext,
    invoker: &dyn TerraformInvoker,
    workspace: &mut Workspace,
    resources: &BTreeMap<String, String>,
) -> Result<()> {
    invoker.import(ctx, workspace, resources).await?;

    let shown = invoker.show(ctx, workspace).await?;
    let (tf, captured) = workspace.transformer.transform(&shown)?;

    if let Some(instance) = workspace.instances.first_mut() {
        for (name, value) in captured {
            instance.configuration.insert(name, Value::String(value));
        }
    }
    if let Some(module) = workspace.modules.first_mut() {
        module
            .definitions
            .insert(IMPORTED_DEFINITION.to_string(), tf.clone());
    }
    info!("imported workspace HCL:\n{}", tf);

    let plan = invoker.plan(ctx, workspace).await?;
    check_plan(&plan)?;

    invoker.apply(ctx, workspace).await
}
