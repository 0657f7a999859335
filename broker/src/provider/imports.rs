use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use super::TerraformProvider;
use crate::errors::Result;
use crate::hcl::{get_parameters, ExtractVariable};
use crate::models::context::RequestContext;
use crate::models::definition::BrokerVariable;
use crate::utils::deployment_id;

impl TerraformProvider {
    /// Current values of the resource attributes that input variables are tied to.
    ///
    /// A variable is skipped when the provision detail named by its
    /// `tf_attribute_skip` is the boolean `true`.
    pub async fn get_imported_properties(
        &self,
        ctx: &RequestContext,
        plan_guid: &str,
        instance_guid: &str,
        input_variables: &[BrokerVariable],
        provision_details: &Map<String, Value>,
    ) -> Result<BTreeMap<String, String>> {
        if self.definition.is_subsume_plan(plan_guid) {
            return Ok(BTreeMap::new());
        }

        let vars_to_replace = vars_to_replace(input_variables, provision_details);
        if vars_to_replace.is_empty() {
            return Ok(BTreeMap::new());
        }
        debug!(
            correlation_id = ctx.correlation_id(),
            "reading {} imported properties",
            vars_to_replace.len()
        );

        let mut deployment = self
            .manager
            .get_terraform_deployment(&deployment_id(instance_guid, ""))
            .await?;
        let tf_hcl = self
            .default_invoker()
            .show(ctx, &mut deployment.workspace)
            .await?;

        get_parameters(&tf_hcl, &vars_to_replace)
    }
}

fn vars_to_replace(
    input_variables: &[BrokerVariable],
    provision_details: &Map<String, Value>,
) -> Vec<ExtractVariable> {
    input_variables
        .iter()
        .filter(|var| !var.tf_attribute.is_empty())
        .filter(|var| {
            var.tf_attribute_skip.is_empty()
                || provision_details.get(&var.tf_attribute_skip) != Some(&Value::Bool(true))
        })
        .map(|var| ExtractVariable::new(var.tf_attribute.clone(), var.field_name.clone()))
        .collect()
}
