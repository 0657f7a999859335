use std::collections::BTreeMap;

use serde_json::Value;

use super::TerraformProvider;
use crate::errors::Result;
use crate::models::context::RequestContext;
use crate::utils::deployment_id;

impl TerraformProvider {
    /// Outputs of an instance deployment
    pub async fn get_terraform_outputs(
        &self,
        _ctx: &RequestContext,
        instance_guid: &str,
    ) -> Result<BTreeMap<String, Value>> {
        self.outputs(&deployment_id(instance_guid, "")).await
    }

    /// Outputs of the default instance of any deployment
    pub(super) async fn outputs(&self, id: &str) -> Result<BTreeMap<String, Value>> {
        let deployment = self.manager.get_terraform_deployment(id).await?;
        let workspace = &deployment.workspace;
        workspace.outputs(workspace.default_instance_name())
    }
}
