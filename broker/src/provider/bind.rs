use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use super::TerraformProvider;
use crate::errors::Result;
use crate::models::context::RequestContext;
use crate::models::deployment::OperationType;
use crate::models::varcontext::VarContext;
use crate::workers::poller;

impl TerraformProvider {
    /// Create a binding and wait for its apply; returns the binding outputs
    pub async fn bind(&self, ctx: &RequestContext, vars: &VarContext) -> Result<BTreeMap<String, Value>> {
        debug!(correlation_id = ctx.correlation_id(), "bind with {}", vars.to_json());

        let tf_id = self
            .create(ctx, vars, &self.definition.bind_settings, OperationType::Bind)
            .await?;

        poller::wait_for_upstream(ctx, &self.manager, &tf_id, &self.poller).await?;

        self.outputs(&tf_id).await
    }
}
