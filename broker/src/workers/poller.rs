//! Polls a deployment until its operation finishes

use std::time::Duration;

use tracing::debug;

use crate::deploy::manager::DeploymentManager;
use crate::errors::{BrokerError, Result};
use crate::models::context::RequestContext;

/// Poller options
#[derive(Debug, Clone)]
pub struct Options {
    /// Polling interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

/// Wait until the operation on `id` is finished.
///
/// Returns the operation error if it failed. Cancelling `ctx` stops waiting
/// and returns `Ok`; the job itself keeps running.
pub async fn wait(
    ctx: &RequestContext,
    manager: &DeploymentManager,
    id: &str,
    options: &Options,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                debug!(deployment_id = id, "wait cancelled");
                return Ok(());
            }
            _ = tokio::time::sleep(options.interval) => {
                // Continue with poll
            }
        }

        let status = manager.operation_status(id).await?;
        if status.finished {
            return match status.error {
                Some(e) => Err(e),
                None => Ok(()),
            };
        }
        debug!(deployment_id = id, "still waiting: {}", status.message);
    }
}

/// Like [`wait`], wrapping an operation failure as `UpstreamApplyFailed`
pub async fn wait_for_upstream(
    ctx: &RequestContext,
    manager: &DeploymentManager,
    id: &str,
    options: &Options,
) -> Result<()> {
    wait(ctx, manager, id, options).await.map_err(|e| match e {
        BrokerError::OperationFailed(message) => BrokerError::UpstreamApplyFailed(message),
        other => other,
    })
}
