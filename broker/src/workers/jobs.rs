//! Detached background jobs running IaC operations

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{error, info, info_span, Instrument};

use crate::deploy::manager::DeploymentManager;
use crate::errors::Result;
use crate::models::context::RequestContext;
use crate::models::deployment::Deployment;

/// Spawn `job` for an already started deployment and record its outcome.
///
/// The job owns the deployment for its whole run and hands it back so its
/// final workspace is persisted with the terminal state. The returned handle
/// may be dropped; the job keeps running.
pub fn spawn_operation<F, Fut>(
    ctx: &RequestContext,
    manager: DeploymentManager,
    deployment: Deployment,
    job: F,
) -> JoinHandle<()>
where
    F: FnOnce(RequestContext, Deployment) -> Fut + Send + 'static,
    Fut: Future<Output = (Deployment, Result<()>)> + Send + 'static,
{
    let ctx = ctx.detached();
    let span = info_span!(
        "job",
        deployment_id = %deployment.id,
        correlation_id = %ctx.correlation_id(),
        operation = %deployment.last_operation_type,
    );

    tokio::spawn(
        async move {
            info!("job started");
            let (mut deployment, result) = job(ctx, deployment).await;

            if let Err(e) = manager
                .mark_operation_finished(&mut deployment, result.as_ref().map(|_| ()))
                .await
            {
                error!("failed to record job outcome: {}", e);
                return;
            }
            info!("job finished: {}", deployment.last_operation_state);
        }
        .instrument(span),
    )
}

/// Spawn `job` and only log its outcome. Used when the job records state itself.
pub fn spawn_detached<Fut>(ctx: &RequestContext, deployment_id: &str, job: Fut) -> JoinHandle<()>
where
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let span = info_span!(
        "job",
        deployment_id = %deployment_id,
        correlation_id = %ctx.correlation_id(),
    );

    tokio::spawn(
        async move {
            match job.await {
                Ok(()) => info!("job finished"),
                Err(e) => error!("job failed: {}", e),
            }
        }
        .instrument(span),
    )
}
