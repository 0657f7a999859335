//! Invokers sequence engine commands against a workspace

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use semver::Version;
use tracing::debug;

use crate::app::options::TfBinariesContext;
use crate::deploy::command::Command;
use crate::deploy::executor::{
    BinaryExecutor, DefaultExecutor, EnvExecutor, ExecutionOutput, TerraformExecutor,
};
use crate::errors::Result;
use crate::models::context::RequestContext;
use crate::workspace::Workspace;

/// Engines older than this need the legacy `init`
static LEGACY_BOUNDARY: LazyLock<Version> = LazyLock::new(|| Version::new(0, 13, 0));

/// Logical actions against a workspace
#[async_trait]
pub trait TerraformInvoker: Send + Sync {
    async fn apply(&self, ctx: &RequestContext, workspace: &mut Workspace) -> Result<()>;

    async fn destroy(&self, ctx: &RequestContext, workspace: &mut Workspace) -> Result<()>;

    /// Returns the `show` stdout
    async fn show(&self, ctx: &RequestContext, workspace: &mut Workspace) -> Result<String>;

    async fn plan(&self, ctx: &RequestContext, workspace: &mut Workspace) -> Result<ExecutionOutput>;

    /// Import each `address -> id` entry into the state
    async fn import(
        &self,
        ctx: &RequestContext,
        workspace: &mut Workspace,
        resources: &BTreeMap<String, String>,
    ) -> Result<()>;
}

/// Invoker for current engines; rewrites provider addresses in state before running
pub struct DefaultInvoker {
    executor: Arc<dyn TerraformExecutor>,
    plugin_dir: String,
    provider_renames: BTreeMap<String, String>,
}

impl DefaultInvoker {
    pub fn new(
        executor: Arc<dyn TerraformExecutor>,
        plugin_dir: impl Into<String>,
        provider_renames: BTreeMap<String, String>,
    ) -> Self {
        Self {
            executor,
            plugin_dir: plugin_dir.into(),
            provider_renames,
        }
    }

    fn init(&self) -> Command {
        Command::Init {
            plugin_dir: self.plugin_dir.clone(),
        }
    }

    fn renames(&self) -> Vec<Command> {
        self.provider_renames
            .iter()
            .map(|(old, new)| Command::ReplaceProvider {
                old: old.clone(),
                new: new.clone(),
            })
            .collect()
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        workspace: &mut Workspace,
        commands: Vec<Command>,
    ) -> Result<ExecutionOutput> {
        debug!("running {} commands", commands.len());
        workspace.execute(ctx, self.executor.as_ref(), &commands).await
    }
}

#[async_trait]
impl TerraformInvoker for DefaultInvoker {
    async fn apply(&self, ctx: &RequestContext, workspace: &mut Workspace) -> Result<()> {
        let mut commands = if workspace.has_state() {
            self.renames()
        } else {
            Vec::new()
        };
        commands.extend([self.init(), Command::Apply]);

        self.run(ctx, workspace, commands).await?;
        Ok(())
    }

    async fn destroy(&self, ctx: &RequestContext, workspace: &mut Workspace) -> Result<()> {
        let mut commands = self.renames();
        commands.extend([self.init(), Command::Destroy]);

        self.run(ctx, workspace, commands).await?;
        Ok(())
    }

    async fn show(&self, ctx: &RequestContext, workspace: &mut Workspace) -> Result<String> {
        let mut commands = self.renames();
        commands.extend([self.init(), Command::Show]);

        Ok(self.run(ctx, workspace, commands).await?.stdout)
    }

    async fn plan(&self, ctx: &RequestContext, workspace: &mut Workspace) -> Result<ExecutionOutput> {
        self.run(ctx, workspace, vec![self.init(), Command::Plan]).await
    }

    async fn import(
        &self,
        ctx: &RequestContext,
        workspace: &mut Workspace,
        resources: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut commands = vec![self.init()];
        commands.extend(resources.iter().map(|(address, id)| Command::Import {
            address: address.clone(),
            id: id.clone(),
        }));

        self.run(ctx, workspace, commands).await?;
        Ok(())
    }
}

/// Invoker for engines older than 0.13
pub struct LegacyInvoker {
    executor: Arc<dyn TerraformExecutor>,
    plugin_dir: String,
}

impl LegacyInvoker {
    pub fn new(executor: Arc<dyn TerraformExecutor>, plugin_dir: impl Into<String>) -> Self {
        Self {
            executor,
            plugin_dir: plugin_dir.into(),
        }
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        workspace: &mut Workspace,
        command: Command,
    ) -> Result<ExecutionOutput> {
        let init = Command::InitLegacy {
            plugin_dir: self.plugin_dir.clone(),
        };
        workspace
            .execute(ctx, self.executor.as_ref(), &[init, command])
            .await
    }
}

#[async_trait]
impl TerraformInvoker for LegacyInvoker {
    async fn apply(&self, ctx: &RequestContext, workspace: &mut Workspace) -> Result<()> {
        self.run(ctx, workspace, Command::Apply).await?;
        Ok(())
    }

    async fn destroy(&self, ctx: &RequestContext, workspace: &mut Workspace) -> Result<()> {
        self.run(ctx, workspace, Command::Destroy).await?;
        Ok(())
    }

    async fn show(&self, ctx: &RequestContext, workspace: &mut Workspace) -> Result<String> {
        Ok(self.run(ctx, workspace, Command::Show).await?.stdout)
    }

    async fn plan(&self, ctx: &RequestContext, workspace: &mut Workspace) -> Result<ExecutionOutput> {
        self.run(ctx, workspace, Command::Plan).await
    }

    async fn import(
        &self,
        ctx: &RequestContext,
        workspace: &mut Workspace,
        resources: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut commands = vec![Command::InitLegacy {
            plugin_dir: self.plugin_dir.clone(),
        }];
        commands.extend(resources.iter().map(|(address, id)| Command::Import {
            address: address.clone(),
            id: id.clone(),
        }));

        workspace
            .execute(ctx, self.executor.as_ref(), &commands)
            .await?;
        Ok(())
    }
}

/// Hands out invokers bound to a specific engine version
pub trait InvokerFactory: Send + Sync {
    fn versioned_invoker(&self, version: &Version) -> Arc<dyn TerraformInvoker>;
}

/// Builds the executor stack over the binaries directory
pub struct DefaultInvokerFactory {
    binaries: TfBinariesContext,
    env_vars: BTreeMap<String, String>,
    leaf: Arc<dyn TerraformExecutor>,
}

impl DefaultInvokerFactory {
    /// `env_vars` are the resolved service definition environment variables
    pub fn new(binaries: TfBinariesContext, env_vars: BTreeMap<String, String>) -> Self {
        Self::with_executor(binaries, env_vars, Arc::new(DefaultExecutor))
    }

    /// Same stack over a caller supplied bottom executor
    pub fn with_executor(
        binaries: TfBinariesContext,
        env_vars: BTreeMap<String, String>,
        leaf: Arc<dyn TerraformExecutor>,
    ) -> Self {
        Self {
            binaries,
            env_vars,
            leaf,
        }
    }

    /// Env(service vars) -> Env(params) -> Binary(version) -> leaf
    pub fn executor(&self, version: &Version) -> Arc<dyn TerraformExecutor> {
        let binary = Arc::new(BinaryExecutor::new(
            self.binaries.dir.clone(),
            version.clone(),
            Arc::clone(&self.leaf),
        ));
        let params = Arc::new(EnvExecutor::new(&self.binaries.params, binary));
        Arc::new(EnvExecutor::new(&self.env_vars, params))
    }
}

impl InvokerFactory for DefaultInvokerFactory {
    fn versioned_invoker(&self, version: &Version) -> Arc<dyn TerraformInvoker> {
        let executor = self.executor(version);
        let plugin_dir = self.binaries.dir.display().to_string();

        if *version < *LEGACY_BOUNDARY {
            Arc::new(LegacyInvoker::new(executor, plugin_dir))
        } else {
            Arc::new(DefaultInvoker::new(
                executor,
                plugin_dir,
                self.binaries.provider_replacements.clone(),
            ))
        }
    }
}
