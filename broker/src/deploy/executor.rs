//! Executor stack running IaC engine processes

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::errors::{BrokerError, Result};
use crate::models::context::RequestContext;
use crate::utils::flatten_lines;

/// Name of the engine binary inside a version directory
pub const BINARY_NAME: &str = "tofu";

/// A subprocess to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Complete environment as `K=V` entries
    pub env: Vec<String>,
    pub dir: PathBuf,
}

/// Captured output of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs one IaC engine invocation
#[async_trait]
pub trait TerraformExecutor: Send + Sync {
    async fn execute(&self, ctx: &RequestContext, invocation: Invocation) -> Result<ExecutionOutput>;
}

/// Bottom of the stack: spawns the process and captures its pipes
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExecutor;

#[async_trait]
impl TerraformExecutor for DefaultExecutor {
    async fn execute(&self, ctx: &RequestContext, invocation: Invocation) -> Result<ExecutionOutput> {
        info!(
            correlation_id = ctx.correlation_id(),
            "starting process: {} {} in {}",
            invocation.program.display(),
            invocation.args.join(" "),
            invocation.dir.display()
        );

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .env_clear()
            .envs(invocation.env.iter().filter_map(|entry| entry.split_once('=')))
            .current_dir(&invocation.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let exit_code = output.status.code();
            let status = match exit_code {
                Some(code) => format!("exit status {}", code),
                None => "terminated by signal".to_string(),
            };
            let message = match flatten_lines(&stderr) {
                flat if flat.is_empty() => status,
                flat => format!("{} {}", flat, status),
            };

            error!(
                correlation_id = ctx.correlation_id(),
                "process failed: {}: {}",
                invocation.program.display(),
                message
            );
            return Err(BrokerError::Execution { message, exit_code });
        }

        info!(
            correlation_id = ctx.correlation_id(),
            "finished process: {}",
            invocation.program.display()
        );
        debug!(correlation_id = ctx.correlation_id(), "process stdout: {}", stdout);

        Ok(ExecutionOutput { stdout, stderr })
    }
}

/// Runs the engine binary of one version and puts its directory on `PATH`
#[derive(Clone)]
pub struct BinaryExecutor {
    dir: PathBuf,
    version: Version,
    inner: Arc<dyn TerraformExecutor>,
}

impl BinaryExecutor {
    pub fn new(dir: impl Into<PathBuf>, version: Version, inner: Arc<dyn TerraformExecutor>) -> Self {
        Self {
            dir: dir.into(),
            version,
            inner,
        }
    }

    /// `<dir>/versions/<version>/tofu`
    pub fn binary_path(&self) -> PathBuf {
        binary_path(&self.dir, &self.version)
    }

    fn rewrite(&self, mut invocation: Invocation) -> Invocation {
        invocation.program = self.binary_path();

        let dir = self.dir.display().to_string();
        match invocation.env.iter_mut().find(|entry| entry.starts_with("PATH=")) {
            Some(entry) => {
                let original = &entry["PATH=".len()..];
                *entry = format!("PATH={}:{}", dir, original);
            }
            None => invocation.env.push(format!("PATH={}", dir)),
        }
        invocation
    }
}

/// Location of the engine binary for `version` under `dir`
pub fn binary_path(dir: &Path, version: &Version) -> PathBuf {
    dir.join("versions").join(version.to_string()).join(BINARY_NAME)
}

#[async_trait]
impl TerraformExecutor for BinaryExecutor {
    async fn execute(&self, ctx: &RequestContext, invocation: Invocation) -> Result<ExecutionOutput> {
        self.inner.execute(ctx, self.rewrite(invocation)).await
    }
}

/// Appends fixed `K=V` entries to the environment
#[derive(Clone)]
pub struct EnvExecutor {
    vars: Vec<String>,
    inner: Arc<dyn TerraformExecutor>,
}

impl EnvExecutor {
    pub fn new<I, K, V>(vars: I, inner: Arc<dyn TerraformExecutor>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| format!("{}={}", k.as_ref(), v.as_ref()))
                .collect(),
            inner,
        }
    }
}

#[async_trait]
impl TerraformExecutor for EnvExecutor {
    async fn execute(&self, ctx: &RequestContext, mut invocation: Invocation) -> Result<ExecutionOutput> {
        invocation.env.extend(self.vars.iter().cloned());
        self.inner.execute(ctx, invocation).await
    }
}
