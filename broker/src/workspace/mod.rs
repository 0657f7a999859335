//! The in-memory IaC project and its on-disk materialization

pub mod encoding;
pub mod module;
pub mod prevent_destroy;
pub mod tfstate;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::deploy::command::Command;
use crate::deploy::executor::{ExecutionOutput, Invocation, TerraformExecutor};
use crate::errors::{BrokerError, Result};
use crate::filesys::dir::Dir;
use crate::models::context::RequestContext;
use crate::utils::parse_version;

pub use crate::hcl::transform::{ParameterMapping, Transformer};
pub use module::{ModuleDefinition, ModuleInstance};
pub use tfstate::Tfstate;

/// Name of the module built from a service definition
pub const DEFAULT_MODULE_NAME: &str = "brokertemplate";

/// Name of the single instance of that module
pub const DEFAULT_INSTANCE_NAME: &str = "instance";

/// State file name inside the working directory
pub const TFSTATE_FILE: &str = "terraform.tfstate";

/// Auxiliary files captured from the working directory after each run
pub const AUXILIARY_STATE_PATTERN: &str = "*.pem";

const PROGRAM: &str = "terraform";

/// Modules, instances, state and import rewrites of one deployment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(default, deserialize_with = "encoding::null_as_default")]
    pub modules: Vec<ModuleDefinition>,

    #[serde(default, deserialize_with = "encoding::null_as_default")]
    pub instances: Vec<ModuleInstance>,

    /// State produced by the IaC engine, opaque apart from version and outputs
    #[serde(rename = "tfstate", default, with = "encoding::base64_option")]
    pub state: Option<Vec<u8>>,

    /// Files such as certificates that the IaC engine leaves next to its state
    #[serde(default, with = "encoding::base64_map")]
    pub additional_state: BTreeMap<String, Vec<u8>>,

    #[serde(rename = "transform", default)]
    pub transformer: Transformer,

    #[serde(skip)]
    dir_lock: Arc<Mutex<()>>,
}

impl PartialEq for Workspace {
    fn eq(&self, other: &Self) -> bool {
        self.modules == other.modules
            && self.instances == other.instances
            && self.state == other.state
            && self.additional_state == other.additional_state
            && self.transformer == other.transformer
    }
}

/// Keep only the declared inputs; undeclared inputs become `null`
fn prune_configuration(vars: &Map<String, Value>, inputs: &[String]) -> Map<String, Value> {
    inputs
        .iter()
        .map(|name| (name.clone(), vars.get(name).cloned().unwrap_or(Value::Null)))
        .collect()
}

impl Workspace {
    /// Build a single-module workspace from service definition templates
    pub fn new(
        vars: &Map<String, Value>,
        template: &str,
        templates: &BTreeMap<String, String>,
        parameter_mappings: Vec<ParameterMapping>,
        parameters_to_remove: Vec<String>,
        parameters_to_add: Vec<ParameterMapping>,
    ) -> Result<Self> {
        let module = ModuleDefinition::new(DEFAULT_MODULE_NAME, template, templates.clone());
        let inputs = module.inputs()?;

        let instance = ModuleInstance {
            module_name: module.name.clone(),
            instance_name: DEFAULT_INSTANCE_NAME.to_string(),
            configuration: prune_configuration(vars, &inputs),
        };

        Ok(Self {
            modules: vec![module],
            instances: vec![instance],
            transformer: Transformer {
                parameter_mappings,
                parameters_to_remove,
                parameters_to_add,
            },
            ..Default::default()
        })
    }

    /// Decode a serialized workspace
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode as JSON
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn has_state(&self) -> bool {
        self.state.is_some()
    }

    /// IaC engine version recorded in the state
    pub fn state_version(&self) -> Result<semver::Version> {
        let Some(state) = &self.state else {
            return Err(BrokerError::CannotReadVersion(
                "workspace state not generated".to_string(),
            ));
        };

        #[derive(Deserialize)]
        struct Receiver {
            #[serde(default)]
            terraform_version: String,
        }

        let receiver: Receiver = serde_json::from_slice(state).map_err(|e| {
            BrokerError::CannotReadVersion(format!("invalid workspace state {}", e))
        })?;
        parse_version(&receiver.terraform_version).map_err(|e| {
            BrokerError::CannotReadVersion(format!(
                "invalid version {:?}: {}",
                receiver.terraform_version, e
            ))
        })
    }

    /// Outputs recorded in the state
    pub fn outputs(&self, _instance_name: &str) -> Result<BTreeMap<String, Value>> {
        let state = self.state.as_deref().ok_or_else(|| {
            BrokerError::OutputsUnavailable("workspace state not generated".to_string())
        })?;
        Ok(Tfstate::parse(state)?.outputs())
    }

    /// Name of the first instance, the one the broker reads outputs from
    pub fn default_instance_name(&self) -> &str {
        self.instances
            .first()
            .map(|instance| instance.instance_name.as_str())
            .unwrap_or(DEFAULT_INSTANCE_NAME)
    }

    /// Re-prune the first instance's configuration against the first module's inputs
    pub fn update_instance_configuration(&mut self, vars: &Map<String, Value>) -> Result<()> {
        let module = self
            .modules
            .first()
            .ok_or_else(|| BrokerError::InvalidModule("workspace has no modules".to_string()))?;
        let inputs = module.inputs()?;

        let instance = self
            .instances
            .first_mut()
            .ok_or_else(|| BrokerError::InvalidModule("workspace has no instances".to_string()))?;
        instance.configuration = prune_configuration(vars, &inputs);
        Ok(())
    }

    /// Materialize into a scratch directory, run `commands` in order and tear down.
    ///
    /// Holds the workspace lock throughout. State and auxiliary files are read
    /// back and the directory removed on every exit path. Returns the output of
    /// the last command.
    pub async fn execute(
        &mut self,
        ctx: &RequestContext,
        executor: &dyn TerraformExecutor,
        commands: &[Command],
    ) -> Result<ExecutionOutput> {
        let lock = Arc::clone(&self.dir_lock);
        let _guard = lock.lock().await;

        let dir = Dir::create_temp_dir("tfbroker").await?;
        debug!("materializing workspace in {}", dir.path().display());

        let result = self.run_in(&dir, ctx, executor, commands).await;
        let teardown = self.teardown(&dir).await;

        let output = result?;
        teardown?;
        Ok(output)
    }

    async fn run_in(
        &self,
        dir: &Dir,
        ctx: &RequestContext,
        executor: &dyn TerraformExecutor,
        commands: &[Command],
    ) -> Result<ExecutionOutput> {
        self.initialize_fs(dir).await?;

        let base_env: Vec<String> = std::env::vars_os()
            .map(|(k, v)| format!("{}={}", k.to_string_lossy(), v.to_string_lossy()))
            .collect();

        let mut last = ExecutionOutput::default();
        for command in commands {
            let mut env = base_env.clone();
            env.extend(command.env());

            let invocation = Invocation {
                program: PathBuf::from(PROGRAM),
                args: command.args(),
                env,
                dir: dir.path().to_path_buf(),
            };
            last = executor.execute(ctx, invocation).await?;
        }
        Ok(last)
    }

    async fn initialize_fs(&self, dir: &Dir) -> Result<()> {
        let flat = self.modules.len() == 1
            && self.modules[0].definition.is_empty()
            && self.modules[0].hcl_len() > 0;

        if flat {
            self.initialize_fs_flat(dir).await?;
        } else {
            self.initialize_fs_modules(dir).await?;
        }

        if let Some(state) = self.state.as_deref().filter(|s| !s.is_empty()) {
            dir.file(TFSTATE_FILE).write_bytes(state).await?;
        }
        for (name, contents) in &self.additional_state {
            dir.file(name).write_bytes(contents).await?;
        }
        Ok(())
    }

    async fn initialize_fs_flat(&self, dir: &Dir) -> Result<()> {
        if self.instances.len() != 1 {
            return Err(BrokerError::InvalidModule(
                "cannot build flat terraform workspace with multiple instances".to_string(),
            ));
        }

        for (name, tf) in &self.modules[0].definitions {
            dir.file(&format!("{}.tf", name)).write_string(tf).await?;
        }

        let variables = serde_json::to_vec_pretty(&self.instances[0].configuration)?;
        dir.file("terraform.tfvars.json").write_bytes(&variables).await
    }

    async fn initialize_fs_modules(&self, dir: &Dir) -> Result<()> {
        let mut outputs: BTreeMap<&str, Vec<String>> = BTreeMap::new();

        for module in &self.modules {
            let parent = dir.subdir(&module.name);
            parent.create().await?;

            if !module.definition.is_empty() {
                parent.file("definition.tf").write_string(&module.definition).await?;
            }
            for (name, tf) in &module.definitions {
                parent.file(&format!("{}.tf", name)).write_string(tf).await?;
            }

            outputs.insert(module.name.as_str(), module.outputs()?);
        }

        for instance in &self.instances {
            let module_outputs = outputs
                .get(instance.module_name.as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();
            let contents = instance.marshal_definition(module_outputs)?;
            dir.file(&format!("{}.tf.json", instance.instance_name))
                .write_bytes(&contents)
                .await?;
        }
        Ok(())
    }

    /// Read back state and auxiliary files, then remove the directory
    async fn teardown(&mut self, dir: &Dir) -> Result<()> {
        let captured = self.capture_state(dir).await;

        if let Err(e) = dir.delete().await {
            warn!("failed to remove workspace dir {}: {}", dir.path().display(), e);
            captured?;
            return Err(e);
        }
        captured
    }

    async fn capture_state(&mut self, dir: &Dir) -> Result<()> {
        let state_file = dir.file(TFSTATE_FILE);
        if state_file.exists().await {
            self.state = Some(state_file.read_bytes().await?);
        }

        for file in dir.glob_files(AUXILIARY_STATE_PATTERN)? {
            let Some(name) = file.name() else {
                continue;
            };
            let contents = file.read_bytes().await?;
            self.additional_state.insert(name, contents);
        }
        Ok(())
    }
}

impl fmt::Display for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Terraform Workspace")?;
        writeln!(f, "modules: {}", self.modules.len())?;
        writeln!(f, "instances: {}", self.instances.len())?;
        writeln!(f)?;

        for instance in &self.instances {
            writeln!(f, "## Instance {:?}", instance.instance_name)?;
            writeln!(f, "module = {:?}", instance.module_name)?;

            for (k, v) in &instance.configuration {
                writeln!(f, "input.{} = {}", k, v)?;
            }
            if let Ok(outputs) = self.outputs(&instance.instance_name) {
                for (k, v) in &outputs {
                    writeln!(f, "output.{} = {}", k, v)?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
