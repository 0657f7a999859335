//! Shared fixtures: a scripted engine standing in for the `tofu` binary

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use tfbroker::app::options::{BrokerOptions, FeatureFlags, TfBinariesContext};
use tfbroker::deploy::executor::{ExecutionOutput, Invocation, TerraformExecutor};
use tfbroker::deploy::invoker::DefaultInvokerFactory;
use tfbroker::errors::{BrokerError, Result};
use tfbroker::models::context::RequestContext;
use tfbroker::models::definition::{ActionSettings, BrokerVariable, ServiceDefinition};
use tfbroker::models::varcontext::VarContext;
use tfbroker::provider::TerraformProvider;
use tfbroker::storage::MemoryStore;

pub const PROVISION_TEMPLATE: &str = r#"
variable "name" { type = string }

output "status" { value = "created ${var.name}" }
"#;

pub const BIND_TEMPLATE: &str = r#"
variable "username" { type = string }

output "username" { value = var.username }
"#;

/// One process the engine was asked to run
#[derive(Debug, Clone)]
pub struct Call {
    pub version: String,
    pub args: Vec<String>,
    pub env: Vec<String>,
}

impl Call {
    pub fn subcommand(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }
}

/// Pretends to be the engine: records calls and writes state on apply/destroy
#[derive(Default)]
pub struct FakeEngine {
    pub calls: Mutex<Vec<Call>>,
    pub outputs: Mutex<Map<String, Value>>,
    pub show_output: Mutex<String>,
    pub plan_output: Mutex<String>,
    /// Subcommand that exits with status 1
    pub fail_on: Mutex<Option<String>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        let engine = Self::default();
        engine
            .outputs
            .lock()
            .unwrap()
            .insert("status".to_string(), json!("ready"));
        Arc::new(engine)
    }

    pub fn set_outputs(&self, outputs: Value) {
        *self.outputs.lock().unwrap() = outputs.as_object().cloned().unwrap_or_default();
    }

    pub fn fail_on(&self, subcommand: &str) {
        *self.fail_on.lock().unwrap() = Some(subcommand.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// `<version> <subcommand>` per call, e.g. `1.6.0 apply`
    pub fn trace(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|call| format!("{} {}", call.version, call.subcommand()))
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl TerraformExecutor for FakeEngine {
    async fn execute(&self, _ctx: &RequestContext, invocation: Invocation) -> Result<ExecutionOutput> {
        let version = invocation
            .program
            .parent()
            .and_then(|dir| dir.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let call = Call {
            version: version.clone(),
            args: invocation.args.clone(),
            env: invocation.env.clone(),
        };
        self.calls.lock().unwrap().push(call.clone());

        if self.fail_on.lock().unwrap().as_deref() == Some(call.subcommand()) {
            return Err(BrokerError::Execution {
                message: "Error: boom exit status 1".to_string(),
                exit_code: Some(1),
            });
        }

        let mut output = ExecutionOutput::default();
        match call.subcommand() {
            "apply" => {
                let outputs = self.outputs.lock().unwrap().clone();
                std::fs::write(invocation.dir.join("terraform.tfstate"), state(&version, outputs))?;
            }
            "destroy" => {
                std::fs::write(invocation.dir.join("terraform.tfstate"), state(&version, Map::new()))?;
            }
            "show" => output.stdout = self.show_output.lock().unwrap().clone(),
            "plan" => output.stdout = self.plan_output.lock().unwrap().clone(),
            _ => {}
        }
        Ok(output)
    }
}

/// A version 4 state document
pub fn state(version: &str, outputs: Map<String, Value>) -> Vec<u8> {
    let outputs: Map<String, Value> = outputs
        .into_iter()
        .map(|(name, value)| (name, json!({"value": value, "type": "string"})))
        .collect();
    serde_json::to_vec(&json!({
        "version": 4,
        "terraform_version": version,
        "outputs": outputs,
    }))
    .unwrap()
}

pub fn vars(value: Value) -> VarContext {
    VarContext::from_value(value).unwrap()
}

pub fn definition() -> ServiceDefinition {
    ServiceDefinition {
        id: "service-1".to_string(),
        name: "fake-db".to_string(),
        provision_settings: ActionSettings {
            plan_inputs: vec![BrokerVariable {
                field_name: "subsume".to_string(),
                ..Default::default()
            }],
            user_inputs: vec![BrokerVariable {
                field_name: "name".to_string(),
                ..Default::default()
            }],
            template: PROVISION_TEMPLATE.to_string(),
            ..Default::default()
        },
        bind_settings: ActionSettings {
            user_inputs: vec![BrokerVariable {
                field_name: "username".to_string(),
                ..Default::default()
            }],
            template: BIND_TEMPLATE.to_string(),
            outputs: vec![BrokerVariable {
                field_name: "username".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn binaries(default_version: &str, upgrade_path: &[&str]) -> TfBinariesContext {
    TfBinariesContext {
        dir: "/opt/tfbroker/binaries".into(),
        default_version: default_version.parse().unwrap(),
        upgrade_path: upgrade_path.iter().map(|v| v.parse().unwrap()).collect(),
        provider_replacements: BTreeMap::new(),
        params: BTreeMap::new(),
    }
}

/// A provider over `engine` with a fast poller
pub struct Harness {
    pub engine: Arc<FakeEngine>,
    pub provider: TerraformProvider,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(definition(), binaries("1.6.0", &[]), FeatureFlags::default())
    }

    pub fn with(definition: ServiceDefinition, binaries: TfBinariesContext, flags: FeatureFlags) -> Self {
        let engine = FakeEngine::new();
        let options = BrokerOptions {
            binaries: binaries.clone(),
            flags,
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let invokers = DefaultInvokerFactory::with_executor(binaries, BTreeMap::new(), engine.clone());
        let provider = TerraformProvider::new(
            definition,
            &options,
            Arc::new(invokers),
            Arc::new(MemoryStore::new()),
        );
        Self { engine, provider }
    }
}
