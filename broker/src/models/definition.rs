//! Service definition descriptor consumed by the provider

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{BrokerError, Result};
use crate::models::varcontext::{is_truthy, VarContext};
use crate::workspace::{ModuleDefinition, ParameterMapping, DEFAULT_MODULE_NAME};

const SUBSUME: &str = "subsume";

/// A variable accepted from the platform or exposed as an output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrokerVariable {
    pub field_name: String,

    #[serde(default, rename = "type")]
    pub type_name: String,

    #[serde(default)]
    pub details: String,

    #[serde(default)]
    pub required: bool,

    /// Dotted `<type>.<name>.<attribute>` to read back from the imported state
    #[serde(default)]
    pub tf_attribute: String,

    /// Provision detail that, when literally `true`, skips the attribute read
    #[serde(default)]
    pub tf_attribute_skip: String,
}

/// An input computed by the broker rather than supplied by the user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputedVariable {
    pub name: String,

    #[serde(default)]
    pub default: Value,

    #[serde(default)]
    pub overwrite: bool,

    #[serde(default, rename = "type")]
    pub type_name: String,
}

/// A resource to import when subsuming existing infrastructure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportVariable {
    /// Request variable holding the cloud resource ID
    pub field_name: String,

    #[serde(default, rename = "type")]
    pub type_name: String,

    #[serde(default)]
    pub details: String,

    /// Address of the resource in the IaC project
    pub tf_resource: String,
}

/// Settings for one action (provision or bind)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionSettings {
    #[serde(default)]
    pub plan_inputs: Vec<BrokerVariable>,

    #[serde(default)]
    pub user_inputs: Vec<BrokerVariable>,

    #[serde(default, rename = "computed_inputs")]
    pub computed: Vec<ComputedVariable>,

    #[serde(default)]
    pub template: String,

    #[serde(default)]
    pub templates: BTreeMap<String, String>,

    #[serde(default)]
    pub outputs: Vec<BrokerVariable>,

    #[serde(default, rename = "import_inputs")]
    pub import_variables: Vec<ImportVariable>,

    #[serde(default)]
    pub import_parameter_mappings: Vec<ParameterMapping>,

    #[serde(default)]
    pub import_parameters_to_delete: Vec<String>,

    #[serde(default)]
    pub import_parameters_to_add: Vec<ParameterMapping>,
}

impl ActionSettings {
    /// Whether the request asks to subsume existing resources
    pub fn is_tf_import(&self, vars: &VarContext) -> bool {
        self.plan_inputs.iter().any(|input| {
            input.field_name == SUBSUME && vars.has_key(SUBSUME) && vars.get_bool(SUBSUME).unwrap_or(false)
        })
    }

    /// Map each import resource address to the ID supplied in `vars`.
    ///
    /// Every import variable must be present.
    pub fn import_resources(&self, vars: &Map<String, Value>) -> Result<BTreeMap<String, String>> {
        let resources: BTreeMap<String, String> = self
            .import_variables
            .iter()
            .filter_map(|import| {
                vars.get(&import.field_name)
                    .map(|value| (import.tf_resource.clone(), display_value(value)))
            })
            .collect();

        let all_present = self
            .import_variables
            .iter()
            .all(|import| vars.contains_key(&import.field_name));
        if !all_present {
            let names: Vec<&str> = self
                .import_variables
                .iter()
                .map(|import| import.field_name.as_str())
                .collect();
            return Err(BrokerError::MissingImportParameter(names.join(", ")));
        }

        Ok(resources)
    }

    /// Check that the templates only use declared inputs and expose exactly the declared outputs
    pub fn validate_template_io(&self) -> Result<()> {
        let module = ModuleDefinition::new("", self.template.clone(), self.templates.clone());

        let declared: BTreeSet<&str> = self
            .plan_inputs
            .iter()
            .chain(self.user_inputs.iter())
            .map(|input| input.field_name.as_str())
            .chain(self.computed.iter().map(|input| input.name.as_str()))
            .collect();
        let inputs = module.inputs()?;
        let missing: Vec<&str> = inputs
            .iter()
            .map(String::as_str)
            .filter(|name| !declared.contains(name))
            .collect();
        if !missing.is_empty() {
            return Err(BrokerError::Config(format!(
                "fields used but not declared: {}",
                missing.join(", ")
            )));
        }

        let declared_outputs: BTreeSet<&str> =
            self.outputs.iter().map(|output| output.field_name.as_str()).collect();
        let outputs = module.outputs()?;
        let template_outputs: BTreeSet<&str> = outputs
            .iter()
            .map(String::as_str)
            .filter(|name| *name != "status")
            .collect();
        if declared_outputs != template_outputs {
            return Err(BrokerError::Config(format!(
                "template outputs {:?} must match declared outputs {:?}",
                outputs, declared_outputs
            )));
        }

        Ok(())
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A service plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServicePlan {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// The parts of a service definition the orchestrator depends on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, rename = "provision")]
    pub provision_settings: ActionSettings,

    #[serde(default, rename = "bind")]
    pub bind_settings: ActionSettings,

    #[serde(default)]
    pub plans: Vec<ServicePlan>,

    #[serde(default)]
    pub required_env_vars: Vec<String>,
}

impl ServiceDefinition {
    /// Whether the plan carries a truthy `subsume` property
    pub fn is_subsume_plan(&self, plan_id: &str) -> bool {
        self.plans
            .iter()
            .find(|plan| plan.id == plan_id)
            .and_then(|plan| plan.properties.get(SUBSUME))
            .map(is_truthy)
            .unwrap_or(false)
    }

    /// Check the provision and bind templates before the definition is served
    pub fn validate(&self) -> Result<()> {
        for action in [&self.provision_settings, &self.bind_settings] {
            ModuleDefinition::new(DEFAULT_MODULE_NAME, action.template.clone(), action.templates.clone())
                .validate()?;
            action.validate_template_io()?;
        }
        Ok(())
    }

    /// Read every required env var from the process environment
    pub fn resolve_env_vars(&self) -> Result<BTreeMap<String, String>> {
        self.resolve_env_vars_with(|name| std::env::var(name).ok())
    }

    pub fn resolve_env_vars_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<BTreeMap<String, String>> {
        self.required_env_vars
            .iter()
            .map(|name| {
                lookup(name)
                    .map(|value| (name.clone(), value))
                    .ok_or_else(|| BrokerError::MissingEnvVar(name.clone()))
            })
            .collect()
    }
}
