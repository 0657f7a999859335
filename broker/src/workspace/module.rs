//! Modules and module instances of a workspace

use std::collections::BTreeMap;

use ::hcl::Body;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::{BrokerError, Result};
use crate::workspace::encoding::null_as_default;

/// A named unit of HCL with input variables and outputs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModuleDefinition {
    pub name: String,

    /// Single top level definition
    #[serde(default)]
    pub definition: String,

    /// Named secondary definitions, written as `<name>.tf`
    #[serde(default, deserialize_with = "null_as_default")]
    pub definitions: BTreeMap<String, String>,
}

impl ModuleDefinition {
    pub fn new(
        name: impl Into<String>,
        definition: impl Into<String>,
        definitions: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            definition: definition.into(),
            definitions,
        }
    }

    /// Sorted names of the declared `variable` blocks
    pub fn inputs(&self) -> Result<Vec<String>> {
        self.block_labels("variable")
    }

    /// Sorted names of the declared `output` blocks
    pub fn outputs(&self) -> Result<Vec<String>> {
        self.block_labels("output")
    }

    /// Total length of all HCL held by the module
    pub fn hcl_len(&self) -> usize {
        self.definition.len() + self.definitions.values().map(String::len).sum::<usize>()
    }

    /// Check the module name and that every definition parses
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(BrokerError::InvalidModule("name must not be blank".to_string()));
        }
        if !self.name.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
            return Err(BrokerError::InvalidModule(format!(
                "name {:?} must match ^[a-z_]*$",
                self.name
            )));
        }

        parse(&self.definition)
            .map_err(|e| BrokerError::InvalidModule(format!("Definition: {}", e)))?;
        for (name, definition) in &self.definitions {
            parse(definition)
                .map_err(|e| BrokerError::InvalidModule(format!("Definitions[{}]: {}", name, e)))?;
        }
        Ok(())
    }

    fn block_labels(&self, identifier: &str) -> Result<Vec<String>> {
        let mut labels = Vec::new();

        let body = parse(&self.definition).map_err(BrokerError::HclParse)?;
        collect_labels(&body, identifier, &mut labels);

        for (name, definition) in &self.definitions {
            let body = parse(definition)
                .map_err(|e| BrokerError::HclParse(format!("{} decoding definitions[{}]", e, name)))?;
            collect_labels(&body, identifier, &mut labels);
        }

        labels.sort();
        Ok(labels)
    }
}

fn parse(definition: &str) -> std::result::Result<Body, String> {
    ::hcl::parse(definition).map_err(|e| e.to_string())
}

fn collect_labels(body: &Body, identifier: &str, labels: &mut Vec<String>) {
    for block in body.blocks().filter(|b| b.identifier() == identifier) {
        labels.extend(block.labels().iter().map(|label| label.as_str().to_string()));
    }
}

/// One invocation of a module with concrete inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModuleInstance {
    pub module_name: String,

    pub instance_name: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub configuration: Map<String, Value>,
}

impl ModuleInstance {
    /// The `<instance>.tf.json` document calling the module and re-exporting its outputs
    pub fn marshal_definition(&self, outputs: &[String]) -> Result<Vec<u8>> {
        let mut call = self.configuration.clone();
        call.insert(
            "source".to_string(),
            Value::String(format!("./{}", self.module_name)),
        );

        let mut module = Map::new();
        module.insert(self.instance_name.clone(), Value::Object(call));

        let mut output = Map::new();
        for name in outputs {
            output.insert(
                name.clone(),
                json!({ "value": format!("${{module.{}.{}}}", self.instance_name, name) }),
            );
        }

        let document = json!({ "module": module, "output": output });
        Ok(serde_json::to_vec_pretty(&document)?)
    }
}
