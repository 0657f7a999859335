//! Read attribute values out of `show` output

use std::collections::BTreeMap;

use ::hcl::{Block, Expression};
use serde::{Deserialize, Serialize};

use crate::errors::{BrokerError, Result};

/// A value to read from the state dump and the key to store it under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractVariable {
    /// `<resource-type>.<resource-name>.<attribute>`
    pub field_to_read: String,
    pub field_to_write: String,
}

impl ExtractVariable {
    pub fn new(field_to_read: impl Into<String>, field_to_write: impl Into<String>) -> Self {
        Self {
            field_to_read: field_to_read.into(),
            field_to_write: field_to_write.into(),
        }
    }
}

/// Extract the requested attributes from the `resource` blocks of a `show` dump.
///
/// Everything from the first `Outputs` marker on is ignored.
pub fn get_parameters(tf_hcl: &str, parameters: &[ExtractVariable]) -> Result<BTreeMap<String, String>> {
    let resources = tf_hcl.split("Outputs").next().unwrap_or_default();
    let body = ::hcl::parse(resources)
        .map_err(|e| BrokerError::HclParse(format!("error parsing subsumed HCL file: {}", e)))?;

    let mut found = BTreeMap::new();
    for block in body.blocks().filter(|b| b.identifier() == "resource") {
        let labels = block_address(block);
        for param in parameters {
            let Some((resource, attribute)) = param.field_to_read.rsplit_once('.') else {
                continue;
            };
            if resource != labels {
                continue;
            }
            if let Some(value) = attribute_text(block, attribute) {
                found.insert(param.field_to_write.clone(), value);
            }
        }
    }

    let missing: Vec<&str> = parameters
        .iter()
        .filter(|p| !found.contains_key(&p.field_to_write))
        .map(|p| p.field_to_read.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(BrokerError::MissingImportValue(missing.join(", ")));
    }

    Ok(found)
}

fn block_address(block: &Block) -> String {
    block
        .labels()
        .iter()
        .map(|label| label.as_str())
        .collect::<Vec<_>>()
        .join(".")
}

fn attribute_text(block: &Block, name: &str) -> Option<String> {
    let attribute = block.body().attributes().find(|a| a.key() == name)?;
    match attribute.expr() {
        Expression::String(s) => Some(s.clone()),
        expr => {
            let text = ::hcl::format::to_string(expr).ok()?;
            Some(text.trim().trim_matches('"').to_string())
        }
    }
}
