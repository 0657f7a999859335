//! Decoding of the IaC engine state document

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::errors::{BrokerError, Result};

/// The only state format the broker reads
pub const SUPPORTED_TFSTATE_VERSION: i64 = 4;

#[derive(Debug, Clone, Deserialize)]
struct StateOutput {
    #[serde(default)]
    value: Value,
}

/// The parts of a `terraform.tfstate` the broker consults
#[derive(Debug, Clone, Deserialize)]
pub struct Tfstate {
    pub version: i64,

    #[serde(default)]
    pub terraform_version: String,

    #[serde(default)]
    outputs: BTreeMap<String, StateOutput>,
}

impl Tfstate {
    /// Parse a state document, rejecting formats other than version 4
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let state: Tfstate = serde_json::from_slice(bytes)
            .map_err(|e| BrokerError::OutputsUnavailable(format!("error creating TF state: {}", e)))?;

        if state.version != SUPPORTED_TFSTATE_VERSION {
            return Err(BrokerError::UnsupportedStateVersion(state.version));
        }
        Ok(state)
    }

    /// Root module outputs by name
    pub fn outputs(&self) -> BTreeMap<String, Value> {
        self.outputs
            .iter()
            .map(|(name, output)| (name.clone(), output.value.clone()))
            .collect()
    }
}
