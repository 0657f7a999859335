//! Deployment models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{BrokerError, Result};
use crate::workspace::Workspace;

/// Kind of the last operation run against a deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Provision,
    Update,
    Upgrade,
    Deprovision,
    Bind,
    Unbind,
    #[default]
    Validation,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Provision => "provision",
            OperationType::Update => "update",
            OperationType::Upgrade => "upgrade",
            OperationType::Deprovision => "deprovision",
            OperationType::Bind => "bind",
            OperationType::Unbind => "unbind",
            OperationType::Validation => "validation",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "provision" => Ok(OperationType::Provision),
            "update" => Ok(OperationType::Update),
            "upgrade" => Ok(OperationType::Upgrade),
            "deprovision" => Ok(OperationType::Deprovision),
            "bind" => Ok(OperationType::Bind),
            "unbind" => Ok(OperationType::Unbind),
            "validation" => Ok(OperationType::Validation),
            other => Err(BrokerError::Internal(format!("unknown operation type: {}", other))),
        }
    }
}

/// State of the last operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    #[default]
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::InProgress => "in progress",
            OperationState::Succeeded => "succeeded",
            OperationState::Failed => "failed",
        }
    }

    /// Succeeded and failed are terminal until the next start
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Succeeded | OperationState::Failed)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deployment with its workspace decoded
#[derive(Debug, Clone, PartialEq)]
pub struct Deployment {
    pub id: String,
    pub workspace: Workspace,
    pub last_operation_type: OperationType,
    pub last_operation_state: OperationState,
    pub last_operation_message: String,
}

impl Deployment {
    /// A freshly staged deployment
    pub fn new(id: impl Into<String>, workspace: Workspace) -> Self {
        Self {
            id: id.into(),
            workspace,
            last_operation_type: OperationType::Validation,
            last_operation_state: OperationState::InProgress,
            last_operation_message: String::new(),
        }
    }

    /// Decode a stored record
    pub fn from_record(record: DeploymentRecord) -> Result<Self> {
        let workspace = Workspace::from_bytes(&record.workspace)?;
        Ok(Self {
            id: record.id,
            workspace,
            last_operation_type: record.last_operation_type,
            last_operation_state: record.last_operation_state,
            last_operation_message: record.last_operation_message,
        })
    }

    /// Encode for the store
    pub fn to_record(&self) -> Result<DeploymentRecord> {
        Ok(DeploymentRecord {
            id: self.id.clone(),
            workspace: self.workspace.to_bytes()?,
            last_operation_type: self.last_operation_type,
            last_operation_state: self.last_operation_state,
            last_operation_message: self.last_operation_message.clone(),
        })
    }
}

/// A deployment as persisted by a store; the workspace is opaque
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Deployment ID, `tf:<instance>:<binding>`
    pub id: String,

    /// Serialized workspace
    #[serde(with = "crate::workspace::encoding::base64_bytes")]
    pub workspace: Vec<u8>,

    pub last_operation_type: OperationType,

    pub last_operation_state: OperationState,

    #[serde(default)]
    pub last_operation_message: String,
}
