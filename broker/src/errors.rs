//! Error types for the deployment orchestrator

use thiserror::Error;

/// Broad classification of a [`BrokerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller sent something unusable
    InvalidRequest,
    /// The workspace, its HCL or its state could not be interpreted
    Workspace,
    /// The IaC engine version of the state does not fit the broker
    Upgrade,
    /// The state store failed or lacks a record
    Storage,
    /// An IaC engine invocation failed
    Execution,
    /// A plan would destroy resources
    PlanGuard,
    /// Startup configuration is invalid
    Config,
    /// Anything else
    Internal,
}

/// Main error type for the broker
#[derive(Error, Debug)]
pub enum BrokerError {
    // Invalid requests
    #[error("missing value for key {0:?}")]
    MissingKey(String),

    #[error("value for {key:?} must be a {type_name}")]
    WrongType { key: String, type_name: String },

    #[error("must provide values for all import parameters: {0}")]
    MissingImportParameter(String),

    #[error("cannot update to subsume plan")]
    CannotUpdateSubsumePlan,

    #[error("destroy attempted while provision was still in progress")]
    DestroyDuringProvision,

    // Workspace errors
    #[error("{0}")]
    HclParse(String),

    #[error("invalid module: {0}")]
    InvalidModule(String),

    #[error("cannot read state version: {0}")]
    CannotReadVersion(String),

    #[error("unsupported tfstate version: {0}")]
    UnsupportedStateVersion(i64),

    #[error("cannot find required subsumed values for fields: {0}")]
    MissingImportValue(String),

    #[error("outputs unavailable: {0}")]
    OutputsUnavailable(String),

    // Upgrade errors
    #[error("tofu version mismatch and no upgrade path specified")]
    UpgradeMismatch,

    #[error("operation attempted with newer version of OpenTofu than current state, upgrade the service before retrying operation")]
    UpgradeRequired,

    // Storage errors
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("could not find terraform deployment: {0}")]
    MissingDeployment(String),

    #[error("deployment store failed: {0}")]
    DeploymentCreateFailed(String),

    #[error("invalid operation transition: {0}")]
    InvalidTransition(String),

    // Execution errors
    #[error("{message}")]
    Execution { message: String, exit_code: Option<i32> },

    /// A failed operation as reported by a poll, carrying the stored message
    #[error("{0}")]
    OperationFailed(String),

    #[error("error from job runner: {0}")]
    UpstreamApplyFailed(String),

    #[error("tofu plan shows that resources would be destroyed - cancelling subsume")]
    PlanGuardFailure,

    // Ambient errors
    #[error("missing required env var {0}")]
    MissingEnvVar(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid version: {0}")]
    Version(#[from] semver::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::MissingKey(_)
            | BrokerError::WrongType { .. }
            | BrokerError::MissingImportParameter(_)
            | BrokerError::CannotUpdateSubsumePlan
            | BrokerError::DestroyDuringProvision => ErrorKind::InvalidRequest,

            BrokerError::HclParse(_)
            | BrokerError::InvalidModule(_)
            | BrokerError::CannotReadVersion(_)
            | BrokerError::UnsupportedStateVersion(_)
            | BrokerError::MissingImportValue(_)
            | BrokerError::OutputsUnavailable(_) => ErrorKind::Workspace,

            BrokerError::UpgradeMismatch | BrokerError::UpgradeRequired => ErrorKind::Upgrade,

            BrokerError::StoreUnavailable(_)
            | BrokerError::MissingDeployment(_)
            | BrokerError::DeploymentCreateFailed(_) => ErrorKind::Storage,

            BrokerError::Execution { .. }
            | BrokerError::OperationFailed(_)
            | BrokerError::UpstreamApplyFailed(_) => ErrorKind::Execution,

            BrokerError::PlanGuardFailure => ErrorKind::PlanGuard,

            BrokerError::MissingEnvVar(_) | BrokerError::Config(_) | BrokerError::Version(_) => {
                ErrorKind::Config
            }

            BrokerError::Io(_)
            | BrokerError::Json(_)
            | BrokerError::Internal(_)
            | BrokerError::InvalidTransition(_) => ErrorKind::Internal,
        }
    }

    /// Build an execution error carrying a plain message
    pub fn execution(message: impl Into<String>) -> Self {
        BrokerError::Execution {
            message: message.into(),
            exit_code: None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;
