//! Finite state machine for the last operation of a deployment

use crate::models::deployment::{Deployment, OperationState, OperationType};

/// Operation event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationEvent {
    /// Begin an operation, resetting any previous one
    Start(OperationType),

    /// Operation completed, with the success message
    Succeed(String),

    /// Operation failed, with the error text
    Fail(String),
}

/// Operation FSM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFsm {
    operation_type: OperationType,
    state: OperationState,
    message: String,
}

impl OperationFsm {
    /// A freshly staged deployment: a validation in progress
    pub fn staged() -> Self {
        Self {
            operation_type: OperationType::Validation,
            state: OperationState::InProgress,
            message: String::new(),
        }
    }

    /// Resume from the last operation recorded on a deployment
    pub fn from_deployment(deployment: &Deployment) -> Self {
        Self {
            operation_type: deployment.last_operation_type,
            state: deployment.last_operation_state,
            message: deployment.last_operation_message.clone(),
        }
    }

    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Finished iff the state is terminal
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: OperationEvent) -> Result<(), String> {
        match (self.state, event) {
            // Start is accepted from any state
            (_, OperationEvent::Start(operation_type)) => {
                self.operation_type = operation_type;
                self.state = OperationState::InProgress;
                self.message = format!("{} in progress", operation_type);
            }

            (OperationState::InProgress, OperationEvent::Succeed(message)) => {
                self.state = OperationState::Succeeded;
                self.message = message;
            }
            (OperationState::InProgress, OperationEvent::Fail(message)) => {
                self.state = OperationState::Failed;
                self.message = message;
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("{} -> {:?}", state, event));
            }
        }
        Ok(())
    }

    /// Write the current operation onto a deployment
    pub fn apply_to(&self, deployment: &mut Deployment) {
        deployment.last_operation_type = self.operation_type;
        deployment.last_operation_state = self.state;
        deployment.last_operation_message = self.message.clone();
    }
}

impl Default for OperationFsm {
    fn default() -> Self {
        Self::staged()
    }
}
