//! Operation FSM unit tests

use tfbroker::deploy::fsm::{OperationEvent, OperationFsm};
use tfbroker::models::deployment::{Deployment, OperationState, OperationType};
use tfbroker::workspace::Workspace;

#[test]
fn test_fsm_initial_state() {
    let fsm = OperationFsm::staged();
    assert_eq!(fsm.operation_type(), OperationType::Validation);
    assert_eq!(fsm.state(), OperationState::InProgress);
    assert!(!fsm.is_finished());
}

#[test]
fn test_fsm_success_flow() {
    let mut fsm = OperationFsm::staged();

    fsm.process(OperationEvent::Start(OperationType::Provision)).unwrap();
    assert_eq!(fsm.message(), "provision in progress");

    fsm.process(OperationEvent::Succeed("provision succeeded".to_string()))
        .unwrap();
    assert_eq!(fsm.state(), OperationState::Succeeded);
    assert!(fsm.is_finished());
}

#[test]
fn test_fsm_failure_keeps_error_text() {
    let mut fsm = OperationFsm::staged();

    fsm.process(OperationEvent::Start(OperationType::Bind)).unwrap();
    fsm.process(OperationEvent::Fail("Error: quota exceeded exit status 1".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), OperationState::Failed);
    assert_eq!(fsm.message(), "Error: quota exceeded exit status 1");
}

#[test]
fn test_fsm_restart_after_failure() {
    let mut fsm = OperationFsm::staged();
    fsm.process(OperationEvent::Start(OperationType::Provision)).unwrap();
    fsm.process(OperationEvent::Fail("error 1".to_string())).unwrap();

    fsm.process(OperationEvent::Start(OperationType::Deprovision)).unwrap();
    assert_eq!(fsm.operation_type(), OperationType::Deprovision);
    assert_eq!(fsm.state(), OperationState::InProgress);
    assert_eq!(fsm.message(), "deprovision in progress");
}

#[test]
fn test_fsm_rejects_finish_without_start() {
    let mut fsm = OperationFsm::staged();
    fsm.process(OperationEvent::Start(OperationType::Update)).unwrap();
    fsm.process(OperationEvent::Succeed("update succeeded".to_string()))
        .unwrap();

    assert!(fsm.process(OperationEvent::Succeed("again".to_string())).is_err());
    assert!(fsm.process(OperationEvent::Fail("late".to_string())).is_err());
    assert_eq!(fsm.message(), "update succeeded");
}

#[test]
fn test_fsm_resumes_from_deployment() {
    let mut deployment = Deployment::new("tf:i1:", Workspace::default());
    let mut fsm = OperationFsm::from_deployment(&deployment);
    fsm.process(OperationEvent::Start(OperationType::Upgrade)).unwrap();
    fsm.apply_to(&mut deployment);

    assert_eq!(deployment.last_operation_type, OperationType::Upgrade);
    assert_eq!(deployment.last_operation_message, "upgrade in progress");
    assert_eq!(OperationFsm::from_deployment(&deployment), fsm);
}
