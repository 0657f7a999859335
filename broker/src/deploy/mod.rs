//! Running the IaC engine and tracking deployment operations

pub mod command;
pub mod executor;
pub mod fsm;
pub mod invoker;
pub mod manager;
pub mod plan_guard;
