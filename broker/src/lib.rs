//! OpenTofu deployment orchestrator
//!
//! Stages, runs and tracks IaC deployments on behalf of a service broker.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod hcl;
pub mod logs;
pub mod models;
pub mod provider;
pub mod storage;
pub mod utils;
pub mod workers;
pub mod workspace;
