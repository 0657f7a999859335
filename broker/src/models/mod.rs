//! Domain models

pub mod context;
pub mod definition;
pub mod deployment;
pub mod varcontext;
