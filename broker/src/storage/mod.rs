//! Storage module

pub mod layout;
pub mod settings;
pub mod store;

pub use store::{DeploymentStore, FileStore, MemoryStore};
