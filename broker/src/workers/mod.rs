//! Background workers

pub mod jobs;
pub mod poller;
