//! Runtime options

pub mod options;
