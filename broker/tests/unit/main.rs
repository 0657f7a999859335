//! Integration tests

mod support;
mod test_fsm;
mod test_provider;
mod test_store;
mod test_workspace;
