//! Integration tests

mod config_test;
mod orchestrator_test;
mod store_test;
mod support;
