// tests/integration/main.rs

#[path = "../common/mod.rs"]
mod common;

mod command_action;
mod config_errors;
mod fs_abstraction;
