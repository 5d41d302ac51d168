//! CLI command implementations for herakles-sockstat-exporter.
//!
//! - `check`: System validation
//! - `config`: Configuration file generation
//! - `test`: Collection runs with plain-text output

pub mod check;
pub mod config;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use test::command_test;
