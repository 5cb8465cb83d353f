//! Subcommand implementations.

pub mod common;
pub mod get;
pub mod status;
