//! CLI subcommands.

pub mod common;
pub mod fetch;
pub mod targets;
pub mod which;
