//! Subcommands of the `auditax` binary.

pub mod audit;
pub mod batch;
pub mod config;
pub mod input;
pub mod inspect;
pub mod render;
