//! Subcommand implementations, one module per `spindle config` verb group.

pub mod config;
