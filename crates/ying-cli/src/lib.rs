//! ying command-line front end.
//!
//! Configuration, logging and subcommand handlers live here so integration
//! tests can drive them without spawning the binary.

pub mod commands;
pub mod config;
pub mod logging;
