//! Command-line interface
//!
//! Clap argument definitions and command dispatch.

pub mod args;
pub mod commands;
