//! Command implementations
//!
//! This module contains implementations for all CLI subcommands.

pub mod address;
pub mod config;
pub mod run;
