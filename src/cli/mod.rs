//! Command-line interface module.
//!
//! This module provides the CLI functionality for:
//! - Store lifecycle (init, delete)
//! - Recording measurements
//! - Statistics, export and offline analysis

pub mod commands;
pub mod handlers;

pub use commands::{Commands, GlobalArgs};
pub use handlers::{handle_analyse, handle_append, handle_delete, handle_export, handle_init, handle_stats};
