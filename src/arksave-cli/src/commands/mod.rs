//! Command handlers for arksave CLI
//!
//! Each subcommand has its own module with handler functions.

pub mod blob;
pub mod configure;
pub mod search;
