//! I/O adapters behind the controller.

pub mod config;
pub mod docker;
pub mod generation;
pub mod process;
pub mod prompt;
pub mod recipe_store;
pub mod runtime;
