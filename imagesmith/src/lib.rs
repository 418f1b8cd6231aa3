//! Iterative build-run-refine loop that turns a task description into a
//! runnable container image.
//!
//! A text generator drafts a container build recipe, the container runtime
//! builds and runs it, and the captured evidence (build logs, run logs,
//! errors) is fed back into the generator until an attempt succeeds or the
//! epoch budget runs out. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (attempt data, controller
//!   transitions, name sanitization, recipe cleanup). No I/O.
//! - **[`io`]**: Side-effecting adapters (recipe file, container runtime,
//!   generation service, configuration). Behind traits so tests can script them.
//!
//! Orchestration modules ([`controller`], [`documenter`], [`endpoints`])
//! coordinate core logic with I/O to implement CLI commands.

pub mod controller;
pub mod core;
pub mod documenter;
pub mod endpoints;
pub mod errors;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
