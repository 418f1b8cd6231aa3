//! Stable exit codes for imagesmith CLI commands.

/// Every task produced a working image (or the command had nothing to build).
pub const OK: i32 = 0;
/// Invalid config/arguments or any error without a dedicated code.
pub const INVALID: i32 = 1;
/// At least one task used up its epochs without a successful attempt.
pub const EXHAUSTED: i32 = 2;
/// The container runtime could not be reached.
pub const RUNTIME_UNAVAILABLE: i32 = 3;
/// The generation service failed.
pub const GENERATION_FAILED: i32 = 4;
