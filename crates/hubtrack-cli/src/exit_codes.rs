//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Input error - invalid repository url, registered file or configuration
pub const INPUT_ERROR: i32 = 2;

/// Network error - a repository or registry could not be reached
pub const NETWORK_ERROR: i32 = 3;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
