//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure, broken schema store
pub const ERROR: i32 = 1;

/// Validation error - malformed or schema-violating configuration
pub const VALIDATION_ERROR: i32 = 2;

/// Unsafe change - the new configuration may not replace the running one
pub const UNSAFE_CHANGE: i32 = 3;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
