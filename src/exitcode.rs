//! Process exit codes (BSD sysexits.h compatible)
//!
//! Scripts branch on these values, so the mapping is part of the public
//! interface and must stay stable across releases.

/// Successful termination
pub const OK: i32 = 0;

/// Command line usage error
pub const USAGE: i32 = 64;

/// Remote API returned a response that could not be decoded
pub const DATAERR: i32 = 65;

/// Requested remote resource does not exist
pub const NOINPUT: i32 = 66;

/// Unrecognized remote failure
pub const UNAVAILABLE: i32 = 69;

/// Remote operation finished in a failed state
pub const SOFTWARE: i32 = 70;

/// Remote resource already exists or is in a conflicting state
pub const CANTCREAT: i32 = 73;

/// Input/output error (e.g. writing a config file)
pub const IOERR: i32 = 74;

/// Bounded wait gave up before the operation finished
pub const TEMPFAIL: i32 = 75;

/// Missing credential or request rejected as unauthorized
pub const NOPERM: i32 = 77;

/// Configuration error
pub const CONFIG: i32 = 78;

/// Interrupted by the user (128 + SIGINT)
pub const INTERRUPTED: i32 = 130;
