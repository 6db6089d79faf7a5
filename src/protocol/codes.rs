//! Reply status codes for the administrative wire protocol
//!
//! Exit-style codes below 256 follow the sysexits convention so they can be
//! propagated directly as a process exit status. Values of 1000 and above
//! are out-of-band sentinels used only between a connection and the
//! dispatcher, never surfaced as a process exit code.

/// Command completed successfully
pub const SUCCESS: i32 = 0;

/// Generic usage/configuration failure (sysexits `EX_USAGE`)
pub const USAGE: i32 = 64;

/// Target user does not exist (sysexits `EX_NOUSER`)
pub const NO_USER: i32 = 67;

/// Temporary failure, the operation should be retried (sysexits `EX_TEMPFAIL`)
pub const TEMP_FAIL: i32 = 75;

/// Sentinel: the connection was lost before a reply arrived.
/// Fatal for the entire run, not just the one command.
pub const DISCONNECTED: i32 = 1000;

/// Sentinel: the destination reports the true owner is elsewhere.
/// The reply payload carries the redirect destination string.
pub const REFERRAL: i32 = 1002;
