//! Solve statistics
//!
//! Provides:
//! - Pure statistical measures over solve times ([`measures`])
//! - Time formatting and parsing ([`format`])
//! - The session history and its statistics panel ([`session`])
//! - Recording finished solves and persisting them ([`history`])

pub mod format;
pub mod history;
pub mod measures;
pub mod session;
