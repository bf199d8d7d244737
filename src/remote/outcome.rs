//! Channel result and error types

use std::time::Duration;
use thiserror::Error;

/// Error types for channel operations
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Connection to {host}:{port} failed: {reason}")]
    Connection {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Authentication failed for {user}: {reason}")]
    Auth { user: String, reason: String },

    #[error("No command may be sent before login succeeds")]
    NotLoggedIn,

    #[error("Channel is closed")]
    Closed,

    #[error("No pattern matched within {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Outcome of a single send/expect exchange
///
/// `index` always refers to the caller's requested pattern list, never to
/// the effective list with the timeout sentinel in front of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    /// One of the requested patterns appeared in the output
    Matched {
        index: usize,
        before: String,
        after: String,
    },
    /// The timeout sentinel fired first; `before` holds whatever arrived
    TimedOut { before: String },
}

impl MatchResult {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, MatchResult::TimedOut { .. })
    }

    /// Index of the matched pattern, if any
    pub fn matched_index(&self) -> Option<usize> {
        match self {
            MatchResult::Matched { index, .. } => Some(*index),
            MatchResult::TimedOut { .. } => None,
        }
    }

    /// Text that preceded the match (or everything read before the timeout)
    pub fn before(&self) -> &str {
        match self {
            MatchResult::Matched { before, .. } => before,
            MatchResult::TimedOut { before } => before,
        }
    }

    /// The matched text itself; empty on timeout
    pub fn after(&self) -> &str {
        match self {
            MatchResult::Matched { after, .. } => after,
            MatchResult::TimedOut { .. } => "",
        }
    }

    /// `before` followed by `after`, the way tools that print a trailing
    /// JSON object are parsed
    pub fn transcript(&self) -> String {
        format!("{}{}", self.before(), self.after())
    }
}
