//! Remote shell sessions
//!
//! This module provides the pattern-matching channel used to run commands
//! on the registration host, and the session profile that brings a channel
//! from "connected" to "ready for tooling".

pub mod channel;
pub mod outcome;
pub mod pattern;
pub mod session;
pub mod ssh;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

pub use channel::{Channel, ExpectOptions, SessionState, SharedChannel};
pub use outcome::{ChannelError, MatchResult};
pub use pattern::{ExpectPattern, PatternSet};
pub use session::{ChannelConnector, Endpoint, SessionProfile, SshConnector};
pub use ssh::SshTransport;

/// Byte stream underneath a [`Channel`]
///
/// Implementations are blocking; the channel drives them from a worker
/// thread.
pub trait Transport: Send {
    /// Authenticate and start an interactive shell
    fn authenticate(&mut self, user: &str, password: &str) -> Result<(), ChannelError>;

    /// Write raw text to the shell
    fn send(&mut self, data: &str) -> Result<(), ChannelError>;

    /// Wait up to `wait` for output; `None` if nothing arrived
    fn read(&mut self, wait: Duration) -> Result<Option<String>, ChannelError>;

    /// Release the underlying connection
    fn close(&mut self) -> Result<(), ChannelError>;
}
