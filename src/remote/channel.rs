//! Interactive remote shell channel
//!
//! A `Channel` sends one command line at a time over a [`Transport`] and
//! blocks until one of the expected patterns shows up in the output stream,
//! or the timeout sentinel fires.

use crate::remote::{
    pattern::{find_earliest, FoundMatch},
    ChannelError, ExpectPattern, MatchResult, PatternSet, SshTransport, Transport,
};
use regex::Regex;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Prompt recognised right after authentication, before the caller's
/// prompt pattern is installed
pub const LOGIN_PROMPT: &str = "[#$]";

/// Upper bound on a single transport read while waiting for a pattern
const READ_SLICE: Duration = Duration::from_millis(50);

/// How long to wait for the shell prompt to reappear after a command
const PROMPT_CONSUME_WAIT: Duration = Duration::from_secs(1);

/// A channel shared between the scheduler and blocking worker threads
pub type SharedChannel = Arc<Mutex<Channel>>;

/// Login state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport established, not yet authenticated
    Connected,
    /// Authenticated with a known prompt
    LoggedIn,
    /// Torn down; no further commands accepted
    Closed,
}

/// Per-call knobs for [`Channel::send_and_expect`]
#[derive(Debug, Clone, Copy)]
pub struct ExpectOptions {
    /// Do not prepend the timeout sentinel; a timeout becomes an error
    pub suppress_timeout: bool,
    /// Absorb the shell prompt that follows the command's output
    pub consume_trailing_prompt: bool,
}

impl Default for ExpectOptions {
    fn default() -> Self {
        Self {
            suppress_timeout: false,
            consume_trailing_prompt: true,
        }
    }
}

/// An authenticated interactive command session
pub struct Channel {
    host: String,
    port: u16,
    transport: Box<dyn Transport>,
    state: SessionState,
    user: Option<String>,
    prompt: Regex,
    /// Output read from the transport but not yet consumed by a match
    buffer: String,
    before: String,
    after: String,
    last_pattern_set: Vec<String>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("state", &self.state)
            .field("user", &self.user)
            .field("prompt", &self.prompt.as_str())
            .finish()
    }
}

impl Channel {
    /// Open an SSH transport to `host:port`
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, ChannelError> {
        let transport = SshTransport::connect(host, port, timeout)?;
        Ok(Self::with_transport(host, port, Box::new(transport)))
    }

    /// Wrap an already connected transport
    pub fn with_transport(host: impl Into<String>, port: u16, transport: Box<dyn Transport>) -> Self {
        Self {
            host: host.into(),
            port,
            transport,
            state: SessionState::Connected,
            user: None,
            prompt: default_prompt(),
            buffer: String::new(),
            before: String::new(),
            after: String::new(),
            last_pattern_set: Vec::new(),
        }
    }

    /// Authenticate and install the prompt pattern used from here on
    ///
    /// Fails with [`ChannelError::Auth`] when the credentials are rejected or
    /// no prompt shows up within `timeout`.
    pub fn login(
        &mut self,
        user: &str,
        password: &str,
        prompt: &str,
        timeout: Duration,
    ) -> Result<(), ChannelError> {
        match self.state {
            SessionState::Closed => return Err(ChannelError::Closed),
            SessionState::LoggedIn => {
                warn!("Channel to {} already logged in as {:?}", self.host, self.user);
            }
            SessionState::Connected => {}
        }

        let prompt_regex = compile_prompt(prompt)?;

        self.transport
            .authenticate(user, password)
            .map_err(|e| match e {
                ChannelError::Auth { .. } => e,
                other => ChannelError::Auth {
                    user: user.to_string(),
                    reason: other.to_string(),
                },
            })?;

        let login_prompt = compile_prompt(LOGIN_PROMPT)?;
        let patterns = [ExpectPattern::Regex(login_prompt)];
        match self.wait_for(&patterns, timeout)? {
            Some(found) => {
                self.take_match(found);
            }
            None => {
                return Err(ChannelError::Auth {
                    user: user.to_string(),
                    reason: format!(
                        "no prompt within {} seconds of login",
                        timeout.as_secs()
                    ),
                });
            }
        }

        self.prompt = prompt_regex;
        self.user = Some(user.to_string());
        self.state = SessionState::LoggedIn;
        debug!("Logged into {}:{} as {}", self.host, self.port, user);
        Ok(())
    }

    /// Replace the prompt pattern, returning the previous one
    pub fn set_prompt(&mut self, pattern: &str) -> Result<String, ChannelError> {
        let regex = compile_prompt(pattern)?;
        let previous = std::mem::replace(&mut self.prompt, regex);
        Ok(previous.as_str().to_string())
    }

    /// Send one command line and wait for one of `patterns`
    ///
    /// The effective pattern set is `[timeout sentinel] + patterns` unless
    /// `options.suppress_timeout` is set, in which case a timeout is returned
    /// as [`ChannelError::Timeout`]. An empty set means "wait for the prompt".
    pub fn send_and_expect(
        &mut self,
        command: &str,
        patterns: &PatternSet,
        timeout: Duration,
        options: ExpectOptions,
    ) -> Result<MatchResult, ChannelError> {
        match self.state {
            SessionState::Closed => return Err(ChannelError::Closed),
            SessionState::Connected => return Err(ChannelError::NotLoggedIn),
            SessionState::LoggedIn => {}
        }

        let requested = if patterns.is_empty() {
            PatternSet::prompt()
        } else {
            patterns.clone()
        };
        let effective = requested.effective(options.suppress_timeout);
        let offset = if options.suppress_timeout { 0 } else { 1 };
        self.last_pattern_set = effective.iter().map(|p| p.to_string()).collect();

        self.transport.send(&format!("{}\n", command))?;

        let result = match self.wait_for(&effective, timeout)? {
            Some(found) => {
                let matched_prompt = matches!(effective[found.index], ExpectPattern::Prompt);
                let (before, after) = self.take_match(found);
                if options.consume_trailing_prompt && !matched_prompt {
                    self.consume_prompt()?;
                }
                MatchResult::Matched {
                    index: found.index - offset,
                    before,
                    after,
                }
            }
            None => {
                let before = std::mem::take(&mut self.buffer);
                self.before = before.clone();
                self.after.clear();
                if options.suppress_timeout {
                    return Err(ChannelError::Timeout(timeout));
                }
                if options.consume_trailing_prompt {
                    self.consume_prompt()?;
                }
                MatchResult::TimedOut { before }
            }
        };

        Ok(result)
    }

    /// Tear the session down; safe to call more than once
    pub fn close(&mut self) -> Result<(), ChannelError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        debug!("Closing channel to {}:{}", self.host, self.port);
        self.transport.close()
    }

    /// Move into an `Arc<Mutex<_>>` for sharing with worker threads
    pub fn shared(self) -> SharedChannel {
        Arc::new(Mutex::new(self))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_logged_in(&self) -> bool {
        self.state == SessionState::LoggedIn
    }

    pub fn prompt_pattern(&self) -> &str {
        self.prompt.as_str()
    }

    /// Text preceding the last match
    pub fn before(&self) -> &str {
        &self.before
    }

    /// The last matched text
    pub fn after(&self) -> &str {
        &self.after
    }

    /// Display form of the pattern set evaluated by the last command
    pub fn last_pattern_set(&self) -> &[String] {
        &self.last_pattern_set
    }

    /// Read until a pattern matches or the deadline passes
    fn wait_for(
        &mut self,
        patterns: &[ExpectPattern],
        timeout: Duration,
    ) -> Result<Option<FoundMatch>, ChannelError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(found) = find_earliest(&self.buffer, patterns, &self.prompt) {
                return Ok(Some(found));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            if let Some(chunk) = self.transport.read((deadline - now).min(READ_SLICE))? {
                self.buffer.push_str(&chunk);
            }
        }
    }

    /// Split the buffer around a match and record before/after
    fn take_match(&mut self, found: FoundMatch) -> (String, String) {
        let rest = self.buffer.split_off(found.end);
        let after = self.buffer.split_off(found.start);
        let before = std::mem::replace(&mut self.buffer, rest);
        self.before = before.clone();
        self.after = after.clone();
        (before, after)
    }

    /// Bounded wait for the prompt so it doesn't leak into the next command
    fn consume_prompt(&mut self) -> Result<(), ChannelError> {
        if let Some(found) = self.wait_for(&[ExpectPattern::Prompt], PROMPT_CONSUME_WAIT)? {
            self.buffer.drain(..found.end);
        }
        Ok(())
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!("Error closing channel to {}: {}", self.host, e);
        }
    }
}

fn compile_prompt(pattern: &str) -> Result<Regex, ChannelError> {
    Regex::new(pattern).map_err(|e| ChannelError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn default_prompt() -> Regex {
    Regex::new(LOGIN_PROMPT).unwrap_or_else(|_| unreachable!("login prompt is a valid character class"))
}
