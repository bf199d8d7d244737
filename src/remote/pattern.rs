//! Expect patterns - what a channel waits for after sending a command

use crate::remote::ChannelError;
use regex::Regex;
use std::fmt;

/// A single entry in an expect pattern set
#[derive(Debug, Clone)]
pub enum ExpectPattern {
    /// Sentinel that "matches" when the timeout elapses
    Timeout,
    /// Whatever the channel's current prompt pattern is at call time
    Prompt,
    /// Regular expression searched for in the output stream
    Regex(Regex),
}

impl ExpectPattern {
    /// Compile a regex pattern
    pub fn regex(pattern: &str) -> Result<Self, ChannelError> {
        Regex::new(pattern)
            .map(ExpectPattern::Regex)
            .map_err(|e| ChannelError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    /// Pattern matching a literal string
    pub fn literal(text: &str) -> Self {
        // An escaped literal always compiles
        match Regex::new(&regex::escape(text)) {
            Ok(regex) => ExpectPattern::Regex(regex),
            Err(_) => ExpectPattern::Prompt,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ExpectPattern::Timeout)
    }
}

impl fmt::Display for ExpectPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectPattern::Timeout => write!(f, "<TIMEOUT>"),
            ExpectPattern::Prompt => write!(f, "<PROMPT>"),
            ExpectPattern::Regex(r) => write!(f, "{}", r.as_str()),
        }
    }
}

/// Ordered list of patterns a command may produce
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<ExpectPattern>,
}

impl PatternSet {
    pub fn new(patterns: Vec<ExpectPattern>) -> Self {
        Self { patterns }
    }

    /// The default set: just the shell prompt
    pub fn prompt() -> Self {
        Self::new(vec![ExpectPattern::Prompt])
    }

    /// A JSON object on its own, or the prompt if the tool printed nothing
    pub fn json_or_prompt() -> Self {
        let json = ExpectPattern::regex(r"\{[^\n]*\}").unwrap_or(ExpectPattern::Prompt);
        Self::new(vec![json, ExpectPattern::Prompt])
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[ExpectPattern] {
        &self.patterns
    }

    /// The set actually evaluated by the channel
    ///
    /// Unless suppressed, the timeout sentinel is placed in front of the
    /// requested patterns so a timeout can never be confused with a match.
    pub fn effective(&self, suppress_timeout: bool) -> Vec<ExpectPattern> {
        let mut effective = Vec::with_capacity(self.patterns.len() + 1);
        if !suppress_timeout {
            effective.push(ExpectPattern::Timeout);
        }
        effective.extend(self.patterns.iter().cloned());
        effective
    }
}

impl From<Vec<ExpectPattern>> for PatternSet {
    fn from(patterns: Vec<ExpectPattern>) -> Self {
        Self::new(patterns)
    }
}

/// Position of the earliest match in `buffer`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FoundMatch {
    /// Index into the pattern slice that was searched
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

/// Find the pattern that matches earliest in the buffer
///
/// Ties on start position go to the lower index, like pexpect-style
/// matchers. The timeout sentinel never matches text.
pub(crate) fn find_earliest(
    buffer: &str,
    patterns: &[ExpectPattern],
    prompt: &Regex,
) -> Option<FoundMatch> {
    let mut best: Option<FoundMatch> = None;

    for (index, pattern) in patterns.iter().enumerate() {
        let found = match pattern {
            ExpectPattern::Timeout => None,
            ExpectPattern::Prompt => prompt.find(buffer),
            ExpectPattern::Regex(regex) => regex.find(buffer),
        };

        if let Some(m) = found {
            let better = match best {
                Some(current) => m.start() < current.start,
                None => true,
            };
            if better {
                best = Some(FoundMatch {
                    index,
                    start: m.start(),
                    end: m.end(),
                });
            }
        }
    }

    best
}
