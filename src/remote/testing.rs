//! Scripted transport for unit tests

use crate::remote::{Channel, ChannelConnector, ChannelError, SharedChannel, Transport};
use regex::Regex;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replies to each command with the output of the first matching rule,
/// followed by the prompt. Commands matching no rule just get the prompt.
pub(crate) struct ScriptTransport {
    rules: Vec<(Regex, Option<String>)>,
    incoming: VecDeque<String>,
    pub sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptTransport {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            incoming: VecDeque::new(),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer commands matching `pattern` with `output`
    pub fn reply(mut self, pattern: &str, output: &str) -> Self {
        self.rules
            .push((Regex::new(pattern).unwrap(), Some(output.to_string())));
        self
    }

    /// Never answer commands matching `pattern`
    pub fn hang(mut self, pattern: &str) -> Self {
        self.rules.push((Regex::new(pattern).unwrap(), None));
        self
    }

    /// A logged-in channel over this transport
    pub fn into_channel(self) -> Channel {
        let mut channel = Channel::with_transport("reg.test", 22, Box::new(self));
        channel
            .login("relmgt", "pw", r"\$[ ]", Duration::from_secs(1))
            .unwrap();
        channel
    }

    pub fn into_shared(self) -> SharedChannel {
        self.into_channel().shared()
    }
}

/// Hands out a fresh scripted channel per `open`
pub(crate) struct ScriptConnector<F> {
    make: F,
}

impl<F> ScriptConnector<F>
where
    F: Fn() -> ScriptTransport + Send + Sync,
{
    pub fn new(make: F) -> Self {
        Self { make }
    }
}

impl<F> ChannelConnector for ScriptConnector<F>
where
    F: Fn() -> ScriptTransport + Send + Sync,
{
    fn open(&self) -> Result<Channel, ChannelError> {
        Ok((self.make)().into_channel())
    }
}

impl Transport for ScriptTransport {
    fn authenticate(&mut self, _user: &str, _password: &str) -> Result<(), ChannelError> {
        self.incoming.push_back("$ ".to_string());
        Ok(())
    }

    fn send(&mut self, data: &str) -> Result<(), ChannelError> {
        let command = data.trim_end().to_string();
        self.sent.lock().unwrap().push(command.clone());

        let reply = self
            .rules
            .iter()
            .find(|(pattern, _)| pattern.is_match(&command))
            .map(|(_, output)| output.clone());

        match reply {
            Some(None) => {}
            Some(Some(output)) => {
                self.incoming
                    .push_back(format!("{}\r\n{}\r\n$ ", command, output));
            }
            None => self.incoming.push_back(format!("{}\r\n$ ", command)),
        }
        Ok(())
    }

    fn read(&mut self, wait: Duration) -> Result<Option<String>, ChannelError> {
        match self.incoming.pop_front() {
            Some(chunk) => Ok(Some(chunk)),
            None => {
                std::thread::sleep(wait);
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }
}
