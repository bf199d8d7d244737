//! Session establishment: connect, log in, elevate

use crate::core::config::ServerConfig;
use crate::credentials::Credentials;
use crate::remote::{Channel, ChannelError, ExpectOptions, PatternSet, SharedChannel};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Where the registration host lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
}

impl From<&ServerConfig> for Endpoint {
    fn from(server: &ServerConfig) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            connect_timeout: Duration::from_secs(server.connect_timeout_secs),
        }
    }
}

/// Steps that take a fresh channel to "ready for tooling"
#[derive(Debug, Clone)]
pub struct SessionProfile {
    /// Prompt installed once logged in
    pub shell_prompt: String,
    /// Privilege elevation run right after login
    pub elevation_command: Option<String>,
    pub login_timeout: Duration,
    pub command_timeout: Duration,
}

impl SessionProfile {
    pub fn from_config(server: &ServerConfig, command_timeout: Duration) -> Self {
        let elevation = server.elevation_command.trim();
        Self {
            shell_prompt: server.shell_prompt.clone(),
            elevation_command: (!elevation.is_empty()).then(|| elevation.to_string()),
            login_timeout: Duration::from_secs(server.login_timeout_secs),
            command_timeout,
        }
    }

    /// Log in and run the elevation command
    pub fn establish(&self, channel: &mut Channel, credentials: &Credentials) -> Result<(), ChannelError> {
        info!("Logging into {} as {}", channel.host(), credentials.user);
        channel.login(
            &credentials.user,
            credentials.password(),
            &self.shell_prompt,
            self.login_timeout,
        )?;

        if let Some(command) = &self.elevation_command {
            debug!("Elevating with '{}'", command);
            let result = channel.send_and_expect(
                command,
                &PatternSet::prompt(),
                self.command_timeout,
                ExpectOptions {
                    consume_trailing_prompt: false,
                    ..ExpectOptions::default()
                },
            )?;
            if result.is_timed_out() {
                return Err(ChannelError::Auth {
                    user: credentials.user.clone(),
                    reason: format!("'{}' did not return a prompt", command),
                });
            }
        }

        Ok(())
    }
}

/// Produces ready-to-use channels
///
/// Blocking; call through [`open_channel`] from async code.
pub trait ChannelConnector: Send + Sync {
    fn open(&self) -> Result<Channel, ChannelError>;
}

/// Opens SSH channels to the registration host
pub struct SshConnector {
    endpoint: Endpoint,
    profile: SessionProfile,
    credentials: Credentials,
}

impl SshConnector {
    pub fn new(endpoint: Endpoint, profile: SessionProfile, credentials: Credentials) -> Self {
        Self {
            endpoint,
            profile,
            credentials,
        }
    }
}

impl ChannelConnector for SshConnector {
    fn open(&self) -> Result<Channel, ChannelError> {
        let mut channel = Channel::connect(
            &self.endpoint.host,
            self.endpoint.port,
            self.endpoint.connect_timeout,
        )?;
        self.profile.establish(&mut channel, &self.credentials)?;
        Ok(channel)
    }
}

/// Open a channel without blocking the runtime
pub async fn open_channel(connector: Arc<dyn ChannelConnector>) -> Result<Channel, ChannelError> {
    tokio::task::spawn_blocking(move || connector.open())
        .await
        .map_err(|e| ChannelError::Internal(format!("connector task failed: {}", e)))?
}

/// Close a shared channel; errors are only logged
pub async fn close_channel(channel: &SharedChannel) {
    let channel = channel.clone();
    let closed = tokio::task::spawn_blocking(move || {
        let mut channel = channel
            .lock()
            .map_err(|_| ChannelError::Internal("channel lock poisoned".to_string()))?;
        channel.close()
    })
    .await;

    match closed {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Error closing channel: {}", e),
        Err(e) => debug!("Close task failed: {}", e),
    }
}
