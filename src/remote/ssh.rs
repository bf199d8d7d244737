//! SSH transport backed by libssh2

use crate::remote::{ChannelError, Transport};
use ssh2::Session;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Pause between non-blocking reads that returned nothing
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Interactive shell over an SSH connection
pub struct SshTransport {
    host: String,
    session: Session,
    shell: Option<ssh2::Channel>,
    carry: Utf8Carry,
}

impl SshTransport {
    /// Open the TCP connection and complete the SSH handshake
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, ChannelError> {
        let connection_error = |reason: String| ChannelError::Connection {
            host: host.to_string(),
            port,
            reason,
        };

        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| connection_error(e.to_string()))?
            .next()
            .ok_or_else(|| connection_error("host did not resolve".to_string()))?;

        let tcp = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| connection_error(e.to_string()))?;

        let mut session = Session::new().map_err(|e| connection_error(e.to_string()))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(timeout_millis(timeout));
        session
            .handshake()
            .map_err(|e| connection_error(e.to_string()))?;

        debug!("SSH handshake with {}:{} complete", host, port);

        Ok(Self {
            host: host.to_string(),
            session,
            shell: None,
            carry: Utf8Carry::default(),
        })
    }

    fn shell(&mut self) -> Result<&mut ssh2::Channel, ChannelError> {
        self.shell.as_mut().ok_or(ChannelError::NotLoggedIn)
    }
}

impl Transport for SshTransport {
    fn authenticate(&mut self, user: &str, password: &str) -> Result<(), ChannelError> {
        let auth_error = |reason: String| ChannelError::Auth {
            user: user.to_string(),
            reason,
        };

        self.session
            .userauth_password(user, password)
            .map_err(|e| auth_error(e.to_string()))?;
        if !self.session.authenticated() {
            return Err(auth_error("credentials rejected".to_string()));
        }

        let mut shell = self.session.channel_session().map_err(map_ssh_error)?;
        shell
            .request_pty("vt100", None, None)
            .map_err(map_ssh_error)?;
        shell.shell().map_err(map_ssh_error)?;

        // Reads poll; writes toggle blocking back on
        self.session.set_blocking(false);
        self.shell = Some(shell);
        Ok(())
    }

    fn send(&mut self, data: &str) -> Result<(), ChannelError> {
        trace!("-> {}: {:?}", self.host, data);
        self.session.set_blocking(true);
        let result = self
            .shell()
            .and_then(|shell| {
                shell
                    .write_all(data.as_bytes())
                    .and_then(|_| shell.flush())
                    .map_err(|e| ChannelError::Transport(e.to_string()))
            });
        self.session.set_blocking(false);
        result
    }

    fn read(&mut self, wait: Duration) -> Result<Option<String>, ChannelError> {
        let deadline = Instant::now() + wait;
        let mut buf = [0u8; 8192];
        let shell = self.shell.as_mut().ok_or(ChannelError::NotLoggedIn)?;

        loop {
            match shell.read(&mut buf) {
                Ok(n) if n > 0 => {
                    let text = self.carry.decode(&buf[..n]);
                    if !text.is_empty() {
                        return Ok(Some(text));
                    }
                }
                Ok(_) => {
                    if shell.eof() {
                        return Err(ChannelError::Closed);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => return Err(ChannelError::Transport(e.to_string())),
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        self.session.set_blocking(true);
        if let Some(mut shell) = self.shell.take() {
            let _ = shell.send_eof();
            let _ = shell.close();
        }
        self.session
            .disconnect(None, "closing", None)
            .map_err(map_ssh_error)
    }
}

fn map_ssh_error(err: ssh2::Error) -> ChannelError {
    ChannelError::Transport(err.to_string())
}

/// libssh2 takes milliseconds as `u32`; longer waits saturate
fn timeout_millis(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

/// Holds back a multi-byte character split across reads
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    /// Decode `bytes` after any carried prefix, keeping an incomplete tail
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let keep = incomplete_tail(&self.pending);
        let tail = self.pending.split_off(self.pending.len() - keep);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = tail;
        text
    }
}

/// Length of a truncated UTF-8 sequence at the end of `bytes`, if any
fn incomplete_tail(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        match std::str::from_utf8(&bytes[bytes.len() - back..]) {
            Ok(_) => return 0,
            Err(e) if e.error_len().is_none() => return back,
            // Started on a continuation byte; look further back
            Err(_) => continue,
        }
    }
    0
}
