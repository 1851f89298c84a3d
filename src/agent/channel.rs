//! Agent channels.
//!
//! A channel is any bidirectional byte stream to the guest. The
//! hypervisor exposes each one on the host as a Unix socket; tests and
//! other transports plug in through [`ChannelConnector`].

use crate::config::BridgeSettings;
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

/// A bidirectional stream to the guest agent.
pub trait Channel: Read + Write + Send + std::fmt::Debug {}

impl<T: Read + Write + Send + std::fmt::Debug> Channel for T {}

/// Role of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Structured commands and responses.
    Control,
    /// Terminal stream.
    Console,
    /// One of the two auxiliary data channels.
    Auxiliary(usize),
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Control => write!(f, "control"),
            ChannelKind::Console => write!(f, "console"),
            ChannelKind::Auxiliary(i) => write!(f, "auxiliary {}", i),
        }
    }
}

/// Opens channels to the guest.
pub trait ChannelConnector: Send + Sync {
    /// Open the channel of the given kind at `path`.
    fn open(&self, kind: ChannelKind, path: &Path) -> io::Result<Box<dyn Channel>>;
}

/// Connects to channels exposed as Unix sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixConnector {
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl UnixConnector {
    /// Connector without timeouts; I/O blocks as the socket does.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeouts(read_timeout: Option<Duration>, write_timeout: Option<Duration>) -> Self {
        Self {
            read_timeout,
            write_timeout,
        }
    }

    pub fn from_settings(settings: &BridgeSettings) -> Self {
        Self::with_timeouts(settings.read_timeout(), settings.write_timeout())
    }
}

impl ChannelConnector for UnixConnector {
    fn open(&self, kind: ChannelKind, path: &Path) -> io::Result<Box<dyn Channel>> {
        let stream = UnixStream::connect(path)?;
        stream.set_read_timeout(self.read_timeout)?;
        stream.set_write_timeout(self.write_timeout)?;

        tracing::debug!(channel = %kind, path = %path.display(), "channel connected");
        Ok(Box::new(stream))
    }
}
