//! Control channel client for the hyperstart agent.
//!
//! Sends requests over the control channel and reads the matching
//! responses. Requests are strictly sequential: one response per request.

use super::channel::Channel;
use crate::error::{Error, Result};
use hyperbridge_protocol::{encode_message, read_message, AgentRequest, AgentResponse};
use std::io::Write;

/// Client for the guest agent's control channel.
#[derive(Debug)]
pub struct AgentClient {
    channel: Box<dyn Channel>,
}

impl AgentClient {
    /// Wrap an already opened control channel.
    pub fn new(channel: Box<dyn Channel>) -> Self {
        Self { channel }
    }

    /// Write a request without waiting for the response.
    pub fn send(&mut self, req: &AgentRequest) -> Result<()> {
        let command = req.name();
        let data = encode_message(req).map_err(|e| Error::protocol(command, e.to_string()))?;

        self.channel
            .write_all(&data)
            .and_then(|_| self.channel.flush())
            .map_err(|e| Error::protocol(command, format!("write failed: {}", e)))?;

        tracing::trace!(command, len = data.len(), "sent request");
        Ok(())
    }

    /// Read the response to a previously sent command.
    pub fn receive(&mut self, command: &str) -> Result<AgentResponse> {
        read_message(&mut self.channel).map_err(|e| Error::protocol(command, e.to_string()))
    }

    /// Send a request and receive its response.
    pub fn request(&mut self, req: &AgentRequest) -> Result<AgentResponse> {
        self.send(req)?;
        self.receive(req.name())
    }

    /// Ping the agent, returning its protocol version.
    pub fn ping(&mut self) -> Result<u32> {
        let resp = self.request(&AgentRequest::Ping)?;

        match resp {
            AgentResponse::Pong { version } => Ok(version),
            other => Err(unexpected("ping", other)),
        }
    }
}

/// Require an acknowledgement for `command`.
pub(crate) fn expect_ack(command: &str, resp: AgentResponse) -> Result<Option<serde_json::Value>> {
    match resp {
        AgentResponse::Ack { data } => Ok(data),
        other => Err(unexpected(command, other)),
    }
}

/// Turn a non-acknowledging response into an error for `command`.
pub(crate) fn unexpected(command: &str, resp: AgentResponse) -> Error {
    match resp {
        AgentResponse::Error { message, code: Some(code) } => {
            Error::protocol(command, format!("{} ({})", message, code))
        }
        AgentResponse::Error { message, code: None } => Error::protocol(command, message),
        other => Error::protocol(command, format!("unexpected response: {:?}", other)),
    }
}
