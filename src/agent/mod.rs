//! Bridge to the hyperstart guest agent.
//!
//! This module owns the channels to the agent and drives a pod through
//! its start-up sequence:
//!
//! ```text
//! Unconnected ─► ChannelsValidated ─► ChannelsOpen ─► PodConfigured ─► Running
//!      │                 │                  │                │            │
//!      └────────┬────────┴─────────┬────────┴────────────────┘            │
//!               ▼                  ▼                                      │
//!             Error ─────────► Stopped ◄──────────────────────────────────┘
//! ```

mod bridge;
mod channel;
mod client;

pub use bridge::{AgentBridge, BridgeState};
pub use channel::{Channel, ChannelConnector, ChannelKind, UnixConnector};
pub use client::AgentClient;
