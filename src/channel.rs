//! Remote-channel transport boundary
//!
//! The channel driver does not implement a transport protocol itself; it is a
//! client of whatever authenticated, multiplexed session the host runtime
//! already holds. That session is modeled by [`ChannelTransport`], which
//! opens one binary-safe [`Channel`] per spawned command.

use crate::command::{Command, CommandOptions};
use crate::server::ServerId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;

/// Problem codes a channel may report when it closes.
///
/// These are the only codes the channel driver distinguishes; anything else
/// is folded into the generic failure variant.
pub mod problem {
    /// The remote target could not be resolved or reached.
    pub const UNKNOWN_HOST: &str = "unknown-host";
    /// The spawned program does not exist.
    pub const NOT_FOUND: &str = "not-found";
    /// Authentication against the target failed.
    pub const AUTHENTICATION_FAILED: &str = "authentication-failed";
    /// Close reason sent when the caller requests termination.
    pub const TERMINATED: &str = "terminated";
}

/// Request to open a spawn channel for one command invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnRequest {
    /// The argument vector to spawn
    pub spawn: Vec<String>,
    /// Spawn options, flattened into the request
    #[serde(flatten)]
    pub options: CommandOptions,
    /// Remote host, absent for the session's own host
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub host: Option<String>,
}

impl SpawnRequest {
    /// Build the spawn request for a `(server, command)` pair.
    pub fn new(server: &ServerId, command: &Command) -> Self {
        Self {
            spawn: command.argv().to_vec(),
            options: command.options().clone(),
            host: server.host().map(str::to_string),
        }
    }
}

/// Terminal report delivered when a channel closes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloseReason {
    /// Structural problem code, if the command could not run at all
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub problem: Option<String>,
    /// Exit status, when the process ran to completion
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exit_status: Option<i32>,
    /// Name of the signal that killed the process, if any
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signal: Option<String>,
    /// Human-readable message; carries captured stderr for clean exits
    #[serde(default)]
    pub message: String,
}

/// Event delivered by an open channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A chunk of process output, in production order
    Data(Vec<u8>),
    /// The channel closed; no further events follow
    Closed(CloseReason),
}

/// One open spawn channel. Binary-safe in both directions.
#[async_trait]
pub trait Channel: Send {
    /// Deliver bytes to the process input.
    async fn send(&mut self, data: &[u8]) -> io::Result<()>;

    /// Signal end-of-input; the process sees EOF on its stdin.
    async fn end_input(&mut self) -> io::Result<()>;

    /// Receive the next event. After [`ChannelEvent::Closed`] the channel
    /// must not be polled again.
    async fn recv(&mut self) -> io::Result<ChannelEvent>;

    /// Close the channel, optionally with a problem code such as
    /// [`problem::TERMINATED`].
    async fn close(&mut self, problem: Option<&str>) -> io::Result<()>;
}

/// The authenticated session the host runtime supplies.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Open a spawn channel for the given request.
    async fn open(&self, request: &SpawnRequest) -> io::Result<Box<dyn Channel>>;

    /// Path prefix (including any session token) under which one-shot
    /// channel locators can be materialized.
    fn locator_prefix(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_request_shape() {
        let server = ServerId::remote("storage1");
        let command = Command::new(["zfs", "list"]);
        let request = SpawnRequest::new(&server, &command);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"spawn": ["zfs", "list"], "host": "storage1"})
        );
    }

    #[test]
    fn test_spawn_request_round_trip() {
        let server = ServerId::local();
        let command = Command::with_options(
            ["cat"],
            crate::command::CommandOptions::default().directory("/var"),
        );
        let request = SpawnRequest::new(&server, &command);
        let json = serde_json::to_string(&request).unwrap();
        let back: SpawnRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }
}
