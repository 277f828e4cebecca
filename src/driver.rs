//! Driver contract and one-shot backend selection

use crate::channel::ChannelTransport;
use crate::command::Command;
use crate::error::Result;
use crate::process::ProcessHandle;
use crate::server::ServerId;
use crate::storage::KvStorage;
use std::fmt;
use std::sync::Arc;

use crate::drivers::{ChannelDriver, LocalDriver, StubDriver};

/// A backend implementation, selected once per runtime and shared read-only
/// by every [`Server`](crate::server::Server).
pub trait Driver: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Create an unstarted process handle bound to `(server, command)`.
    fn spawn_process(&self, server: ServerId, command: Command) -> Box<dyn ProcessHandle>;

    /// Materialize a one-shot download locator for a command's raw output.
    /// Only the remote-channel backend can fulfill this.
    fn download_command_output_url(
        &self,
        server: &ServerId,
        command: &Command,
        filename: &str,
    ) -> Result<String>;

    /// Durable key/value storage scoped to the running application.
    fn local_storage(&self) -> Arc<dyn KvStorage>;

    /// Session-scoped key/value storage, discarded when the run ends.
    fn session_storage(&self) -> Arc<dyn KvStorage>;
}

/// Runtime capabilities, probed once at startup.
///
/// The selection itself lives with the caller: probe the environment, call
/// [`select_driver`], and pass the resulting `Arc<dyn Driver>` down to every
/// `Server`. There is no hidden module-level singleton.
pub struct RuntimeEnv {
    channel_transport: Option<Arc<dyn ChannelTransport>>,
    native_launch: bool,
}

impl RuntimeEnv {
    /// Probe the current runtime: no channel transport, native launching
    /// wherever the platform supports it.
    pub fn detect() -> Self {
        Self {
            channel_transport: None,
            native_launch: cfg!(unix),
        }
    }

    /// A runtime that holds an authenticated channel transport.
    pub fn with_channel(transport: Arc<dyn ChannelTransport>) -> Self {
        Self {
            channel_transport: Some(transport),
            native_launch: cfg!(unix),
        }
    }

    /// A runtime with no execution capability at all, e.g. a preview
    /// context. Selection falls through to the stub driver.
    pub fn headless() -> Self {
        Self {
            channel_transport: None,
            native_launch: false,
        }
    }
}

impl fmt::Debug for RuntimeEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeEnv")
            .field("channel_transport", &self.channel_transport.is_some())
            .field("native_launch", &self.native_launch)
            .finish()
    }
}

/// Choose the backend for this run. Deterministic for a fixed environment:
/// a channel transport wins over native launching, and with neither present
/// the stub driver is installed so preview contexts keep working for
/// everything that does not require real execution.
pub fn select_driver(env: RuntimeEnv) -> Arc<dyn Driver> {
    let driver: Arc<dyn Driver> = if let Some(transport) = env.channel_transport {
        Arc::new(ChannelDriver::new(transport))
    } else if env.native_launch {
        Arc::new(LocalDriver::new())
    } else {
        tracing::warn!("no execution backend available, installing stub driver");
        Arc::new(StubDriver::new())
    };
    tracing::debug!(driver = driver.name(), "selected execution driver");
    driver
}
