//! Stub driver for contexts with no execution capability
//!
//! Installed when neither a channel transport nor native launching is
//! available (e.g. a preview build). Nothing ever executes, but `wait()`
//! still completes so calling code that depends on "something always
//! completes" does not deadlock.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::command::Command;
use crate::driver::Driver;
use crate::error::{ProcessError, Result};
use crate::process::{ExitedProcess, OutputCallback, ProcessContext, ProcessHandle};
use crate::server::ServerId;
use crate::storage::{KvStorage, MemoryStore};

/// Driver whose operations deterministically fail instead of crashing the
/// host application.
pub struct StubDriver {
    local: Arc<dyn KvStorage>,
    session: Arc<dyn KvStorage>,
}

impl StubDriver {
    /// Create the driver with in-memory storage.
    pub fn new() -> Self {
        Self {
            local: Arc::new(MemoryStore::new()),
            session: Arc::new(MemoryStore::new()),
        }
    }
}

impl Default for StubDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for StubDriver {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn spawn_process(&self, server: ServerId, command: Command) -> Box<dyn ProcessHandle> {
        Box::new(StubProcess {
            context: ProcessContext::new(server, command),
        })
    }

    fn download_command_output_url(
        &self,
        _server: &ServerId,
        _command: &Command,
        _filename: &str,
    ) -> Result<String> {
        Err(ProcessError::failed(
            "download locators are not implemented by the stub driver",
        ))
    }

    fn local_storage(&self) -> Arc<dyn KvStorage> {
        Arc::clone(&self.local)
    }

    fn session_storage(&self) -> Arc<dyn KvStorage> {
        Arc::clone(&self.session)
    }
}

/// Inert process handle: never executes anything.
pub struct StubProcess {
    context: ProcessContext,
}

#[async_trait]
impl ProcessHandle for StubProcess {
    fn context(&self) -> &ProcessContext {
        &self.context
    }

    async fn execute(&mut self) -> Result<()> {
        warn!(command = %self.context.command(), "stub driver: execute() is a no-op");
        Ok(())
    }

    async fn write(&mut self, _data: &[u8], _stream: bool) -> Result<()> {
        Err(ProcessError::failed(
            self.context
                .prefix_message("write not supported by the stub driver"),
        ))
    }

    fn stream_binary(&mut self, _callback: OutputCallback) -> Result<()> {
        Err(ProcessError::failed(
            self.context
                .prefix_message("streaming not supported by the stub driver"),
        ))
    }

    async fn terminate(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    async fn wait(&mut self, fail_if_non_zero: bool) -> Result<ExitedProcess> {
        warn!(command = %self.context.command(), "stub driver: returning empty zero-exit result");
        ExitedProcess::new(self.context.clone(), 0, Vec::new(), String::new(), None)
            .into_result(fail_if_non_zero)
    }
}
