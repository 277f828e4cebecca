//! Remote-channel driver
//!
//! Executes commands through an authenticated, multiplexed session channel
//! supplied by the host runtime. Binary-safe in both directions; structural
//! failures arrive as problem codes on channel close and are mapped onto the
//! typed error taxonomy here.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;

use crate::channel::{problem, Channel, ChannelEvent, ChannelTransport, CloseReason, SpawnRequest};
use crate::command::Command;
use crate::driver::Driver;
use crate::error::{ProcessError, Result};
use crate::process::{ExitedProcess, OutputCallback, ProcessContext, ProcessHandle};
use crate::server::ServerId;
use crate::storage::{self, KvStorage};

/// Driver that executes through a session channel transport.
pub struct ChannelDriver {
    transport: Arc<dyn ChannelTransport>,
    local: Arc<dyn KvStorage>,
    session: Arc<dyn KvStorage>,
}

impl ChannelDriver {
    /// Create the driver around the runtime's transport.
    pub fn new(transport: Arc<dyn ChannelTransport>) -> Self {
        Self {
            transport,
            local: storage::durable("command-driver"),
            session: storage::session(),
        }
    }
}

impl Driver for ChannelDriver {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn spawn_process(&self, server: ServerId, command: Command) -> Box<dyn ProcessHandle> {
        Box::new(ChannelProcess::new(
            Arc::clone(&self.transport),
            server,
            command,
        ))
    }

    fn download_command_output_url(
        &self,
        server: &ServerId,
        command: &Command,
        filename: &str,
    ) -> Result<String> {
        let request = SpawnRequest::new(server, command);
        let mut payload = match serde_json::to_value(&request) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(_) => {
                return Err(ProcessError::failed(
                    "spawn request did not serialize to an object",
                ));
            }
            Err(e) => {
                return Err(ProcessError::failed_with(
                    "failed to encode download locator",
                    e,
                ));
            }
        };
        payload.insert("payload".into(), "stream".into());
        payload.insert("binary".into(), "raw".into());
        payload.insert(
            "external".into(),
            serde_json::json!({
                "content-disposition":
                    format!("attachment; filename=\"{}\"", percent_encode(filename)),
                "content-type": "application/x-xz, application/octet-stream",
            }),
        );
        let json = serde_json::Value::Object(payload).to_string();
        Ok(format!(
            "{}?{}",
            self.transport.locator_prefix(),
            BASE64.encode(json)
        ))
    }

    fn local_storage(&self) -> Arc<dyn KvStorage> {
        Arc::clone(&self.local)
    }

    fn session_storage(&self) -> Arc<dyn KvStorage> {
        Arc::clone(&self.session)
    }
}

/// Handle for one command running over a spawn channel.
pub struct ChannelProcess {
    context: ProcessContext,
    transport: Arc<dyn ChannelTransport>,
    channel: Option<Box<dyn Channel>>,
    callback: Option<OutputCallback>,
}

impl ChannelProcess {
    /// Create an unstarted handle.
    pub fn new(transport: Arc<dyn ChannelTransport>, server: ServerId, command: Command) -> Self {
        Self {
            context: ProcessContext::new(server, command),
            transport,
            channel: None,
            callback: None,
        }
    }

    fn not_running(&self) -> ProcessError {
        ProcessError::failed(self.context.prefix_message("process not running"))
    }

    fn host(&self) -> String {
        self.context.server().to_string()
    }

    fn map_problem(&self, code: &str, reason: CloseReason) -> ProcessError {
        match code {
            problem::UNKNOWN_HOST => ProcessError::UnknownHost {
                host: self.host(),
                message: reason.message,
            },
            problem::NOT_FOUND => ProcessError::NotFound {
                message: self.context.prefix_message(&reason.message),
            },
            problem::AUTHENTICATION_FAILED => ProcessError::AuthenticationFailed {
                host: self.host(),
                message: reason.message,
            },
            other => ProcessError::failed(format!(
                "{} ({other})",
                self.context.prefix_message(&reason.message)
            )),
        }
    }
}

#[async_trait]
impl ProcessHandle for ChannelProcess {
    fn context(&self) -> &ProcessContext {
        &self.context
    }

    async fn execute(&mut self) -> Result<()> {
        if self.channel.is_some() {
            return Err(ProcessError::failed(
                self.context.prefix_message("process already started"),
            ));
        }
        if self.context.command().argv().is_empty() {
            return Err(ProcessError::failed("cannot spawn empty argv"));
        }
        let request = SpawnRequest::new(self.context.server(), self.context.command());
        tracing::debug!(command = %self.context.command(), "opening spawn channel");
        let channel = self.transport.open(&request).await.map_err(|e| {
            ProcessError::failed_with(self.context.prefix_message("failed to open channel"), e)
        })?;
        self.channel = Some(channel);
        Ok(())
    }

    async fn write(&mut self, data: &[u8], stream: bool) -> Result<()> {
        let Some(channel) = self.channel.as_mut() else {
            return Err(self.not_running());
        };
        channel
            .send(data)
            .await
            .map_err(|e| ProcessError::failed_with(self.context.prefix_message("write failed"), e))?;
        if !stream {
            channel.end_input().await.map_err(|e| {
                ProcessError::failed_with(self.context.prefix_message("write failed"), e)
            })?;
        }
        Ok(())
    }

    fn stream_binary(&mut self, callback: OutputCallback) -> Result<()> {
        if self.channel.is_none() {
            return Err(self.not_running());
        }
        self.callback = Some(callback);
        Ok(())
    }

    async fn terminate(&mut self) -> Result<()> {
        if let Some(channel) = self.channel.as_mut() {
            channel
                .close(Some(problem::TERMINATED))
                .await
                .map_err(|e| {
                    ProcessError::failed_with(
                        self.context.prefix_message("failed to terminate"),
                        e,
                    )
                })?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(channel) = self.channel.as_mut() {
            channel.close(None).await.map_err(|e| {
                ProcessError::failed_with(self.context.prefix_message("failed to close channel"), e)
            })?;
        }
        Ok(())
    }

    async fn wait(&mut self, fail_if_non_zero: bool) -> Result<ExitedProcess> {
        let Some(mut channel) = self.channel.take() else {
            return Err(ProcessError::failed(
                self.context.prefix_message("process never started"),
            ));
        };
        let mut callback = self.callback.take();

        // Output delivered to a streaming callback is not duplicated into
        // the final snapshot.
        let mut buffered = Vec::new();
        let reason = loop {
            match channel.recv().await {
                Ok(ChannelEvent::Data(chunk)) => match callback.as_mut() {
                    Some(callback) => callback(&chunk),
                    None => buffered.extend_from_slice(&chunk),
                },
                Ok(ChannelEvent::Closed(reason)) => break reason,
                Err(e) => {
                    return Err(ProcessError::failed_with(
                        self.context.prefix_message("channel failure"),
                        e,
                    ));
                }
            }
        };

        if let Some(code) = reason.problem.clone() {
            return Err(self.map_problem(&code, reason));
        }

        let (exit_status, killed_by) = match (reason.exit_status, reason.signal) {
            (Some(code), signal) => (code, signal),
            (None, Some(signal)) => {
                let signo = signal
                    .parse::<nix::sys::signal::Signal>()
                    .map(|s| s as i32)
                    .unwrap_or(0);
                (128 + signo, Some(signal))
            }
            (None, None) => {
                return Err(ProcessError::failed(format!(
                    "{} (channel closed without exit status)",
                    self.context.prefix_message(&reason.message)
                )));
            }
        };

        ExitedProcess::new(
            self.context.clone(),
            exit_status,
            buffered,
            reason.message,
            killed_by,
        )
        .into_result(fail_if_non_zero)
    }
}

fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
