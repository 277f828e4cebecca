//! Process handle contract and completed-process snapshot

use crate::command::Command;
use crate::error::{ProcessError, Result};
use crate::server::ServerId;
use async_trait::async_trait;
use std::borrow::Cow;
use std::fmt;

/// Callback receiving output chunks while a process runs.
pub type OutputCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Identity of one invocation: the target server plus the command.
///
/// Every process handle and every [`ExitedProcess`] carries one of these so
/// diagnostics can name the program and, for remote targets, the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessContext {
    server: ServerId,
    command: Command,
}

impl ProcessContext {
    /// Bind a server identity and command together.
    pub fn new(server: ServerId, command: Command) -> Self {
        Self { server, command }
    }

    /// The execution target.
    pub fn server(&self) -> &ServerId {
        &self.server
    }

    /// The command being invoked.
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Prefix a message with `"<host>: "` (remote only) and `"<name>: "`,
    /// deduplicating an existing program-name prefix.
    pub fn prefix_message(&self, message: &str) -> String {
        let name = self.command.get_name();
        let arg0_prefix = format!("{name}: ");
        let message = message.strip_prefix(&arg0_prefix).unwrap_or(message);
        match self.server.host() {
            Some(host) => format!("{host}: {arg0_prefix}{message}"),
            None => format!("{arg0_prefix}{message}"),
        }
    }
}

impl fmt::Display for ProcessContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Process({}, {})", self.server, self.command)
    }
}

/// Immutable snapshot of a finished invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitedProcess {
    context: ProcessContext,
    exit_status: i32,
    stdout: Vec<u8>,
    stderr: String,
    killed_by: Option<String>,
}

impl ExitedProcess {
    /// Build a snapshot. Signal-terminated processes use the shell
    /// convention `exit_status = 128 + signo` with `killed_by` set.
    pub fn new(
        context: ProcessContext,
        exit_status: i32,
        stdout: Vec<u8>,
        stderr: String,
        killed_by: Option<String>,
    ) -> Self {
        Self {
            context,
            exit_status,
            stdout,
            stderr,
            killed_by,
        }
    }

    /// The invocation this snapshot belongs to.
    pub fn context(&self) -> &ProcessContext {
        &self.context
    }

    /// The exit status; 0 means success by convention.
    pub fn exit_status(&self) -> i32 {
        self.exit_status
    }

    /// Captured standard output decoded as UTF-8, lossily.
    pub fn get_stdout(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// Captured standard output as raw bytes.
    pub fn get_stdout_binary(&self) -> &[u8] {
        &self.stdout
    }

    /// Captured standard error text.
    pub fn get_stderr(&self) -> &str {
        &self.stderr
    }

    /// The signal or reason that terminated the process, if any.
    pub fn killed_by(&self) -> Option<&str> {
        self.killed_by.as_deref()
    }

    /// Whether the process exited with status 0.
    pub fn succeeded(&self) -> bool {
        self.exit_status == 0
    }

    /// Negation of [`succeeded`](Self::succeeded).
    pub fn failed(&self) -> bool {
        !self.succeeded()
    }

    /// Log the captured output for diagnostics.
    pub fn log_debug(&self) {
        tracing::debug!(
            "{self}:\nstdout:\n{}\nstderr:\n{}",
            self.get_stdout(),
            self.get_stderr()
        );
    }

    /// Apply the caller's non-zero-exit policy. Output is logged before the
    /// snapshot is traded for an error so diagnostic context is not lost.
    pub(crate) fn into_result(self, fail_if_non_zero: bool) -> Result<Self> {
        if fail_if_non_zero && self.failed() {
            self.log_debug();
            return Err(ProcessError::NonZeroExit {
                message: self.context.prefix_message(self.stderr.trim_end()),
                exit_status: self.exit_status,
            });
        }
        Ok(self)
    }
}

impl fmt::Display for ExitedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Exited{} (exited {})", self.context, self.exit_status)?;
        if let Some(killed_by) = &self.killed_by {
            write!(f, " (killed by {killed_by})")?;
        }
        Ok(())
    }
}

/// A handle to one in-flight command invocation.
///
/// A handle is tied 1:1 to the `(server, command)` pair that created it and
/// cannot be reused for a second invocation. The lifecycle is
/// unstarted → executing → exited or errored; streaming overlaps with
/// executing. All failures are typed [`ProcessError`] values; no method
/// panics for an expected failure mode.
#[async_trait]
pub trait ProcessHandle: Send {
    /// The invocation this handle belongs to.
    fn context(&self) -> &ProcessContext;

    /// Issue the backend-specific spawn. Calling this twice on one handle is
    /// a contract violation and reported as a [`ProcessError`].
    async fn execute(&mut self) -> Result<()>;

    /// Deliver bytes to the process input. With `stream` false this signals
    /// end-of-input after the write; with `stream` true, input stays open
    /// until [`close`](Self::close).
    async fn write(&mut self, data: &[u8], stream: bool) -> Result<()>;

    /// Register a callback invoked with each output chunk as it becomes
    /// available. Chunks delivered here are not duplicated into the final
    /// snapshot's stdout. Register at most once.
    fn stream_binary(&mut self, callback: OutputCallback) -> Result<()>;

    /// Request forcible termination. Best-effort: [`wait`](Self::wait) still
    /// reports whatever completion the backend observes.
    async fn terminate(&mut self) -> Result<()>;

    /// Gracefully release the handle's input resources without necessarily
    /// killing the process.
    async fn close(&mut self) -> Result<()>;

    /// Suspend until the backend reports completion. A handle that never
    /// started resolves immediately to an error rather than hanging. With
    /// `fail_if_non_zero`, a non-zero exit becomes a
    /// [`ProcessError::NonZeroExit`] after its output is logged.
    async fn wait(&mut self, fail_if_non_zero: bool) -> Result<ExitedProcess>;

    /// Text convenience over [`stream_binary`](Self::stream_binary); chunks
    /// are decoded as UTF-8, lossily.
    fn stream(&mut self, mut callback: Box<dyn FnMut(&str) + Send>) -> Result<()> {
        self.stream_binary(Box::new(move |chunk| {
            callback(&String::from_utf8_lossy(chunk));
        }))
    }

    /// Text convenience over [`write`](Self::write).
    async fn write_text(&mut self, data: &str, stream: bool) -> Result<()> {
        self.write(data.as_bytes(), stream).await
    }
}
