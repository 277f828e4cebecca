//! Native child-process driver

use async_process::{Child, ChildStderr, ChildStdin, ChildStdout, Stdio};
use async_trait::async_trait;
use futures_lite::io::{AsyncReadExt, AsyncWriteExt};
use std::sync::Arc;

use crate::command::Command;
use crate::driver::Driver;
use crate::error::{ProcessError, Result};
use crate::process::{ExitedProcess, OutputCallback, ProcessContext, ProcessHandle};
use crate::server::ServerId;
use crate::storage::{self, KvStorage};

/// Helper program used to honor an elevation request.
const ELEVATION_HELPER: &str = "pkexec";

/// Driver that spawns real child processes on the local host.
pub struct LocalDriver {
    local: Arc<dyn KvStorage>,
    session: Arc<dyn KvStorage>,
}

impl LocalDriver {
    /// Create the driver and its storage handles.
    pub fn new() -> Self {
        Self {
            local: storage::durable("command-driver"),
            session: storage::session(),
        }
    }
}

impl Default for LocalDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for LocalDriver {
    fn name(&self) -> &'static str {
        "local"
    }

    fn spawn_process(&self, server: ServerId, command: Command) -> Box<dyn ProcessHandle> {
        Box::new(LocalProcess::new(server, command))
    }

    fn download_command_output_url(
        &self,
        _server: &ServerId,
        command: &Command,
        _filename: &str,
    ) -> Result<String> {
        Err(ProcessError::failed(format!(
            "{}: download locators require a remote channel",
            command.get_name()
        )))
    }

    fn local_storage(&self) -> Arc<dyn KvStorage> {
        Arc::clone(&self.local)
    }

    fn session_storage(&self) -> Arc<dyn KvStorage> {
        Arc::clone(&self.session)
    }
}

/// Handle for one local child process.
pub struct LocalProcess {
    context: ProcessContext,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    callback: Option<OutputCallback>,
}

impl LocalProcess {
    /// Create an unstarted handle.
    pub fn new(server: ServerId, command: Command) -> Self {
        Self {
            context: ProcessContext::new(server, command),
            child: None,
            stdin: None,
            stdout: None,
            stderr: None,
            callback: None,
        }
    }

    fn not_running(&self) -> ProcessError {
        ProcessError::failed(self.context.prefix_message("process not running"))
    }
}

#[async_trait]
impl ProcessHandle for LocalProcess {
    fn context(&self) -> &ProcessContext {
        &self.context
    }

    async fn execute(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Err(ProcessError::failed(
                self.context.prefix_message("process already started"),
            ));
        }

        let command = self.context.command();
        let options = command.options();
        let argv = command.argv();

        let Some(program) = argv.first() else {
            return Err(ProcessError::failed("cannot spawn empty argv"));
        };
        if options.pty {
            return Err(ProcessError::failed(
                self.context.prefix_message("pty not supported by the local driver"),
            ));
        }
        if !self.context.server().is_local() {
            return Err(ProcessError::failed(self.context.prefix_message(
                "remote host execution not supported by the local driver",
            )));
        }

        let mut cmd = if options.elevate.requested() {
            let mut cmd = async_process::Command::new(ELEVATION_HELPER);
            cmd.args(argv);
            cmd
        } else {
            let mut cmd = async_process::Command::new(program);
            cmd.args(&argv[1..]);
            cmd
        };
        if let Some(dir) = &options.directory {
            cmd.current_dir(dir);
        }
        if let Some(environ) = &options.environ {
            cmd.envs(environ);
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!(command = %command, "spawning local process");
        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ProcessError::NotFound {
                message: self.context.prefix_message(&e.to_string()),
            },
            _ => ProcessError::Failed {
                message: self.context.prefix_message("failed to spawn process"),
                source: Some(Box::new(e)),
            },
        })?;

        self.stdin = child.stdin.take();
        self.stdout = child.stdout.take();
        self.stderr = child.stderr.take();
        self.child = Some(child);
        Ok(())
    }

    async fn write(&mut self, data: &[u8], stream: bool) -> Result<()> {
        if self.child.is_none() {
            return Err(self.not_running());
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ProcessError::failed(
                self.context.prefix_message("process input already closed"),
            ));
        };
        stdin
            .write_all(data)
            .await
            .map_err(|e| ProcessError::failed_with(self.context.prefix_message("write failed"), e))?;
        stdin
            .flush()
            .await
            .map_err(|e| ProcessError::failed_with(self.context.prefix_message("write failed"), e))?;
        if !stream {
            // Dropping the pipe delivers EOF.
            self.stdin = None;
        }
        Ok(())
    }

    fn stream_binary(&mut self, callback: OutputCallback) -> Result<()> {
        if self.child.is_none() {
            return Err(self.not_running());
        }
        self.callback = Some(callback);
        Ok(())
    }

    async fn terminate(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            if let Some(child) = self.child.as_ref() {
                let pid = Pid::from_raw(child.id() as i32);
                signal::kill(pid, Signal::SIGTERM).map_err(|e| {
                    ProcessError::failed_with(self.context.prefix_message("failed to terminate"), e)
                })?;
            }
        }
        #[cfg(not(unix))]
        {
            if let Some(child) = self.child.as_mut() {
                child.kill().map_err(|e| {
                    ProcessError::failed_with(self.context.prefix_message("failed to terminate"), e)
                })?;
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.stdin = None;
        Ok(())
    }

    async fn wait(&mut self, fail_if_non_zero: bool) -> Result<ExitedProcess> {
        let Some(mut child) = self.child.take() else {
            return Err(ProcessError::failed(
                self.context.prefix_message("process never started"),
            ));
        };
        let stdout = self.stdout.take();
        let stderr = self.stderr.take();
        let mut callback = self.callback.take();

        // Drive both pipes alongside the exit status so a full pipe can
        // never wedge the child before it exits.
        let stdout_fut = async {
            let mut buffered = Vec::new();
            if let Some(mut stdout) = stdout {
                match callback.as_mut() {
                    Some(callback) => {
                        let mut chunk = [0u8; 8192];
                        loop {
                            match stdout.read(&mut chunk).await {
                                Ok(0) | Err(_) => break,
                                Ok(n) => callback(&chunk[..n]),
                            }
                        }
                    }
                    None => {
                        let _ = stdout.read_to_end(&mut buffered).await;
                    }
                }
            }
            buffered
        };
        let stderr_fut = async {
            let mut text = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut text).await;
            }
            text
        };
        let status_fut = child.status();

        let (stdout_bytes, stderr_text, status) =
            futures::join!(stdout_fut, stderr_fut, status_fut);
        let status = status.map_err(|e| {
            ProcessError::failed_with(self.context.prefix_message("failed to wait for process"), e)
        })?;

        let (exit_status, killed_by) = match status.code() {
            Some(code) => (code, None),
            None => signal_exit(&status),
        };

        ExitedProcess::new(
            self.context.clone(),
            exit_status,
            stdout_bytes,
            stderr_text,
            killed_by,
        )
        .into_result(fail_if_non_zero)
    }
}

impl Drop for LocalProcess {
    fn drop(&mut self) {
        // A handle dropped before its result was retrieved takes the child
        // with it.
        if let Some(child) = self.child.as_mut() {
            let _ = child.kill();
        }
    }
}

#[cfg(unix)]
fn signal_exit(status: &std::process::ExitStatus) -> (i32, Option<String>) {
    use std::os::unix::process::ExitStatusExt;

    match status.signal() {
        Some(signo) => {
            let name = nix::sys::signal::Signal::try_from(signo)
                .map(|signal| signal.as_str().to_string())
                .unwrap_or_else(|_| format!("signal {signo}"));
            (128 + signo, Some(name))
        }
        None => (-1, None),
    }
}

#[cfg(not(unix))]
fn signal_exit(_status: &std::process::ExitStatus) -> (i32, Option<String>) {
    (-1, Some("unknown".to_string()))
}
