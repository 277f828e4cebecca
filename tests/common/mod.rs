//! Shared test doubles: a scriptable channel transport and a scripted driver.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use command_driver::channel::{Channel, ChannelEvent, ChannelTransport, CloseReason, SpawnRequest};
use command_driver::process::{ExitedProcess, ProcessContext, ProcessHandle, OutputCallback};
use command_driver::storage::{KvStorage, MemoryStore};
use command_driver::{Command, Driver, ProcessError, Result, ServerId};

/// Channel that replays a fixed sequence of events and records what was sent.
pub struct ScriptedChannel {
    events: VecDeque<ChannelEvent>,
    pub sent: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedChannel {
    pub fn new(events: Vec<ChannelEvent>) -> Self {
        Self {
            events: events.into(),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A channel that exits cleanly with the given status and stderr after
    /// emitting the given output chunks.
    pub fn exiting(chunks: Vec<&[u8]>, exit_status: i32, stderr: &str) -> Self {
        let mut events: Vec<ChannelEvent> = chunks
            .into_iter()
            .map(|chunk| ChannelEvent::Data(chunk.to_vec()))
            .collect();
        events.push(ChannelEvent::Closed(CloseReason {
            problem: None,
            exit_status: Some(exit_status),
            signal: None,
            message: stderr.to_string(),
        }));
        Self::new(events)
    }

    /// A channel that fails structurally with the given problem code.
    pub fn failing(problem: &str, message: &str) -> Self {
        Self::new(vec![ChannelEvent::Closed(CloseReason {
            problem: Some(problem.to_string()),
            exit_status: None,
            signal: None,
            message: message.to_string(),
        })])
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.sent.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    async fn end_input(&mut self) -> io::Result<()> {
        Ok(())
    }

    async fn recv(&mut self) -> io::Result<ChannelEvent> {
        self.events
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted"))
    }

    async fn close(&mut self, problem: Option<&str>) -> io::Result<()> {
        if let Some(code) = problem {
            self.events.clear();
            self.events.push_back(ChannelEvent::Closed(CloseReason {
                problem: Some(code.to_string()),
                exit_status: None,
                signal: None,
                message: "closed by caller".to_string(),
            }));
        }
        Ok(())
    }
}

/// Channel that echoes everything written to it, closing with exit 0 once
/// input ends. Models a transparent remote filter like `cat`.
pub struct LoopbackChannel {
    pending: VecDeque<ChannelEvent>,
}

impl LoopbackChannel {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }
}

#[async_trait]
impl Channel for LoopbackChannel {
    async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.pending.push_back(ChannelEvent::Data(data.to_vec()));
        Ok(())
    }

    async fn end_input(&mut self) -> io::Result<()> {
        self.pending.push_back(ChannelEvent::Closed(CloseReason {
            exit_status: Some(0),
            ..CloseReason::default()
        }));
        Ok(())
    }

    async fn recv(&mut self) -> io::Result<ChannelEvent> {
        self.pending
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::WouldBlock, "no pending event"))
    }

    async fn close(&mut self, problem: Option<&str>) -> io::Result<()> {
        match problem {
            Some(code) => {
                self.pending.clear();
                self.pending.push_back(ChannelEvent::Closed(CloseReason {
                    problem: Some(code.to_string()),
                    message: "closed by caller".to_string(),
                    ..CloseReason::default()
                }));
            }
            None => self.end_input().await?,
        }
        Ok(())
    }
}

/// Transport handing out pre-scripted channels in order.
pub struct MockTransport {
    channels: Mutex<VecDeque<Box<dyn Channel>>>,
    pub requests: Mutex<Vec<SpawnRequest>>,
}

impl MockTransport {
    pub fn new(channels: Vec<Box<dyn Channel>>) -> Self {
        Self {
            channels: Mutex::new(channels.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl ChannelTransport for MockTransport {
    async fn open(&self, request: &SpawnRequest) -> io::Result<Box<dyn Channel>> {
        self.requests.lock().unwrap().push(request.clone());
        self.channels
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| io::Error::other("no scripted channel available"))
    }

    fn locator_prefix(&self) -> String {
        "/channel/test-token".to_string()
    }
}

/// Driver that replays scripted `(exit_status, stdout, stderr)` results and
/// records each executed argv. Used to exercise the `Server` façade without
/// touching a real backend.
pub struct ScriptedDriver {
    results: Mutex<VecDeque<(i32, Vec<u8>, String)>>,
    pub calls: Mutex<Vec<Vec<String>>>,
    storage: Arc<MemoryStore>,
}

impl ScriptedDriver {
    pub fn new(results: Vec<(i32, &[u8], &str)>) -> Self {
        Self {
            results: Mutex::new(
                results
                    .into_iter()
                    .map(|(code, stdout, stderr)| (code, stdout.to_vec(), stderr.to_string()))
                    .collect(),
            ),
            calls: Mutex::new(Vec::new()),
            storage: Arc::new(MemoryStore::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Driver for ScriptedDriver {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn spawn_process(&self, server: ServerId, command: Command) -> Box<dyn ProcessHandle> {
        self.calls.lock().unwrap().push(command.argv().to_vec());
        Box::new(ScriptedProcess {
            context: ProcessContext::new(server, command),
            result: self.results.lock().unwrap().pop_front(),
        })
    }

    fn download_command_output_url(
        &self,
        _server: &ServerId,
        _command: &Command,
        _filename: &str,
    ) -> Result<String> {
        Err(ProcessError::failed("not supported by the scripted driver"))
    }

    fn local_storage(&self) -> Arc<dyn KvStorage> {
        self.storage.clone()
    }

    fn session_storage(&self) -> Arc<dyn KvStorage> {
        self.storage.clone()
    }
}

pub struct ScriptedProcess {
    context: ProcessContext,
    result: Option<(i32, Vec<u8>, String)>,
}

#[async_trait]
impl ProcessHandle for ScriptedProcess {
    fn context(&self) -> &ProcessContext {
        &self.context
    }

    async fn execute(&mut self) -> Result<()> {
        Ok(())
    }

    async fn write(&mut self, _data: &[u8], _stream: bool) -> Result<()> {
        Ok(())
    }

    fn stream_binary(&mut self, _callback: OutputCallback) -> Result<()> {
        Ok(())
    }

    async fn terminate(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    async fn wait(&mut self, fail_if_non_zero: bool) -> Result<ExitedProcess> {
        let Some((exit_status, stdout, stderr)) = self.result.take() else {
            return Err(ProcessError::failed("script exhausted"));
        };
        if fail_if_non_zero && exit_status != 0 {
            return Err(ProcessError::NonZeroExit {
                message: self.context.prefix_message(&stderr),
                exit_status,
            });
        }
        Ok(ExitedProcess::new(
            self.context.clone(),
            exit_status,
            stdout,
            stderr,
            None,
        ))
    }
}
