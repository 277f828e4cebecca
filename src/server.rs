//! Server façade: execution-target identity plus process factory

use crate::command::Command;
use crate::driver::Driver;
use crate::error::{ProcessError, Result};
use crate::process::{ExitedProcess, ProcessHandle};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex};

/// Host identity carried by process contexts and results.
///
/// Absence of a host means the local machine (or, for channel execution, the
/// session's own host).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerId {
    host: Option<String>,
}

impl ServerId {
    /// Identity of the local host.
    pub fn local() -> Self {
        Self { host: None }
    }

    /// Identity of a named remote host.
    pub fn remote(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
        }
    }

    /// The remote host name, if any.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Whether this identity names the local host.
    pub fn is_local(&self) -> bool {
        matches!(self.host.as_deref(), None | Some("localhost"))
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.host.as_deref().unwrap_or("localhost"))
    }
}

#[derive(Debug, Default)]
struct HostFacts {
    hostname: Option<String>,
    ip_address: Option<String>,
}

/// An execution target bound to the process-wide driver.
///
/// A `Server` owns no process handles; it only constructs them on demand.
/// Clones share the lazily-populated host-fact cache.
#[derive(Clone)]
pub struct Server {
    driver: Arc<dyn Driver>,
    id: ServerId,
    facts: Arc<Mutex<HostFacts>>,
}

impl Server {
    /// A server for the local host.
    pub fn local(driver: Arc<dyn Driver>) -> Self {
        Self::with_id(driver, ServerId::local())
    }

    /// A server for a named remote host.
    pub fn remote(driver: Arc<dyn Driver>, host: impl Into<String>) -> Self {
        Self::with_id(driver, ServerId::remote(host))
    }

    /// A server for an existing identity.
    pub fn with_id(driver: Arc<dyn Driver>, id: ServerId) -> Self {
        Self {
            driver,
            id,
            facts: Arc::new(Mutex::new(HostFacts::default())),
        }
    }

    /// Build a server for `host` and verify it is reachable before handing
    /// it out.
    pub async fn connect(driver: Arc<dyn Driver>, host: impl Into<String>) -> Result<Self> {
        let server = Self::remote(driver, host);
        server.is_accessible().await?;
        Ok(server)
    }

    /// This server's identity.
    pub fn id(&self) -> &ServerId {
        &self.id
    }

    /// The remote host name, if any.
    pub fn host(&self) -> Option<&str> {
        self.id.host()
    }

    /// The driver this server spawns through.
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Create a process handle for `command`. Unless `defer` is set the
    /// handle is executed before being returned; deferred handles must have
    /// [`ProcessHandle::execute`] called by the caller.
    pub async fn spawn_process(
        &self,
        command: Command,
        defer: bool,
    ) -> Result<Box<dyn ProcessHandle>> {
        let mut handle = self.driver.spawn_process(self.id.clone(), command);
        if !defer {
            handle.execute().await?;
        }
        Ok(handle)
    }

    /// Run `command` to completion. With `fail_if_non_zero`, a non-zero exit
    /// is returned as [`ProcessError::NonZeroExit`] instead of a snapshot.
    pub async fn execute(&self, command: Command, fail_if_non_zero: bool) -> Result<ExitedProcess> {
        let mut handle = self.spawn_process(command, false).await?;
        handle.wait(fail_if_non_zero).await
    }

    /// Whether commands can run on this target at all.
    pub async fn is_accessible(&self) -> Result<()> {
        self.execute(Command::new(["true"]), true).await.map(|_| ())
    }

    /// The target's hostname, cached after the first query. Pass
    /// `cache = false` to force a re-query.
    pub async fn hostname(&self, cache: bool) -> Result<String> {
        if cache {
            if let Some(hostname) = self.lock_facts().hostname.clone() {
                return Ok(hostname);
            }
        }
        let exited = self.execute(Command::new(["hostname"]), true).await?;
        let hostname = exited.get_stdout().trim().to_string();
        self.lock_facts().hostname = Some(hostname.clone());
        Ok(hostname)
    }

    /// The target's outbound IP address, cached after the first query.
    pub async fn ip_address(&self, cache: bool) -> Result<String> {
        static SRC_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"src (?<ip>[^\s]+)").expect("static pattern"));

        if cache {
            if let Some(ip) = self.lock_facts().ip_address.clone() {
                return Ok(ip);
            }
        }
        let exited = self
            .execute(Command::new(["ip", "route", "get", "1.1.1.1"]), true)
            .await?;
        let stdout = exited.get_stdout();
        let ip = SRC_RE
            .captures(&stdout)
            .and_then(|captures| captures.name("ip"))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ProcessError::failed(format!("malformed output from {exited}")))?;
        self.lock_facts().ip_address = Some(ip.clone());
        Ok(ip)
    }

    fn lock_facts(&self) -> std::sync::MutexGuard<'_, HostFacts> {
        self.facts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("id", &self.id)
            .field("driver", &self.driver.name())
            .finish()
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.id.fmt(f)
    }
}
