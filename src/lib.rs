//! Process execution abstraction for local and remote hosts
//!
//! This crate lets a management application run external commands against a
//! target host without caring which execution backend is available at
//! runtime: an in-session remote channel, a native child-process launcher,
//! or an inert stub for preview contexts. Callers get one exception-free
//! contract for starting a command, streaming bytes to and from it,
//! awaiting completion, and interpreting why it failed.
//!
//! The pieces:
//!
//! - [`Command`]: immutable description of an invocation.
//! - [`Server`]: an execution target and the factory for process handles.
//! - [`ProcessHandle`]: one in-flight invocation.
//! - [`ExitedProcess`]: immutable snapshot of a finished invocation.
//! - [`Driver`]: the backend, selected once at startup via
//!   [`select_driver`] and injected into every `Server`.
//!
//! ```no_run
//! use command_driver::{select_driver, Command, RuntimeEnv, Server};
//!
//! # async fn example() -> command_driver::Result<()> {
//! let driver = select_driver(RuntimeEnv::detect());
//! let server = Server::local(driver);
//! let exited = server.execute(Command::new(["uname", "-r"]), true).await?;
//! println!("kernel: {}", exited.get_stdout().trim());
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod command;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod process;
pub mod server;
pub mod storage;

pub use command::{Command, CommandOptions, Elevate};
pub use driver::{select_driver, Driver, RuntimeEnv};
pub use error::{ProcessError, Result};
pub use process::{ExitedProcess, OutputCallback, ProcessContext, ProcessHandle};
pub use server::{Server, ServerId};
pub use storage::KvStorage;
