//! Concrete driver implementations

pub mod channel;
pub mod local;
pub mod stub;

pub use channel::ChannelDriver;
pub use local::LocalDriver;
pub use stub::StubDriver;
