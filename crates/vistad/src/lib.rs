//! Daemon plumbing shared by the `vistad` binary and the integration tests.

pub mod connection;
pub mod dispatch;
pub mod status;

pub use connection::Connection;
pub use dispatch::PacketDispatcher;
