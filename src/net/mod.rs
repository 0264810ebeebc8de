//! Non-blocking socket multiplexing: listeners, line framing, and the
//! shutdown wakeup channel.

pub mod connection;
pub mod server;
pub mod wakeup;

pub use server::{IoServer, ShutdownHandle};
