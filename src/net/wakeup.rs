//! The shutdown wakeup channel.
//!
//! A connected `mio::net::UnixStream` pair gives clean-shutdown signaling
//! without any synchronization primitive: a byte written on one end
//! becomes readable on the other, observed by the very same readiness wait
//! that drives steady-state I/O. No temp directory or filesystem path is
//! needed (see DESIGN.md).

use std::io::{self, Write};

use mio::net::UnixStream;

/// The loop-side half: registered with the poll for readability.
pub struct ShutdownReceiver {
  pub stream: UnixStream,
}

/// The caller-side half: used from `stop()`, possibly on another thread.
pub struct ShutdownSender {
  stream: UnixStream,
}

impl ShutdownSender {
  /// Wakes the loop. No data is exchanged beyond a single byte; its value
  /// is not inspected.
  pub fn signal(&mut self) -> io::Result<()> {
    match self.stream.write_all(&[0u8]) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
      Err(e) => Err(e),
    }
  }
}

/// Creates a connected pair for the shutdown wakeup.
pub fn shutdown_channel() -> io::Result<(ShutdownReceiver, ShutdownSender)> {
  let (a, b) = UnixStream::pair()?;
  Ok((ShutdownReceiver { stream: a }, ShutdownSender { stream: b }))
}
