//! Wires configuration to a running `IoServer` on its own thread: exactly
//! two threads exist once `start` returns — the loop thread, and the
//! caller.

use std::thread::JoinHandle;

use log::info;

use crate::config::Config;
use crate::error::IoServerError;
use crate::net::{IoServer, ShutdownHandle};

/// A running relay. Dropping this without calling [`stop`](Self::stop)
/// leaves the loop thread running; callers that want a clean shutdown
/// must call `stop` explicitly.
pub struct Service {
  shutdown: ShutdownHandle,
  thread: Option<JoinHandle<()>>,
}

impl Service {
  /// Binds both listeners and the shutdown channel, then starts the
  /// polling loop on a dedicated thread.
  pub fn start(config: &Config) -> Result<Service, IoServerError> {
    let (mut server, shutdown) =
      IoServer::bind(config.event_port, config.client_port, config.max_capacity, config.timeout)?;
    let thread = std::thread::Builder::new()
      .name("eventrelay-io".to_owned())
      .spawn(move || server.run())
      .expect("spawning io server thread");
    Ok(Service {
      shutdown,
      thread: Some(thread),
    })
  }

  /// Requests the loop thread stop, then joins it. Idempotent only in
  /// the sense that a second call is a logic error (there is no thread
  /// left to signal); callers should call this at most once.
  pub fn stop(&mut self) {
    info!("service: stopping");
    let _ = self.shutdown.stop();
    if let Some(thread) = self.thread.take() {
      let _ = thread.join();
    }
  }
}

impl Drop for Service {
  fn drop(&mut self) {
    if self.thread.is_some() {
      self.stop();
    }
  }
}
