//! The non-blocking, single-threaded I/O server: a `mio` event loop that
//! multiplexes the event-source listener, the client listener, every
//! accepted socket, and the shutdown wakeup channel.

use std::collections::HashMap;
use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, error, info, warn};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};

use crate::dispatch::{Dispatcher, Sender};
use crate::error::IoServerError;
use crate::graph::Connection;
use crate::net::connection::{ClientConnection, EventSourceConnection};
use crate::net::wakeup::{shutdown_channel, ShutdownReceiver, ShutdownSender};
use crate::reorder::ReorderQueue;

const EVENT_LISTENER: Token = Token(0);
const CLIENT_LISTENER: Token = Token(1);
const SHUTDOWN: Token = Token(2);
const EVENT_SOURCE: Token = Token(3);
const FIRST_CLIENT_TOKEN: usize = 4;

const READ_CHUNK: usize = 4096;

/// Owns every socket plus the reordering and dispatch subsystems that sit
/// behind them. One loop thread; no locks.
pub struct IoServer {
  poll: Poll,
  events: Events,
  event_listener: TcpListener,
  client_listener: TcpListener,
  shutdown: ShutdownReceiver,
  event_source: Option<(TcpStream, EventSourceConnection)>,
  clients: HashMap<Token, (TcpStream, ClientConnection)>,
  next_token: usize,
  dispatcher: Dispatcher,
  queue: ReorderQueue,
  should_stop: bool,
}

/// The handle returned to the thread that started the server: the only
/// way the caller can ask the loop to stop.
pub struct ShutdownHandle {
  sender: ShutdownSender,
}

impl ShutdownHandle {
  pub fn stop(&mut self) -> io::Result<()> {
    info!("io server: requesting polling loop to stop");
    self.sender.signal()
  }
}

impl IoServer {
  pub fn bind(
    event_port: u16,
    client_port: u16,
    max_capacity: Option<usize>,
    timeout: Option<Duration>,
  ) -> Result<(Self, ShutdownHandle), IoServerError> {
    let poll = Poll::new().map_err(|source| IoServerError::Register { source })?;

    let event_addr: SocketAddr = ([0, 0, 0, 0], event_port).into();
    let mut event_listener =
      TcpListener::bind(event_addr).map_err(|source| IoServerError::EventListenerBind {
        port: event_port,
        source,
      })?;

    let client_addr: SocketAddr = ([0, 0, 0, 0], client_port).into();
    let mut client_listener =
      TcpListener::bind(client_addr).map_err(|source| IoServerError::ClientListenerBind {
        port: client_port,
        source,
      })?;

    let (mut shutdown, sender) =
      shutdown_channel().map_err(|source| IoServerError::ShutdownSocket { source })?;

    poll
      .registry()
      .register(&mut event_listener, EVENT_LISTENER, Interest::READABLE)
      .map_err(|source| IoServerError::Register { source })?;
    poll
      .registry()
      .register(&mut client_listener, CLIENT_LISTENER, Interest::READABLE)
      .map_err(|source| IoServerError::Register { source })?;
    poll
      .registry()
      .register(&mut shutdown.stream, SHUTDOWN, Interest::READABLE)
      .map_err(|source| IoServerError::Register { source })?;

    info!("io server: event listener on port {event_port}, client listener on port {client_port}");

    let server = IoServer {
      poll,
      events: Events::with_capacity(1024),
      event_listener,
      client_listener,
      shutdown,
      event_source: None,
      clients: HashMap::new(),
      next_token: FIRST_CLIENT_TOKEN,
      dispatcher: Dispatcher::new(),
      queue: ReorderQueue::new(max_capacity, timeout),
      should_stop: false,
    };
    Ok((server, ShutdownHandle { sender }))
  }

  pub fn dispatcher(&self) -> &Dispatcher {
    &self.dispatcher
  }

  /// Runs the poll loop until a shutdown signal is observed, then closes
  /// every socket. Blocks the calling thread; callers run this on a
  /// dedicated loop thread.
  pub fn run(&mut self) {
    while !self.should_stop {
      self.tick();
    }
    self.cleanup();
  }

  /// One readiness wait plus everything it unblocks: accepts, reads,
  /// writes, error cleanup, and a final dispatcher poll.
  fn tick(&mut self) {
    if let Err(e) = self.poll.poll(&mut self.events, None) {
      if e.kind() == ErrorKind::Interrupted {
        return;
      }
      error!("io server: poll failed: {e}");
      return;
    }

    // mio's Events buffer borrows `self.poll`'s registry state only by
    // reference; collect tokens/readiness up front so the handlers below
    // can take `&mut self` freely.
    let ready: Vec<(Token, bool, bool, bool)> = self
      .events
      .iter()
      .map(|e| (e.token(), e.is_readable(), e.is_writable(), e.is_error()))
      .collect();

    for &(token, readable, _, _) in &ready {
      if !readable {
        continue;
      }
      match token {
        EVENT_LISTENER => self.accept_event_source(),
        CLIENT_LISTENER => self.accept_client(),
        EVENT_SOURCE => self.read_event_source(),
        SHUTDOWN => {
          info!("io server: shutdown signal observed");
          self.should_stop = true;
          return;
        }
        other => self.read_client(other),
      }
    }

    for &(token, _, writable, _) in &ready {
      if writable && self.clients.contains_key(&token) {
        self.write_client(token);
      }
    }

    for &(token, _, _, error) in &ready {
      if error {
        self.close_errored(token);
      }
    }

    self.drive_dispatch();
  }

  fn accept_event_source(&mut self) {
    if self.event_source.is_some() {
      // Only one concurrent event-source connection is accepted; a second
      // attempt is accepted at the TCP level and immediately dropped so it
      // can't interleave with the live event source.
      match self.event_listener.accept() {
        Ok((stream, _)) => drop(stream),
        Err(e) if e.kind() == ErrorKind::WouldBlock => {}
        Err(e) => warn!("io server: error accepting stray event-source connection: {e}"),
      }
      return;
    }
    match self.event_listener.accept() {
      Ok((mut stream, addr)) => {
        info!("io server: event source connected from {addr}");
        if let Err(e) = self
          .poll
          .registry()
          .register(&mut stream, EVENT_SOURCE, Interest::READABLE)
        {
          warn!("io server: failed to register event source: {e}");
          return;
        }
        self.event_source = Some((stream, EventSourceConnection::new()));
      }
      Err(e) if e.kind() == ErrorKind::WouldBlock => {}
      Err(e) => warn!("io server: error accepting event source: {e}"),
    }
  }

  fn accept_client(&mut self) {
    loop {
      match self.client_listener.accept() {
        Ok((mut stream, addr)) => {
          let token = Token(self.next_token);
          self.next_token += 1;
          debug!("io server: client connected from {addr}, token {token:?}");
          if let Err(e) = self.poll.registry().register(
            &mut stream,
            token,
            Interest::READABLE | Interest::WRITABLE,
          ) {
            warn!("io server: failed to register client socket: {e}");
            continue;
          }
          self.clients.insert(token, (stream, ClientConnection::new()));
        }
        Err(e) if e.kind() == ErrorKind::WouldBlock => break,
        Err(e) => {
          warn!("io server: error accepting client connection: {e}");
          break;
        }
      }
    }
  }

  fn read_event_source(&mut self) {
    let Some((stream, conn)) = self.event_source.as_mut() else {
      return;
    };
    let mut buf = [0u8; READ_CHUNK];
    match stream.read(&mut buf) {
      Ok(0) => self.reset_event_source(),
      Ok(n) => {
        let lines = conn.feed(&buf[..n]);
        for line in lines {
          if let Err(e) = self.dispatcher.event_received(&line, &mut self.queue) {
            warn!("io server: malformed event line, disconnecting event source: {e}");
            self.reset_event_source();
            return;
          }
        }
      }
      Err(e) if e.kind() == ErrorKind::WouldBlock => {}
      Err(e) => {
        warn!("io server: event source read error: {e}");
        self.reset_event_source();
      }
    }
  }

  fn reset_event_source(&mut self) {
    if let Some((mut stream, _)) = self.event_source.take() {
      let _ = self.poll.registry().deregister(&mut stream);
    }
  }

  fn read_client(&mut self, token: Token) {
    let Some((stream, conn)) = self.clients.get_mut(&token) else {
      return;
    };
    if !conn.read_open {
      return;
    }
    let mut buf = [0u8; READ_CHUNK];
    match stream.read(&mut buf) {
      Ok(0) => self.drop_client(token),
      Ok(n) => {
        if let Some(user_id) = conn.feed(&buf[..n]) {
          conn.read_open = false;
          self.dispatcher.client_id_received(&user_id, token);
          conn.user_id = Some(user_id);
          // Half-close the read side: stop polling readability on this
          // socket, but keep it registered for writes.
          if let Err(e) = self
            .poll
            .registry()
            .reregister(stream, token, Interest::WRITABLE)
          {
            warn!("io server: failed to reregister client {token:?}: {e}");
          }
        }
      }
      Err(e) if e.kind() == ErrorKind::WouldBlock => {}
      Err(e) => {
        warn!("io server: client read error on {token:?}: {e}");
        self.drop_client(token);
      }
    }
  }

  fn write_client(&mut self, token: Token) {
    let Some((stream, conn)) = self.clients.get_mut(&token) else {
      return;
    };
    if conn.write_closed || conn.write_buf.is_empty() {
      return;
    }
    match stream.write(&conn.write_buf) {
      Ok(sent) => {
        conn.write_buf.drain(..sent);
      }
      Err(e) if e.kind() == ErrorKind::WouldBlock => {}
      Err(e) => {
        // The connection persists in a degraded, silent state: its
        // buffered output is discarded and no further writes are
        // attempted, but the client stays registered in the graph (its
        // `connection` handle is not cleared) and the socket stays open.
        warn!("io server: write error on client {token:?}, discarding buffered output: {e}");
        conn.write_buf.clear();
        conn.write_closed = true;
      }
    }
  }

  fn close_errored(&mut self, token: Token) {
    match token {
      EVENT_SOURCE => self.reset_event_source(),
      t if self.clients.contains_key(&t) => self.drop_client(t),
      _ => {}
    }
  }

  fn drop_client(&mut self, token: Token) {
    if let Some((mut stream, conn)) = self.clients.remove(&token) {
      let _ = self.poll.registry().deregister(&mut stream);
      if let Some(user_id) = conn.user_id {
        self.dispatcher.client_disconnected(&user_id);
      }
    }
  }

  fn drive_dispatch(&mut self) {
    let mut sender = ClientSender {
      clients: &mut self.clients,
    };
    self.dispatcher.on_poll(&mut self.queue, &mut sender);
  }

  fn cleanup(&mut self) {
    let _ = self.poll.registry().deregister(&mut self.event_listener);
    let _ = self.poll.registry().deregister(&mut self.client_listener);
    let _ = self.poll.registry().deregister(&mut self.shutdown.stream);
    if let Some((mut stream, _)) = self.event_source.take() {
      let _ = self.poll.registry().deregister(&mut stream);
    }
    for (_, (mut stream, _)) in self.clients.drain() {
      let _ = self.poll.registry().deregister(&mut stream);
    }
    info!("io server: polling loop stopped, sockets closed");
  }
}

/// Adapts the client socket table into the dispatcher's [`Sender`]
/// contract. Constructed fresh on every tick so it never outlives the
/// borrow of `clients` it holds.
struct ClientSender<'a> {
  clients: &'a mut HashMap<Token, (TcpStream, ClientConnection)>,
}

impl Sender for ClientSender<'_> {
  fn send(&mut self, connection: Connection, payload: &str) {
    if let Some((_, conn)) = self.clients.get_mut(&connection) {
      conn.queue_write(payload);
    }
    // A connection with no socket behind it is unreachable in practice:
    // the graph only ever returns tokens it currently has registered.
  }
}
