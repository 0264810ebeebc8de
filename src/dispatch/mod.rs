//! The dispatcher: parses event-source lines, applies graph mutations, and
//! fans out notifications to connected clients. Drives the reorder queue
//! on every I/O tick.

use log::{info, warn};

use crate::error::EventParseError;
use crate::graph::{Connection, UserGraph};
use crate::model::event::{Code, Event};
use crate::reorder::{EventHandler, ReorderQueue};

/// Delivers a notification payload to a connected client. Implemented by
/// the I/O server; the dispatcher never touches a socket directly.
pub trait Sender {
  /// Enqueues `payload` (without trailing CRLF; the sender adds it) for
  /// write to `connection`. A `connection` with no live socket behind it
  /// is expected to be unreachable in practice, since the graph only ever
  /// hands back connections it currently has registered.
  fn send(&mut self, connection: Connection, payload: &str);
}

/// Owns the user graph and turns validated events into graph mutations and
/// notifications.
#[derive(Default)]
pub struct Dispatcher {
  graph: UserGraph,
}

impl Dispatcher {
  pub fn new() -> Self {
    Dispatcher::default()
  }

  pub fn graph(&self) -> &UserGraph {
    &self.graph
  }

  pub fn graph_mut(&mut self) -> &mut UserGraph {
    &mut self.graph
  }

  /// Parses `line` and, if well formed, buffers it in `queue` for
  /// reordering. Returns `Err` (and buffers nothing) on a malformed line;
  /// the caller is expected to disconnect the event source in that case.
  pub fn event_received(
    &mut self,
    line: &str,
    queue: &mut ReorderQueue,
  ) -> Result<(), EventParseError> {
    let event = Event::from_str(line)?;
    info!("dispatcher: buffering event '{}'", event.raw);
    queue.add(event);
    Ok(())
  }

  /// Registers `user_id` as connected on `connection`.
  pub fn client_id_received(&mut self, user_id: &str, connection: Connection) {
    info!("dispatcher: client '{user_id}' connected");
    self.graph.register(user_id, connection);
  }

  /// A connected client's socket closed; clear its connection handle.
  pub fn client_disconnected(&mut self, user_id: &str) {
    self.graph.disconnect(user_id);
  }

  /// Drains whatever the reorder queue can now deliver, applying each
  /// event's routing rule via `sender`. Called once per I/O loop tick.
  pub fn on_poll(&mut self, queue: &mut ReorderQueue, sender: &mut impl Sender) {
    let mut ctx = DispatchCtx {
      graph: &mut self.graph,
      sender,
    };
    queue.poll(&mut ctx);
  }
}

/// A short-lived adapter that lets [`ReorderQueue::poll`] deliver directly
/// into the dispatcher's handlers without the queue needing to know about
/// the graph or the sender.
struct DispatchCtx<'a, S> {
  graph: &'a mut UserGraph,
  sender: &'a mut S,
}

impl<S: Sender> EventHandler for DispatchCtx<'_, S> {
  fn on_event(&mut self, event: Event) {
    info!("dispatcher: processing event '{}'", event.raw);
    match event.code {
      Code::Follow => self.follow(&event),
      Code::Unfollow => self.unfollow(&event),
      Code::Broadcast => self.broadcast(&event),
      Code::Private => self.private(&event),
      Code::StatusUpdate => self.status_update(&event),
    }
  }
}

impl<S: Sender> DispatchCtx<'_, S> {
  fn follow(&mut self, event: &Event) {
    let (from, to) = (
      event.from_user.as_deref().expect("Follow always has from"),
      event.to_user.as_deref().expect("Follow always has to"),
    );
    self.graph.add_follower(to, from);
    self.notify(to, &event.raw);
  }

  fn unfollow(&mut self, event: &Event) {
    let (from, to) = (
      event.from_user.as_deref().expect("Unfollow always has from"),
      event.to_user.as_deref().expect("Unfollow always has to"),
    );
    // Unfollow notifications are intentionally suppressed, even to the followee.
    self.graph.remove_follower(to, from);
  }

  fn broadcast(&mut self, event: &Event) {
    let connections: Vec<Connection> = self
      .graph
      .all_users()
      .filter_map(|u| u.connection())
      .collect();
    for connection in connections {
      self.sender.send(connection, &event.raw);
    }
  }

  fn private(&mut self, event: &Event) {
    let to = event.to_user.as_deref().expect("Private always has to");
    self.notify(to, &event.raw);
  }

  fn status_update(&mut self, event: &Event) {
    let from = event.from_user.as_deref().expect("StatusUpdate always has from");
    let connections: Vec<Connection> = self
      .graph
      .followers_of(from)
      .iter()
      .filter_map(|u| u.connection())
      .collect();
    for connection in connections {
      self.sender.send(connection, &event.raw);
    }
  }

  fn notify(&mut self, user_id: &str, payload: &str) {
    if let Some(connection) = self.graph.user(user_id).connection() {
      self.sender.send(connection, payload);
    } else {
      warn!("dispatcher: '{user_id}' has no connection, dropping notification silently");
    }
  }
}
