//! The user graph: a lazily-populated directed follower relation plus
//! per-user connection handles.
//!
//! Follower sets hold user-ids, not record references, so there is no
//! ownership cycle between users that follow each other.

use std::collections::{HashMap, HashSet};

use mio::Token;

/// A connected client's write-side identity: the `mio::Token` its socket is
/// registered under in the I/O server. The graph never looks inside this;
/// it is a capability that the I/O server resolves back into an actual
/// socket and write buffer.
pub type Connection = Token;

/// A user record. Created lazily on first reference by any event or client
/// registration; the existence of a record does not imply connectivity.
#[derive(Debug, Default, Clone)]
pub struct User {
  followers: HashSet<String>,
  connection: Option<Connection>,
}

impl User {
  pub fn followers(&self) -> &HashSet<String> {
    &self.followers
  }

  pub fn connection(&self) -> Option<Connection> {
    self.connection
  }
}

/// The registry of all known users, keyed by user-id string.
#[derive(Debug, Default)]
pub struct UserGraph {
  users: HashMap<String, User>,
}

impl UserGraph {
  pub fn new() -> Self {
    UserGraph::default()
  }

  /// Ensures a record exists for `user_id` and sets its connection, leaving
  /// any existing follower set untouched. Returns the (now-registered)
  /// record.
  pub fn register(&mut self, user_id: &str, connection: Connection) -> &User {
    let user = self.users.entry(user_id.to_owned()).or_default();
    user.connection = Some(connection);
    user
  }

  /// Clears the connection for `user_id`, if the user is known. The
  /// record (and its followers) persists.
  pub fn disconnect(&mut self, user_id: &str) {
    if let Some(user) = self.users.get_mut(user_id) {
      user.connection = None;
    }
  }

  /// Returns the record for `user_id`, creating an empty one on demand.
  pub fn user(&mut self, user_id: &str) -> &User {
    self.users.entry(user_id.to_owned()).or_default()
  }

  /// Returns the records of every user that currently follows `user_id`,
  /// creating the target's record if absent. Follower records themselves
  /// are not created beyond whatever already exists for them.
  pub fn followers_of(&mut self, user_id: &str) -> Vec<&User> {
    let ids: Vec<String> = self
      .users
      .entry(user_id.to_owned())
      .or_default()
      .followers
      .iter()
      .cloned()
      .collect();
    ids.iter().filter_map(|id| self.users.get(id)).collect()
  }

  /// Returns every known user record.
  pub fn all_users(&self) -> impl Iterator<Item = &User> {
    self.users.values()
  }

  /// Adds `follower_id` to `target`'s follower set. Idempotent.
  pub fn add_follower(&mut self, target: &str, follower_id: &str) {
    self
      .users
      .entry(target.to_owned())
      .or_default()
      .followers
      .insert(follower_id.to_owned());
  }

  /// Removes `follower_id` from `target`'s follower set. A no-op if
  /// `follower_id` was not following `target`, or if `target` is unknown.
  pub fn remove_follower(&mut self, target: &str, follower_id: &str) {
    if let Some(user) = self.users.get_mut(target) {
      user.followers.remove(follower_id);
    }
  }
}
