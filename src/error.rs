//! Error types for the relay's distinct failure domains.
//!
//! Each concern gets its own `thiserror` enum rather than one catch-all:
//! parse errors are recoverable (drop the event source connection and keep
//! going), config errors are fatal at startup, and I/O server errors are
//! fatal only for the handful of setup calls that can realistically fail.

use thiserror::Error;

/// Why an event-source line was rejected.
///
/// Carries the offending line so the caller can log it without having to
/// thread the original string through separately.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventParseError {
  #[error("event line has fewer than 2 tokens: '{0}'")]
  TooFewTokens(String),

  #[error("sequence number is not a valid integer in: '{0}'")]
  BadSequenceNumber(String),

  #[error("unknown command code in: '{0}'")]
  UnknownCode(String),

  #[error("wrong token count for command code in: '{0}'")]
  WrongTokenCount(String),

  #[error("empty user-id token in: '{0}'")]
  EmptyUserId(String),
}

/// Failures while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("reading config file '{path}': {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("parsing config file '{path}': {source}")]
  Parse {
    path: String,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid value for '{field}': {reason}")]
  InvalidValue { field: &'static str, reason: String },
}

/// Fatal startup failures in the I/O server (bind/listen, shutdown socket
/// creation). Steady-state per-connection errors never produce this type;
/// they are logged and the connection involved is dropped.
#[derive(Debug, Error)]
pub enum IoServerError {
  #[error("binding event-source listener on port {port}: {source}")]
  EventListenerBind {
    port: u16,
    #[source]
    source: std::io::Error,
  },

  #[error("binding client listener on port {port}: {source}")]
  ClientListenerBind {
    port: u16,
    #[source]
    source: std::io::Error,
  },

  #[error("creating shutdown socket pair: {source}")]
  ShutdownSocket {
    #[source]
    source: std::io::Error,
  },

  #[error("registering socket with poll: {source}")]
  Register {
    #[source]
    source: std::io::Error,
  },
}
