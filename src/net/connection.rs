//! Per-socket line framing and write buffering.
//!
//! Both directions are kept deliberately simple: a `Vec<u8>` accumulator
//! for partial reads, and a `Vec<u8>` queue for unsent writes. Neither
//! buffer is bounded; this relay does not back-pressure the event source
//! or clients.

/// Splits `buf` on `\n`, stripping an optional trailing `\r` from each
/// line, and returns the complete lines found plus whatever partial data
/// should be carried into the next read.
///
/// This is shared by the event-source and client read paths; the two
/// differ only in how many of the returned lines they consume.
pub fn split_lines(buf: &[u8]) -> (Vec<String>, Vec<u8>) {
  let mut lines = Vec::new();
  let mut start = 0;
  for (i, &b) in buf.iter().enumerate() {
    if b == b'\n' {
      let mut end = i;
      if end > start && buf[end - 1] == b'\r' {
        end -= 1;
      }
      lines.push(String::from_utf8_lossy(&buf[start..end]).into_owned());
      start = i + 1;
    }
  }
  (lines, buf[start..].to_vec())
}

/// The event-source connection: a single read accumulator, no write side
/// (the event source is never sent anything).
pub struct EventSourceConnection {
  pub partial: Vec<u8>,
}

impl EventSourceConnection {
  pub fn new() -> Self {
    EventSourceConnection { partial: Vec::new() }
  }

  /// Folds newly-read `data` into the carried-over partial line and
  /// returns every complete line found; the new partial remainder is
  /// stored back on `self` (fixing the original source's latent bug of
  /// only updating a local variable).
  pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
    self.partial.extend_from_slice(data);
    let (lines, rest) = split_lines(&self.partial);
    self.partial = rest;
    lines
  }
}

impl Default for EventSourceConnection {
  fn default() -> Self {
    Self::new()
  }
}

/// A connected client socket: read accumulator until the user-id line
/// arrives, then a write-only output buffer.
pub struct ClientConnection {
  pub user_id: Option<String>,
  pub read_open: bool,
  /// Set once a write to this socket has failed. The connection (and its
  /// graph registration) otherwise persists; it just stops accepting and
  /// attempting further writes, per the "degraded but silent" contract.
  pub write_closed: bool,
  partial: Vec<u8>,
  pub write_buf: Vec<u8>,
}

impl ClientConnection {
  pub fn new() -> Self {
    ClientConnection {
      user_id: None,
      read_open: true,
      write_closed: false,
      partial: Vec::new(),
      write_buf: Vec::new(),
    }
  }

  /// Folds newly-read `data` into the accumulator and returns the
  /// client's user-id the moment the first complete line appears. Once
  /// returned, the caller should stop reading from this socket; further
  /// calls are not expected.
  pub fn feed(&mut self, data: &[u8]) -> Option<String> {
    self.partial.extend_from_slice(data);
    if let Some(pos) = self.partial.iter().position(|&b| b == b'\n') {
      let mut end = pos;
      if end > 0 && self.partial[end - 1] == b'\r' {
        end -= 1;
      }
      let id = String::from_utf8_lossy(&self.partial[..end]).into_owned();
      self.partial.clear();
      Some(id)
    } else {
      None
    }
  }

  /// Appends `payload` + CRLF to the write buffer. A no-op once a prior
  /// write has errored; the output is discarded silently from then on.
  pub fn queue_write(&mut self, payload: &str) {
    if self.write_closed {
      return;
    }
    self.write_buf.extend_from_slice(payload.as_bytes());
    self.write_buf.extend_from_slice(b"\r\n");
  }

  pub fn has_pending_write(&self) -> bool {
    !self.write_buf.is_empty()
  }
}

impl Default for ClientConnection {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn splits_multiple_complete_lines_and_keeps_partial() {
    let (lines, rest) = split_lines(b"1|B\n2|B\n3|P|a");
    assert_eq!(lines, vec!["1|B".to_string(), "2|B".to_string()]);
    assert_eq!(rest, b"3|P|a");
  }

  #[test]
  fn strips_trailing_cr() {
    let (lines, _) = split_lines(b"1|B\r\n");
    assert_eq!(lines, vec!["1|B".to_string()]);
  }

  #[test]
  fn event_source_carries_partial_line_across_reads() {
    let mut conn = EventSourceConnection::new();
    assert_eq!(conn.feed(b"1|B\n2|P|a"), vec!["1|B".to_string()]);
    let lines = conn.feed(b"|b\n");
    assert_eq!(lines, vec!["2|P|a|b".to_string()]);
  }

  #[test]
  fn client_connection_persists_partial_first_line() {
    let mut conn = ClientConnection::new();
    assert_eq!(conn.feed(b"al"), None);
    assert_eq!(conn.feed(b"ice\n"), Some("alice".to_string()));
  }

  #[test]
  fn queue_write_appends_crlf() {
    let mut conn = ClientConnection::new();
    conn.queue_write("1|B");
    assert_eq!(conn.write_buf, b"1|B\r\n");
  }

  #[test]
  fn queue_write_is_silently_dropped_once_write_closed() {
    let mut conn = ClientConnection::new();
    conn.write_closed = true;
    conn.queue_write("1|B");
    assert!(conn.write_buf.is_empty());
  }
}
