//! End-to-end tests that drive the real `IoServer` over loopback TCP:
//! connect as the event source, connect as clients, and assert on the
//! bytes each client actually receives.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use eventrelay::config::Config;
use eventrelay::Service;

// Tests in this file run in parallel (the default cargo test harness), so
// each gets its own pair of ports to avoid bind collisions.
static NEXT_PORT: AtomicU16 = AtomicU16::new(19100);

fn alloc_ports() -> (u16, u16) {
  let base = NEXT_PORT.fetch_add(2, Ordering::SeqCst);
  (base, base + 1)
}

fn connect_with_retry(addr: (&str, u16)) -> TcpStream {
  let deadline = Instant::now() + Duration::from_secs(2);
  loop {
    match TcpStream::connect(addr) {
      Ok(s) => return s,
      Err(_) if Instant::now() < deadline => std::thread::sleep(Duration::from_millis(10)),
      Err(e) => panic!("could not connect to {addr:?}: {e}"),
    }
  }
}

/// Reads from `stream` until `expected` bytes have been accumulated or a
/// timeout elapses, returning whatever was read.
fn read_with_timeout(stream: &mut TcpStream, expected_min: usize, timeout: Duration) -> Vec<u8> {
  stream.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
  let deadline = Instant::now() + timeout;
  let mut buf = Vec::new();
  let mut chunk = [0u8; 4096];
  while buf.len() < expected_min && Instant::now() < deadline {
    match stream.read(&mut chunk) {
      Ok(0) => break,
      Ok(n) => buf.extend_from_slice(&chunk[..n]),
      Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
      Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
      Err(e) => panic!("read error: {e}"),
    }
  }
  buf
}

#[test]
fn follow_event_is_delivered_to_the_followee() {
  let (event_port, client_port) = alloc_ports();
  let config = Config {
    event_port,
    client_port,
    ..Config::default()
  };
  let mut service = Service::start(&config).expect("service starts");

  let mut me = connect_with_retry(("127.0.0.1", client_port));
  me.write_all(b"me\n").unwrap();

  let mut event_source = connect_with_retry(("127.0.0.1", event_port));
  event_source.write_all(b"1|F|misterx|me\n").unwrap();

  let received = read_with_timeout(&mut me, "1|F|misterx|me\r\n".len(), Duration::from_secs(2));
  assert_eq!(received, b"1|F|misterx|me\r\n");

  service.stop();
}

#[test]
fn broadcast_reaches_every_connected_client() {
  let (event_port, client_port) = alloc_ports();
  let config = Config {
    event_port,
    client_port,
    ..Config::default()
  };
  let mut service = Service::start(&config).expect("service starts");

  let mut a = connect_with_retry(("127.0.0.1", client_port));
  a.write_all(b"alice\n").unwrap();
  let mut b = connect_with_retry(("127.0.0.1", client_port));
  b.write_all(b"bob\n").unwrap();

  let mut event_source = connect_with_retry(("127.0.0.1", event_port));
  event_source.write_all(b"1|B\n").unwrap();

  for stream in [&mut a, &mut b] {
    let received = read_with_timeout(stream, "1|B\r\n".len(), Duration::from_secs(2));
    assert_eq!(received, b"1|B\r\n");
  }

  service.stop();
}

#[test]
fn out_of_order_events_are_delivered_in_sequence() {
  let (event_port, client_port) = alloc_ports();
  let config = Config {
    event_port,
    client_port,
    ..Config::default()
  };
  let mut service = Service::start(&config).expect("service starts");

  let mut me = connect_with_retry(("127.0.0.1", client_port));
  me.write_all(b"me\n").unwrap();

  let mut event_source = connect_with_retry(("127.0.0.1", event_port));
  // Arrives out of order; both are private messages to "me".
  event_source.write_all(b"2|P|a|me\n").unwrap();
  event_source.write_all(b"1|P|b|me\n").unwrap();

  let expected = b"1|P|b|me\r\n2|P|a|me\r\n";
  let received = read_with_timeout(&mut me, expected.len(), Duration::from_secs(2));
  assert_eq!(received, expected);

  service.stop();
}

#[test]
fn malformed_event_line_disconnects_the_event_source() {
  let (event_port, client_port) = alloc_ports();
  let config = Config {
    event_port,
    client_port,
    ..Config::default()
  };
  let mut service = Service::start(&config).expect("service starts");

  let mut event_source = connect_with_retry(("127.0.0.1", event_port));
  event_source.write_all(b"not-an-event\n").unwrap();

  // The server closes its end; our socket should observe EOF shortly.
  event_source.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
  let mut buf = [0u8; 16];
  let n = event_source.read(&mut buf).unwrap_or(0);
  assert_eq!(n, 0, "expected event source to be disconnected after a parse error");

  // A fresh connection is accepted normally afterwards.
  let mut reconnected = connect_with_retry(("127.0.0.1", event_port));
  reconnected.write_all(b"1|B\n").unwrap();

  service.stop();
}

#[test]
fn second_event_source_connection_is_ignored_until_first_closes() {
  let (event_port, client_port) = alloc_ports();
  let config = Config {
    event_port,
    client_port,
    ..Config::default()
  };
  let mut service = Service::start(&config).expect("service starts");

  let _first = connect_with_retry(("127.0.0.1", event_port));
  let mut second = connect_with_retry(("127.0.0.1", event_port));
  // The connection is accepted at the TCP level but immediately dropped
  // by the server; writing to it should not register as a live event
  // source (no crash, no observable effect on a subsequent real client).
  let _ = second.write_all(b"1|B\n");

  let mut me = connect_with_retry(("127.0.0.1", client_port));
  me.write_all(b"me\n").unwrap();

  // Only the first connection's traffic should ever be treated as the
  // event source; nothing should arrive from the stray second write.
  let received = read_with_timeout(&mut me, 1, Duration::from_millis(300));
  assert!(received.is_empty());

  service.stop();
}
