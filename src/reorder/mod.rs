//! The reorder queue: turns an arbitrarily out-of-order stream of `Event`s
//! into a strictly monotonic, gap-free delivery stream, with bounded
//! memory and a liveness guarantee under missing sequence numbers.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use log::warn;

use crate::model::event::Event;

/// Receives events in arrival order via [`ReorderQueue::add`] and is told
/// about every event that can be delivered, in order, by
/// [`ReorderQueue::poll`].
pub trait EventHandler {
  fn on_event(&mut self, event: Event);
}

/// A min-heap keyed on sequence number, with optional capacity and timeout
/// escape hatches that force progress past a dropped sequence number.
///
/// If both escape hatches are unset the queue blocks indefinitely on the
/// first gap, which is the right behavior for tests that feed a known-
/// complete permutation of sequence numbers.
pub struct ReorderQueue {
  heap: BinaryHeap<Reverse<Event>>,
  waiting_for: u64,
  max_capacity: Option<usize>,
  timeout: Option<Duration>,
  last_activity: Option<Instant>,
}

impl ReorderQueue {
  pub fn new(max_capacity: Option<usize>, timeout: Option<Duration>) -> Self {
    ReorderQueue {
      heap: BinaryHeap::new(),
      waiting_for: 1,
      max_capacity,
      timeout,
      last_activity: None,
    }
  }

  /// The sequence number the queue next intends to deliver.
  pub fn waiting_for(&self) -> u64 {
    self.waiting_for
  }

  pub fn len(&self) -> usize {
    self.heap.len()
  }

  pub fn is_empty(&self) -> bool {
    self.heap.is_empty()
  }

  /// Buffers `event` for later delivery. Does not deliver anything itself;
  /// call [`poll`](Self::poll) to drain whatever is now deliverable.
  pub fn add(&mut self, event: Event) {
    self.heap.push(Reverse(event));
  }

  /// Delivers, in ascending sequence-number order, every event currently
  /// buffered whose number equals `waiting_for`, advancing `waiting_for`
  /// by one after each delivery. If the head is waiting on a gap, applies
  /// the capacity/timeout escape hatch when triggered; otherwise stamps
  /// the last-activity time and returns. Idempotent when nothing is
  /// deliverable.
  pub fn poll(&mut self, handler: &mut impl EventHandler) {
    loop {
      let head_seq = match self.heap.peek() {
        Some(Reverse(event)) => event.sequence_num,
        None => return,
      };

      if head_seq == self.waiting_for {
        let Reverse(event) = self.heap.pop().expect("head was just peeked");
        handler.on_event(event);
        self.waiting_for += 1;
        self.last_activity = Some(Instant::now());
        continue;
      }

      if self.capacity_exceeded() || self.timeout_elapsed() {
        warn!(
          "reorder queue skipping ahead from {} to {head_seq} ({} buffered)",
          self.waiting_for,
          self.heap.len()
        );
        self.waiting_for = head_seq;
        continue;
      }

      self.last_activity = Some(Instant::now());
      return;
    }
  }

  fn capacity_exceeded(&self) -> bool {
    matches!(self.max_capacity, Some(cap) if self.heap.len() > cap)
  }

  fn timeout_elapsed(&self) -> bool {
    match (self.timeout, self.last_activity) {
      (Some(timeout), Some(last)) => last.elapsed() > timeout,
      _ => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::event::Code;

  fn event(seq: u64) -> Event {
    Event {
      raw: format!("{seq}|B"),
      sequence_num: seq,
      code: Code::Broadcast,
      from_user: None,
      to_user: None,
    }
  }

  #[derive(Default)]
  struct Recorder {
    delivered: Vec<u64>,
  }

  impl EventHandler for Recorder {
    fn on_event(&mut self, event: Event) {
      self.delivered.push(event.sequence_num);
    }
  }

  #[test]
  fn delivers_in_order_from_a_permutation() {
    let mut q = ReorderQueue::new(None, None);
    let mut rec = Recorder::default();
    for seq in [5, 3, 1, 4, 2] {
      q.add(event(seq));
    }
    q.poll(&mut rec);
    assert_eq!(rec.delivered, vec![1, 2, 3, 4, 5]);
    assert!(q.is_empty());
  }

  #[test]
  fn poll_is_idempotent_on_a_gap() {
    let mut q = ReorderQueue::new(None, None);
    let mut rec = Recorder::default();
    q.add(event(2));
    q.poll(&mut rec);
    q.poll(&mut rec);
    assert!(rec.delivered.is_empty());
    assert_eq!(q.waiting_for(), 1);
  }

  #[test]
  fn waiting_for_is_monotonic_across_interleaved_calls() {
    let mut q = ReorderQueue::new(Some(1), None);
    let mut rec = Recorder::default();
    let mut last = q.waiting_for();
    for seq in [10, 2, 7, 1, 9, 3] {
      q.add(event(seq));
      q.poll(&mut rec);
      assert!(q.waiting_for() >= last);
      last = q.waiting_for();
    }
  }

  #[test]
  fn capacity_escape_hatch_skips_a_permanent_gap() {
    // capacity=3: buffering 2,4,3 exceeds it while the head (2) still
    // doesn't match waiting_for (1), forcing a skip ahead once 5 arrives.
    let mut q = ReorderQueue::new(Some(3), None);
    let mut rec = Recorder::default();
    q.add(event(2));
    q.add(event(4));
    q.add(event(3));
    q.poll(&mut rec);
    assert!(rec.delivered.is_empty());

    q.add(event(5));
    q.poll(&mut rec);
    assert_eq!(rec.delivered, vec![2, 3, 4, 5]);
    assert_eq!(q.waiting_for(), 6);
  }

  #[test]
  fn timeout_escape_hatch_skips_a_permanent_gap() {
    let mut q = ReorderQueue::new(None, Some(Duration::from_millis(20)));
    let mut rec = Recorder::default();
    q.add(event(2));
    q.poll(&mut rec); // arms the timer (waiting, no delivery yet)
    std::thread::sleep(Duration::from_millis(30));
    q.poll(&mut rec);
    assert_eq!(rec.delivered, vec![2]);
    assert_eq!(q.waiting_for(), 3);
  }

  #[test]
  fn blocks_forever_with_no_escape_hatches() {
    let mut q = ReorderQueue::new(None, None);
    let mut rec = Recorder::default();
    q.add(event(2));
    for _ in 0..5 {
      q.poll(&mut rec);
    }
    assert!(rec.delivered.is_empty());
    assert_eq!(q.waiting_for(), 1);
  }
}
