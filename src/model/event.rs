//! The `Event` type: an immutable, parsed event-source line.

use std::cmp::Ordering;

use crate::error::EventParseError;

/// One of the five routing actions a sequenced event can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
  /// `from` follows `to`.
  Follow,
  /// `from` unfollows `to`.
  Unfollow,
  /// Deliver to every known user.
  Broadcast,
  /// Deliver to `to` only.
  Private,
  /// Deliver to every follower of `from`.
  StatusUpdate,
}

impl Code {
  /// The exact pipe-delimited token count this code requires.
  fn required_tokens(self) -> usize {
    match self {
      Code::Follow | Code::Unfollow | Code::Private => 4,
      Code::Broadcast => 2,
      Code::StatusUpdate => 3,
    }
  }

  fn from_token(token: &str) -> Option<Code> {
    match token {
      "F" => Some(Code::Follow),
      "U" => Some(Code::Unfollow),
      "B" => Some(Code::Broadcast),
      "P" => Some(Code::Private),
      "S" => Some(Code::StatusUpdate),
      _ => None,
    }
  }
}

/// An immutable event parsed from a line received from the event source.
///
/// `raw` is kept byte-for-byte identical to the input line (sans any
/// trailing CR/LF) so it can be re-emitted to clients without
/// re-serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
  pub raw: String,
  pub sequence_num: u64,
  pub code: Code,
  pub from_user: Option<String>,
  pub to_user: Option<String>,
}

impl Event {
  /// Parses `line` into an `Event`, or reports why it was rejected.
  ///
  /// Validates, in order: at least two tokens, token 0 is an integer,
  /// token 1 is a known code, the token count matches that code exactly,
  /// and any user-id tokens the code requires are non-empty.
  pub fn from_str(line: &str) -> Result<Event, EventParseError> {
    let tokens: Vec<&str> = line.split('|').collect();
    if tokens.len() < 2 {
      return Err(EventParseError::TooFewTokens(line.to_owned()));
    }

    let sequence_num: u64 = tokens[0]
      .parse()
      .map_err(|_| EventParseError::BadSequenceNumber(line.to_owned()))?;

    let code =
      Code::from_token(tokens[1]).ok_or_else(|| EventParseError::UnknownCode(line.to_owned()))?;

    if tokens.len() != code.required_tokens() {
      return Err(EventParseError::WrongTokenCount(line.to_owned()));
    }

    for token in &tokens[2..] {
      if token.is_empty() {
        return Err(EventParseError::EmptyUserId(line.to_owned()));
      }
    }

    let from_user = tokens.get(2).map(|s| s.to_string());
    let to_user = tokens.get(3).map(|s| s.to_string());

    Ok(Event {
      raw: line.to_owned(),
      sequence_num,
      code,
      from_user,
      to_user,
    })
  }
}

// Events order by sequence number only, so the reorder queue's heap can use
// `Event` directly as a key.
impl Ord for Event {
  fn cmp(&self, other: &Self) -> Ordering {
    self.sequence_num.cmp(&other.sequence_num)
  }
}

impl PartialOrd for Event {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use test_case::test_case;

  #[test_case("")]
  #[test_case(" \n")]
  #[test_case("abrakadabra")]
  #[test_case("1|abrakadabra")]
  #[test_case("1|B ")]
  #[test_case("2|B|")]
  #[test_case("|3|B")]
  #[test_case("4||B")]
  #[test_case("5|B|1")]
  #[test_case("S|B")]
  #[test_case("7|b")]
  #[test_case("8|Be")]
  #[test_case("9|F||")]
  #[test_case("10|F|1|2|3")]
  #[test_case("11|S|9|10")]
  fn rejects_malformed_lines(line: &str) {
    assert!(Event::from_str(line).is_err(), "expected '{line}' to be rejected");
  }

  #[test]
  fn parses_follow() {
    let e = Event::from_str("1|F|12|21").unwrap();
    assert_eq!(e.sequence_num, 1);
    assert_eq!(e.code, Code::Follow);
    assert_eq!(e.from_user.as_deref(), Some("12"));
    assert_eq!(e.to_user.as_deref(), Some("21"));
    assert_eq!(e.raw, "1|F|12|21");
  }

  #[test]
  fn parses_unfollow() {
    let e = Event::from_str("23|U|1|10").unwrap();
    assert_eq!(e.sequence_num, 23);
    assert_eq!(e.code, Code::Unfollow);
    assert_eq!(e.from_user.as_deref(), Some("1"));
    assert_eq!(e.to_user.as_deref(), Some("10"));
  }

  #[test]
  fn parses_broadcast() {
    let e = Event::from_str("2|B").unwrap();
    assert_eq!(e.sequence_num, 2);
    assert_eq!(e.code, Code::Broadcast);
    assert_eq!(e.from_user, None);
    assert_eq!(e.to_user, None);
  }

  #[test]
  fn parses_private() {
    let e = Event::from_str("34|P|0|1").unwrap();
    assert_eq!(e.sequence_num, 34);
    assert_eq!(e.code, Code::Private);
    assert_eq!(e.from_user.as_deref(), Some("0"));
    assert_eq!(e.to_user.as_deref(), Some("1"));
  }

  #[test]
  fn parses_status_update() {
    let e = Event::from_str("5|S|9").unwrap();
    assert_eq!(e.sequence_num, 5);
    assert_eq!(e.code, Code::StatusUpdate);
    assert_eq!(e.from_user.as_deref(), Some("9"));
    assert_eq!(e.to_user, None);
  }

  #[test]
  fn raw_payload_is_byte_exact() {
    let line = "42|P|alice|bob";
    let e = Event::from_str(line).unwrap();
    assert_eq!(e.raw, line);
  }
}
