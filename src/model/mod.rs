//! Data model: the parsed, immutable `Event` and its command code.

pub mod event;

pub use event::{Code, Event};
