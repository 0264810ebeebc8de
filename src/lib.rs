//! A sequenced social-graph event relay.
//!
//! Reads an out-of-order stream of `<seq>|<code>|...` lines from a single
//! event-source connection, reorders it into a strictly monotonic
//! sequence via [`reorder::ReorderQueue`], and fans each event out to
//! connected user clients according to its command code via
//! [`dispatch::Dispatcher`] and [`graph::UserGraph`]. All of this runs on
//! one non-blocking `mio` event loop; see [`net::IoServer`].

pub mod config;
pub mod dispatch;
pub mod error;
pub mod graph;
pub mod logging;
pub mod model;
pub mod net;
pub mod reorder;
pub mod service;

pub use config::Config;
pub use service::Service;
