//! Logging setup: prefer a `log4rs` YAML config file, falling back to a
//! `ConsoleAppender` at a level derived from configuration if none is
//! found.

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};

const CONFIG_FILE: &str = "eventrelay-logging.yaml";

/// Maps the configuration's integer `log_level` (0=Off .. 5=Trace) onto
/// `log::LevelFilter`.
pub fn level_filter(log_level: u8) -> LevelFilter {
  match log_level {
    0 => LevelFilter::Off,
    1 => LevelFilter::Error,
    2 => LevelFilter::Warn,
    3 => LevelFilter::Info,
    4 => LevelFilter::Debug,
    _ => LevelFilter::Trace,
  }
}

/// Initializes the global logger. Call exactly once, at process startup.
pub fn configure_logging(log_level: u8) {
  let level = level_filter(log_level);
  log4rs::init_file(CONFIG_FILE, log4rs::config::Deserializers::default()).unwrap_or_else(|e| {
    match e.downcast_ref::<std::io::Error>() {
      Some(os_err) if os_err.kind() == std::io::ErrorKind::NotFound => {
        let stdout = ConsoleAppender::builder().build();
        let conf = LogConfig::builder()
          .appender(Appender::builder().build("stdout", Box::new(stdout)))
          .build(Root::builder().appender("stdout").build(level))
          .expect("building fallback console logging config");
        log4rs::init_config(conf).expect("installing fallback console logger");
      }
      other => panic!("logging config problem: {other:?}"),
    }
  });
}
