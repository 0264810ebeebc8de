//! Binary entry point: parse configuration, set up logging, and run the
//! relay until an interactive interrupt requests a clean shutdown.

use std::sync::mpsc;

use clap::Parser;
use log::{error, info, warn};

use eventrelay::config::CliArgs;
use eventrelay::{logging, Service};

fn main() {
  std::process::exit(match run() {
    Ok(()) => 0,
    Err(e) => {
      error!("fatal: {e}");
      1
    }
  });
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
  let args = CliArgs::parse();
  let config = args.resolve()?;
  logging::configure_logging(config.log_level);
  info!("starting with config: {config:?}");

  let mut service = Service::start(&config)?;

  let (interrupt_tx, interrupt_rx) = mpsc::channel();
  ctrlc::set_handler(move || {
    let _ = interrupt_tx.send(());
  })?;

  // Run until Ctrl-C, mirroring the reference launcher's "sleep in a loop,
  // stop on KeyboardInterrupt" shape.
  interrupt_rx.recv().expect("interrupt channel closed unexpectedly");
  warn!("user-requested exit");
  service.stop();
  Ok(())
}
