//! The `prometheus-pusher` binary.
//!
//! Scrapes local Prometheus exporters periodically, routes every metric by name to one or more
//! destinations and pushes the results in batches to Pushgateways.
//!
//! # Workspace Crates
//!
//! The pusher is split into the following workspace crates:
//!
//!  - `prometheus-pusher`: Main entry point and command line interface.
//!  - [`pusher-config`]: Configuration for the CLI and server.
//!  - [`pusher-log`]: Logging facade and initialization.
//!  - [`pusher-metrics`]: Scanning, routing, multiplexing and splitting of exposition payloads.
//!  - [`pusher-server`]: Scrapes, pushes and the scheduler driving them.
//!  - [`pusher-statsd`]: High-level StatsD metric client for internal measurements.
//!  - [`pusher-system`]: Signal handling and shutdown coordination.
//!
//! [`pusher-config`]: ../pusher_config/index.html
//! [`pusher-log`]: ../pusher_log/index.html
//! [`pusher-metrics`]: ../pusher_metrics/index.html
//! [`pusher-server`]: ../pusher_server/index.html
//! [`pusher-statsd`]: ../pusher_statsd/index.html
//! [`pusher-system`]: ../pusher_system/index.html

mod cli;
mod cliapp;
mod setup;

use std::process;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            pusher_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}
