//! The prometheus-pusher service.
//!
//! This crate contains the [`run`] function which starts the pusher. It scrapes every configured
//! resource periodically, routes the samples of each scrape to their destinations and pushes them
//! in batches to a Pushgateway.
//!
//! # Path of a Sample through the Pusher
//!
//! 1. The [`Scheduler`] starts one cycle per resource on every tick of the push interval.
//! 2. Each [`Resource`] scrapes its exporter through the shared [`HttpClient`].
//! 3. On the blocking pool, the payload is optionally relabeled, scanned, and every sample is
//!    rendered and routed with the resource's route map. Rendered samples are collected into one
//!    bucket per destination.
//! 4. Destinations are pushed concurrently. The batches of one destination are pushed in order.
//!    Failed batches are logged and written to the diagnostic dump file.
//!
//! Route maps are reloaded on `SIGHUP`. `SIGINT`, `SIGQUIT` and `SIGTERM` stop the scheduler
//! after the running cycle has completed.
#![warn(missing_docs)]

mod dump;
#[allow(missing_docs)]
mod http;
mod resource;
mod scheduler;
#[allow(missing_docs)]
mod statsd;

use std::io;
use std::sync::Arc;

use pusher_config::{Config, ConfigError};
use pusher_system::Controller;

pub use self::http::{HttpClient, HttpError};
pub use self::resource::{CycleContext, CycleReport, Resource};
pub use self::scheduler::{Scheduler, SchedulerState};

/// Indicates the type of failure of the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The configuration is invalid, or a route map could not be loaded.
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    /// The HTTP client could not be created.
    #[error("could not create http client")]
    Http(#[from] HttpError),

    /// The runtime could not be started.
    #[error("could not start the runtime")]
    Io(#[from] io::Error),
}

/// Runs the pusher until a shutdown signal is received.
///
/// Configuration errors are returned before the first scrape.
pub fn run(config: Config) -> Result<(), ServerError> {
    let config = Arc::new(config);
    let scheduler = Scheduler::new(Arc::clone(&config))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("pusher-worker")
        .enable_all()
        .build()?;

    let controller = Controller::new(config.shutdown_timeout());
    let shutdown = runtime.block_on(async {
        controller.start();
        scheduler
            .run(controller.shutdown_handle(), controller.reload_handle())
            .await;
        controller.shutdown_handle().get()
    });

    // Remaining async tasks are dropped; blocking tasks get the graceful timeout, if any.
    let timeout = shutdown.and_then(|s| s.timeout).unwrap_or_default();
    runtime.shutdown_timeout(timeout);

    pusher_log::info!("pusher stopped");
    Ok(())
}
