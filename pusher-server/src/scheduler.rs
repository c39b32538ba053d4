use std::sync::Arc;
use std::time::Duration;

use pusher_config::Config;
use pusher_log::LogError;
use pusher_statsd::metric;
use pusher_system::{ReloadHandle, ShutdownHandle};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::ServerError;
use crate::resource::{CycleContext, CycleReport, Resource};
use crate::statsd::{PusherCounters, PusherGauges};

/// The lifecycle of a [`Scheduler`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SchedulerState {
    /// Created, but not yet running.
    Idle,
    /// Running cycles on every tick.
    Running,
    /// A shutdown was requested while a cycle was in flight.
    ShuttingDown,
    /// No more cycles will run.
    Stopped,
}

/// Drives periodic cycles of all resources.
///
/// All resources run concurrently, each in its own task. A tick starts only after every cycle of
/// the previous tick has completed, so cycles of one resource never overlap.
#[derive(Debug)]
pub struct Scheduler {
    resources: Vec<Arc<Resource>>,
    context: Arc<CycleContext>,
    interval: Duration,
    state: watch::Sender<SchedulerState>,
}

impl Scheduler {
    /// Creates a scheduler for all configured resources.
    ///
    /// Loads all route maps. Any configuration error is returned before a single scrape.
    pub fn new(config: Arc<Config>) -> Result<Self, ServerError> {
        let resources = config
            .resources()?
            .into_iter()
            .map(|resource| Resource::new(resource).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        if resources.is_empty() {
            pusher_log::warn!("no resources configured");
        }
        metric!(gauge(PusherGauges::Resources) = resources.len() as u64);

        let (state, _) = watch::channel(SchedulerState::Idle);

        Ok(Self {
            interval: config.push_interval(),
            context: Arc::new(CycleContext::new(config)?),
            resources,
            state,
        })
    }

    /// Returns the resources of this scheduler.
    pub fn resources(&self) -> &[Arc<Resource>] {
        &self.resources
    }

    /// Returns a receiver that observes state transitions.
    pub fn state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SchedulerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            pusher_log::debug!(?previous, ?state, "scheduler state changed");
        }
    }

    /// Runs one cycle of every resource concurrently and waits for all of them.
    ///
    /// Reports are returned in the order of the resources.
    pub async fn cycle(&self) -> Vec<CycleReport> {
        let cycles = self.resources.iter().map(|resource| {
            tokio::spawn(Arc::clone(resource).cycle(Arc::clone(&self.context)))
        });

        let mut reports = Vec::with_capacity(self.resources.len());
        for result in futures::future::join_all(cycles).await {
            match result {
                Ok(report) => reports.push(report),
                Err(error) => {
                    pusher_log::error!("resource cycle panicked: {}", LogError(&error));
                }
            }
        }

        reports
    }

    /// Runs a cycle to completion, recording a shutdown requested in the meantime.
    async fn cycle_until_done(&self, shutdown: &mut ShutdownHandle) {
        let cycle = self.cycle();
        tokio::pin!(cycle);

        tokio::select! {
            biased;

            _ = &mut cycle => return,
            _ = shutdown.notified() => {
                pusher_log::info!("shutdown requested, waiting for running cycles");
                self.set_state(SchedulerState::ShuttingDown);
            }
        }

        cycle.await;
    }

    /// Reloads route maps and the HTTP client.
    ///
    /// Resources that fail to reload keep their previous routes.
    pub fn reload(&self) {
        self.context.reload();

        for resource in &self.resources {
            match resource.reload() {
                Ok(()) => {
                    pusher_log::info!(resource = resource.name(), "reloaded routes");
                    metric!(counter(PusherCounters::RoutesReloaded) += 1, success = "true");
                }
                Err(error) => {
                    pusher_log::error!(
                        resource = resource.name(),
                        "could not reload routes, keeping the previous ones: {}",
                        LogError(&error)
                    );
                    metric!(counter(PusherCounters::RoutesReloaded) += 1, success = "false");
                }
            }
        }
    }

    /// Runs cycles until a shutdown is requested.
    ///
    /// The first cycle starts immediately, then one cycle per push interval. A cycle that is in
    /// flight when the shutdown arrives runs to completion.
    pub async fn run(self, mut shutdown: ShutdownHandle, reload: ReloadHandle) {
        self.set_state(SchedulerState::Running);
        pusher_log::info!(
            resources = self.resources.len(),
            interval = ?self.interval,
            "scheduler started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.notified() => break,
                () = reload.notified() => self.reload(),
                _ = ticker.tick() => self.cycle_until_done(&mut shutdown).await,
            }
        }

        self.set_state(SchedulerState::ShuttingDown);
        self.set_state(SchedulerState::Stopped);
        pusher_log::info!("scheduler stopped");
    }
}
