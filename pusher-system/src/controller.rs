use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

/// Shutdown request broadcast by the [`Controller`] to all subscribed tasks.
///
/// A task has to ensure that it doesn't take longer than `timeout` to finish. Ideally, open work
/// is finished in an orderly manner but no new work is started anymore.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Shutdown {
    /// The timeout for this shutdown. `None` indicates an immediate forced shutdown.
    pub timeout: Option<Duration>,
}

/// Notifies a task about an upcoming process shutdown.
///
/// Obtained from [`Controller::shutdown_handle`].
#[derive(Clone, Debug)]
pub struct ShutdownHandle(watch::Receiver<Option<Shutdown>>);

impl ShutdownHandle {
    /// Returns the pending shutdown, if one has been requested.
    pub fn get(&self) -> Option<Shutdown> {
        self.0.borrow().clone()
    }

    /// Waits for the shutdown signal.
    ///
    /// Resolves immediately if a shutdown has already been requested. If the controller has been
    /// dropped without ever requesting a shutdown, this never resolves.
    pub async fn notified(&mut self) -> Shutdown {
        loop {
            if let Some(shutdown) = self.0.borrow_and_update().clone() {
                return shutdown;
            }

            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Notifies a task that the operator requested a reload of auxiliary files.
///
/// A reload requested while nobody waits is kept and delivered to the next waiter.
#[derive(Clone, Debug)]
pub struct ReloadHandle(Arc<Notify>);

impl ReloadHandle {
    /// Waits for the next reload request.
    pub async fn notified(&self) {
        self.0.notified().await
    }
}

/// Starts and gracefully stops the pusher process.
///
/// The controller listens for process signals once [`started`](Self::start):
///
///  - `SIGINT` and `SIGQUIT` request an immediate shutdown.
///  - `SIGTERM` requests a graceful shutdown with the configured timeout.
///  - `SIGHUP` requests a reload of route map files.
///
/// ### Example
///
/// ```
/// use std::time::Duration;
/// use pusher_system::Controller;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let controller = Controller::new(Duration::from_secs(10));
/// let mut shutdown = controller.shutdown_handle();
///
/// controller.shutdown(None);
/// assert_eq!(shutdown.notified().await.timeout, None);
/// # }
/// ```
#[derive(Debug)]
pub struct Controller {
    /// Configured timeout for graceful shutdowns.
    timeout: Duration,
    shutdown: watch::Sender<Option<Shutdown>>,
    reload: Arc<Notify>,
}

impl Controller {
    /// Creates a new controller with the given graceful shutdown timeout.
    pub fn new(timeout: Duration) -> Self {
        let (shutdown, _) = watch::channel(None);

        Self {
            timeout,
            shutdown,
            reload: Arc::new(Notify::new()),
        }
    }

    /// Returns a handle to wait for the shutdown signal.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.subscribe())
    }

    /// Returns a handle to wait for reload requests.
    pub fn reload_handle(&self) -> ReloadHandle {
        ReloadHandle(Arc::clone(&self.reload))
    }

    /// Broadcasts a shutdown to all handles.
    ///
    /// Later requests do not override the first one.
    pub fn shutdown(&self, timeout: Option<Duration>) {
        self.shutdown.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(Shutdown { timeout });
            true
        });
    }

    /// Requests a reload of auxiliary files.
    pub fn reload(&self) {
        self.reload.notify_one();
    }

    /// Spawns the signal listener on the current runtime.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> JoinHandle<()> {
        let timeout = self.timeout;
        let shutdown = self.shutdown.clone();
        let reload = Arc::clone(&self.reload);

        tokio::spawn(async move {
            let controller = Controller {
                timeout,
                shutdown,
                reload,
            };

            if let Err(error) = controller.listen().await {
                pusher_log::error!(
                    error = &error as &dyn std::error::Error,
                    "failed to install signal handlers"
                );
            }
        })
    }

    #[cfg(unix)]
    async fn listen(&self) -> std::io::Result<()> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigquit = signal(SignalKind::quit())?;
        let mut sighup = signal(SignalKind::hangup())?;

        loop {
            tokio::select! {
                biased;

                _ = sigint.recv() => {
                    pusher_log::info!("SIGINT received, exiting");
                    self.shutdown(None);
                }
                _ = sigquit.recv() => {
                    pusher_log::info!("SIGQUIT received, exiting");
                    self.shutdown(None);
                }
                _ = sigterm.recv() => {
                    pusher_log::info!("SIGTERM received, stopping in {}s", self.timeout.as_secs());
                    self.shutdown(Some(self.timeout));
                }
                _ = sighup.recv() => {
                    pusher_log::info!("SIGHUP received, reloading route maps");
                    self.reload();
                }
            }
        }
    }

    #[cfg(not(unix))]
    async fn listen(&self) -> std::io::Result<()> {
        loop {
            tokio::signal::ctrl_c().await?;
            pusher_log::info!("interrupt received, exiting");
            self.shutdown(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_notifies_all_handles() {
        pusher_log::init_test!();

        let controller = Controller::new(Duration::from_secs(5));
        let mut first = controller.shutdown_handle();
        let mut second = controller.shutdown_handle();
        assert_eq!(first.get(), None);

        controller.shutdown(Some(Duration::from_secs(5)));

        let expected = Shutdown {
            timeout: Some(Duration::from_secs(5)),
        };
        assert_eq!(first.notified().await, expected);
        assert_eq!(second.notified().await, expected);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_shutdown() {
        let controller = Controller::new(Duration::ZERO);
        controller.shutdown(None);

        let mut handle = controller.shutdown_handle();
        assert_eq!(handle.notified().await, Shutdown { timeout: None });
        // Resolves again once a shutdown is pending.
        assert_eq!(handle.notified().await, Shutdown { timeout: None });
    }

    #[tokio::test]
    async fn test_first_shutdown_wins() {
        let controller = Controller::new(Duration::ZERO);
        let handle = controller.shutdown_handle();

        controller.shutdown(Some(Duration::from_secs(3)));
        controller.shutdown(None);

        assert_eq!(handle.get().and_then(|s| s.timeout), Some(Duration::from_secs(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_controller_never_notifies() {
        let controller = Controller::new(Duration::ZERO);
        let mut handle = controller.shutdown_handle();
        drop(controller);

        let result = tokio::time::timeout(Duration::from_secs(60), handle.notified()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_reload_is_kept_until_awaited() {
        let controller = Controller::new(Duration::ZERO);
        let reload = controller.reload_handle();

        controller.reload();
        tokio::time::timeout(Duration::from_secs(1), reload.notified())
            .await
            .unwrap();
    }
}
