//! Handle on the background loops of a running peer service.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Stops the service's background tasks on [`shutdown`](Self::shutdown)
/// or when dropped.
#[derive(Debug)]
pub struct ServiceHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServiceHandle {
    pub(crate) fn new(shutdown: watch::Sender<bool>, tasks: Vec<JoinHandle<()>>) -> Self {
        Self { shutdown, tasks }
    }

    /// Number of background tasks still running.
    pub fn running(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    /// Signal every loop and wait up to `grace` for each to finish.
    pub async fn shutdown(mut self, grace: Duration) {
        self.shutdown.send_replace(true);
        for task in self.tasks.drain(..) {
            if tokio::time::timeout(grace, task).await.is_err() {
                warn!(?grace, "background task did not stop in time");
            }
        }
        info!("peer service stopped");
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}
