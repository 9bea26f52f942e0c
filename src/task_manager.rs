//! Lifecycle tracking for the application's long-running tasks.

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Tracks named background tasks so shutdown can await all of them and
/// report which, if any, panicked.
#[derive(Debug, Default)]
pub struct TaskManager {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `future` on the runtime and tracks its handle under `name`.
    pub fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        self.handles.push((name, tokio::spawn(future)));
    }

    /// Waits for every tracked task to finish.
    pub async fn shutdown(self) {
        info!("Waiting for {} tasks to complete...", self.handles.len());

        let (names, handles): (Vec<_>, Vec<_>) = self.handles.into_iter().unzip();
        let results = join_all(handles).await;

        let mut panicked = 0usize;
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(()) => debug!(task_name = name, "Task shut down gracefully."),
                Err(e) => {
                    panicked += 1;
                    error!(task_name = name, error = ?e, "Task panicked during shutdown.");
                }
            }
        }

        if panicked == 0 {
            info!("All tasks shut down gracefully.");
        }
    }
}
