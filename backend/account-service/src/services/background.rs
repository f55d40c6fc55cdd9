/// Detached background work with failures routed to a single reporter
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::metrics::BACKGROUND_TASK_FAILURES_TOTAL;

#[derive(Debug)]
pub struct TaskFailure {
    pub task: &'static str,
    pub error: anyhow::Error,
}

/// Spawns fire-and-forget tasks whose errors are not lost
#[derive(Clone)]
pub struct TaskExecutor {
    failures: mpsc::UnboundedSender<TaskFailure>,
}

pub struct TaskErrorReporter {
    failures: mpsc::UnboundedReceiver<TaskFailure>,
}

impl TaskExecutor {
    pub fn new() -> (Self, TaskErrorReporter) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { failures: tx }, TaskErrorReporter { failures: rx })
    }

    pub fn spawn<F>(&self, task: &'static str, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let failures = self.failures.clone();
        tokio::spawn(async move {
            match fut.await {
                Ok(()) => debug!(task, "Background task finished"),
                Err(error) => {
                    if let Err(mpsc::error::SendError(lost)) =
                        failures.send(TaskFailure { task, error })
                    {
                        // Reporter already gone, log in place
                        warn!(task = lost.task, "Background task failed: {:#}", lost.error);
                        BACKGROUND_TASK_FAILURES_TOTAL
                            .with_label_values(&[lost.task])
                            .inc();
                    }
                }
            }
        })
    }
}

impl TaskErrorReporter {
    /// Drain failures until every executor handle is dropped
    pub async fn run(mut self) {
        while let Some(failure) = self.failures.recv().await {
            warn!(task = failure.task, "Background task failed: {:#}", failure.error);
            BACKGROUND_TASK_FAILURES_TOTAL
                .with_label_values(&[failure.task])
                .inc();
        }
        debug!("Task error reporter stopped");
    }

    #[cfg(test)]
    pub(crate) async fn next_failure(&mut self) -> Option<TaskFailure> {
        self.failures.recv().await
    }
}
