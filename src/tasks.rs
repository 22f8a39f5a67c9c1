use std::{path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use crate::pipeline::DownloadFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Completed,
    Failed,
}

impl DownloadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Statuses only move forward and never leave a terminal state.
    pub fn can_advance_to(&self, next: DownloadStatus) -> bool {
        use DownloadStatus::*;
        matches!(
            (self, next),
            (Queued, Downloading) | (Queued, Failed) | (Downloading, Completed) | (Downloading, Failed)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadTask {
    pub id: Uuid,
    pub title: String,
    pub format: DownloadFormat,
    pub status: DownloadStatus,
    /// In `[0, 1]`, never decreasing
    pub progress: f32,
    pub error: Option<String>,
    pub output: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TaskError {
    #[error("Unknown task {0}")]
    UnknownTask(Uuid),
    #[error("Task cannot go from {from:?} to {to:?}")]
    InvalidTransition {
        from: DownloadStatus,
        to: DownloadStatus,
    },
    #[error("Task {0} is not downloading")]
    NotDownloading(Uuid),
}

pub type Snapshot = Arc<Vec<DownloadTask>>;

/// Registry of download tasks. Every change publishes a fresh snapshot of
/// the whole list, newest task first; published snapshots are never
/// mutated.
#[derive(Clone)]
pub struct TaskRegistry {
    tx: Arc<watch::Sender<Snapshot>>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Snapshot::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    pub fn get(&self, id: Uuid) -> Option<DownloadTask> {
        self.tx.borrow().iter().find(|t| t.id == id).cloned()
    }

    pub fn enqueue(&self, title: &str, format: DownloadFormat) -> DownloadTask {
        let task = DownloadTask {
            id: Uuid::new_v4(),
            title: title.to_string(),
            format,
            status: DownloadStatus::Queued,
            progress: 0.0,
            error: None,
            output: None,
            created_at: Utc::now(),
        };

        self.tx.send_modify(|tasks| {
            let mut next = Vec::with_capacity(tasks.len() + 1);
            next.push(task.clone());
            next.extend(tasks.iter().cloned());
            *tasks = Arc::new(next);
        });

        task
    }

    /// Replace task `id` with the result of `f`. Nothing is published when
    /// `f` fails or returns an identical task.
    fn update<F>(&self, id: Uuid, f: F) -> Result<DownloadTask, TaskError>
    where
        F: FnOnce(&DownloadTask) -> Result<DownloadTask, TaskError>,
    {
        let mut result = Err(TaskError::UnknownTask(id));

        self.tx.send_if_modified(|tasks| {
            let Some(idx) = tasks.iter().position(|t| t.id == id) else {
                return false;
            };
            match f(&tasks[idx]) {
                Ok(updated) if updated == tasks[idx] => {
                    result = Ok(updated);
                    false
                }
                Ok(updated) => {
                    let mut next = Vec::clone(tasks);
                    next[idx] = updated.clone();
                    *tasks = Arc::new(next);
                    result = Ok(updated);
                    true
                }
                Err(e) => {
                    result = Err(e);
                    false
                }
            }
        });

        result
    }

    fn advance(
        task: &DownloadTask,
        to: DownloadStatus,
    ) -> Result<DownloadTask, TaskError> {
        if !task.status.can_advance_to(to) {
            return Err(TaskError::InvalidTransition {
                from: task.status,
                to,
            });
        }
        Ok(DownloadTask {
            status: to,
            ..task.clone()
        })
    }

    pub fn start(&self, id: Uuid) -> Result<DownloadTask, TaskError> {
        self.update(id, |t| Self::advance(t, DownloadStatus::Downloading))
    }

    /// Record progress. Values are clamped to `[0, 1]` and a value lower
    /// than the current one is ignored.
    pub fn progress(&self, id: Uuid, fraction: f32) -> Result<DownloadTask, TaskError> {
        self.update(id, |t| {
            if t.status != DownloadStatus::Downloading {
                return Err(TaskError::NotDownloading(id));
            }
            let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
            Ok(DownloadTask {
                progress: t.progress.max(fraction),
                ..t.clone()
            })
        })
    }

    pub fn complete(&self, id: Uuid, output: PathBuf) -> Result<DownloadTask, TaskError> {
        self.update(id, |t| {
            let mut done = Self::advance(t, DownloadStatus::Completed)?;
            done.progress = 1.0;
            done.output = Some(output);
            Ok(done)
        })
    }

    pub fn fail(&self, id: Uuid, error: impl Into<String>) -> Result<DownloadTask, TaskError> {
        let error = error.into();
        self.update(id, |t| {
            let mut failed = Self::advance(t, DownloadStatus::Failed)?;
            failed.error = Some(error);
            Ok(failed)
        })
    }

    /// Resolves once every known task is completed or failed.
    pub async fn wait_all_terminal(&self) -> Snapshot {
        let mut rx = self.subscribe();
        loop {
            {
                let tasks = rx.borrow_and_update();
                if tasks.iter().all(|t| t.status.is_terminal()) {
                    return tasks.clone();
                }
            }
            if rx.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }
}
