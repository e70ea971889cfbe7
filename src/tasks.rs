//! In-memory registry of monitoring runs
//!
//! Tracks each run from acceptance to its terminal state. A finished run
//! stays queryable until its status is read once or its retention period
//! passes, whichever comes first. Nothing is persisted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use podwatch_types::{MonitoringTask, TaskStatus};

/// Result of a status query
#[derive(Clone, Debug)]
pub enum TaskLookup {
    Found(MonitoringTask),
    NotFound,
}

/// Thread-safe map from task id to task record
#[derive(Clone)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<Uuid, MonitoringTask>>>,

    /// Lifetime of an unread terminal record
    retention: Duration,
}

impl TaskRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    /// Admit a new task in the `accepted` state
    pub fn accept(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.tasks.write().insert(id, MonitoringTask::new(id));
        id
    }

    pub fn mark_running(&self, id: Uuid) -> bool {
        self.transition(id, TaskStatus::Running, None)
    }

    /// Record a terminal state with its outcome message
    pub fn finish(&self, id: Uuid, status: TaskStatus, message: String) -> bool {
        debug_assert!(status.is_terminal());
        self.transition(id, status, Some(message))
    }

    fn transition(&self, id: Uuid, next: TaskStatus, message: Option<String>) -> bool {
        let mut tasks = self.tasks.write();
        let Some(task) = tasks.get_mut(&id) else {
            warn!(task_id = %id, status = ?next, "Transition for unknown task");
            return false;
        };

        if !task.status.can_transition_to(next) {
            warn!(task_id = %id, from = ?task.status, to = ?next, "Illegal task transition ignored");
            return false;
        }

        let now = Utc::now();
        task.status = next;
        task.updated_at = now;
        if next.is_terminal() {
            task.finished_at = Some(now);
            task.message = message;
        }
        true
    }

    /// Look up a task by id.
    ///
    /// Reading a terminal task acknowledges it and removes the record.
    /// Unknown or malformed ids are `NotFound`.
    pub fn status(&self, id: &str) -> TaskLookup {
        let Ok(id) = Uuid::parse_str(id) else {
            return TaskLookup::NotFound;
        };

        let mut tasks = self.tasks.write();
        let terminal = tasks.get(&id).map(|task| task.status.is_terminal());

        let task = match terminal {
            Some(true) => {
                debug!(task_id = %id, "Terminal task acknowledged");
                tasks.remove(&id)
            }
            Some(false) => tasks.get(&id).cloned(),
            None => None,
        };

        task.map_or(TaskLookup::NotFound, TaskLookup::Found)
    }

    /// Drop terminal records that finished before `now - retention`
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let retention = TimeDelta::from_std(self.retention).unwrap_or(TimeDelta::MAX);
        let mut tasks = self.tasks.write();
        let before = tasks.len();

        tasks.retain(|_, task| match task.finished_at {
            Some(finished_at) => now.signed_duration_since(finished_at) < retention,
            None => true,
        });

        before - tasks.len()
    }

    /// Number of tracked tasks
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    /// Number of tasks not yet terminal
    pub fn in_flight(&self) -> usize {
        self.tasks
            .read()
            .values()
            .filter(|t| !t.status.is_terminal())
            .count()
    }

    /// Periodically purge expired records until `cancel` fires
    pub fn spawn_reaper(&self, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let registry = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let purged = registry.purge_expired(Utc::now());
                        if purged > 0 {
                            debug!(purged, remaining = registry.len(), "Purged expired tasks");
                        }
                    }
                }
            }
        })
    }
}
