//! Task state machine and the handles returned to submitters.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::watch;

use ofsocial_state::PostId;

/// Lifecycle of one comment task.
///
/// `Scheduled → Running → {Completed, Failed}`. A task aborted before it
/// finishes ends `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

/// Snapshot of dispatcher task counters.
///
/// `scheduled` and `running` are current gauges; `completed` and `failed`
/// count since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub scheduled: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Default)]
pub(crate) struct StatsCounters {
    scheduled: AtomicU64,
    running: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl StatsCounters {
    fn counter(&self, state: TaskState) -> &AtomicU64 {
        match state {
            TaskState::Scheduled => &self.scheduled,
            TaskState::Running => &self.running,
            TaskState::Completed => &self.completed,
            TaskState::Failed => &self.failed,
        }
    }

    fn enter(&self, state: TaskState) {
        self.counter(state).fetch_add(1, Ordering::Relaxed);
    }

    fn leave(&self, state: TaskState) {
        // Terminal counters are cumulative.
        if !state.is_terminal() {
            self.counter(state).fetch_sub(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> DispatcherStats {
        DispatcherStats {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            running: self.running.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Owned by the running task; publishes every state change.
///
/// If the task is dropped before reaching a terminal state (abort or panic)
/// the drop moves it to `Failed`.
pub(crate) struct TaskProgress {
    tx: watch::Sender<TaskState>,
    stats: Arc<StatsCounters>,
}

impl TaskProgress {
    pub(crate) fn new(stats: Arc<StatsCounters>) -> (Self, watch::Receiver<TaskState>) {
        let (tx, rx) = watch::channel(TaskState::Scheduled);
        stats.enter(TaskState::Scheduled);
        (Self { tx, stats }, rx)
    }

    pub(crate) fn transition(&self, next: TaskState) {
        let prev = self.tx.send_replace(next);
        if prev == next {
            return;
        }
        self.stats.leave(prev);
        self.stats.enter(next);
    }
}

impl Drop for TaskProgress {
    fn drop(&mut self) {
        let current = *self.tx.borrow();
        if !current.is_terminal() {
            self.transition(TaskState::Failed);
        }
    }
}

/// Reference to one scheduled comment task.
///
/// Submitters are not required to wait on it.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub task_id: u64,
    pub post_id: PostId,
    pub persona: String,
    pub resource_index: usize,
    state: watch::Receiver<TaskState>,
}

impl TaskHandle {
    pub(crate) fn new(
        task_id: u64,
        post_id: PostId,
        persona: String,
        resource_index: usize,
        state: watch::Receiver<TaskState>,
    ) -> Self {
        Self {
            task_id,
            post_id,
            persona,
            resource_index,
            state,
        }
    }

    /// Current state of the task.
    pub fn state(&self) -> TaskState {
        *self.state.borrow()
    }

    /// Wait until the task reaches a terminal state and return it.
    pub async fn wait(&self) -> TaskState {
        let mut rx = self.state.clone();
        let waited = rx.wait_for(|state| state.is_terminal()).await.map(|state| *state);
        match waited {
            Ok(state) => state,
            // The sender publishes a terminal state before it is dropped.
            Err(_) => *rx.borrow(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!TaskState::Scheduled.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
    }

    #[test]
    fn transitions_move_gauges() {
        let stats = Arc::new(StatsCounters::default());
        let (progress, rx) = TaskProgress::new(stats.clone());
        assert_eq!(*rx.borrow(), TaskState::Scheduled);
        assert_eq!(stats.snapshot().scheduled, 1);

        progress.transition(TaskState::Running);
        assert_eq!(
            stats.snapshot(),
            DispatcherStats {
                scheduled: 0,
                running: 1,
                completed: 0,
                failed: 0
            }
        );

        progress.transition(TaskState::Completed);
        drop(progress);
        assert_eq!(
            stats.snapshot(),
            DispatcherStats {
                scheduled: 0,
                running: 0,
                completed: 1,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn dropped_progress_fails_the_task() {
        let stats = Arc::new(StatsCounters::default());
        let (progress, rx) = TaskProgress::new(stats.clone());
        let handle = TaskHandle::new(1, 7, "Charlie".to_string(), 0, rx);
        progress.transition(TaskState::Running);
        drop(progress);

        assert_eq!(handle.wait().await, TaskState::Failed);
        assert_eq!(handle.state(), TaskState::Failed);
        assert_eq!(stats.snapshot().running, 0);
        assert_eq!(stats.snapshot().failed, 1);
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TaskState::Completed).unwrap(),
            "\"completed\""
        );
    }
}
