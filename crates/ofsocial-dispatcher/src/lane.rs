//! Per-resource queues that fix a task's place at submission time.
//!
//! Tasks are spawned onto a work-stealing runtime, so the order in which
//! they first run says nothing about the order they were submitted in. Each
//! resource keeps a chain of turns instead: a task waits until the task
//! submitted before it on the same resource has taken the resource, then
//! takes it and lets the next one go.

use tokio::sync::oneshot;

/// A task's place in its resource's queue.
pub(crate) struct Turn {
    previous: Option<oneshot::Receiver<()>>,
    next: oneshot::Sender<()>,
}

impl Turn {
    /// Wait for the task ahead on the same resource to pass its turn.
    ///
    /// A predecessor that was dropped (finished or aborted) counts as passed.
    pub(crate) async fn wait(&mut self) {
        if let Some(previous) = self.previous.take() {
            let _ = previous.await;
        }
    }

    /// Let the next task on the same resource go.
    pub(crate) fn pass(self) {
        let _ = self.next.send(());
    }
}

/// One queue tail per resource.
pub(crate) struct Lanes {
    tails: Vec<Option<oneshot::Receiver<()>>>,
}

impl Lanes {
    pub(crate) fn new(resource_count: usize) -> Self {
        Self {
            tails: (0..resource_count).map(|_| None).collect(),
        }
    }

    /// Append a task to the queue of `resource_index`.
    pub(crate) fn enqueue(&mut self, resource_index: usize) -> Turn {
        let (next, tail) = oneshot::channel();
        let previous = match self.tails.get_mut(resource_index) {
            Some(slot) => slot.replace(tail),
            None => None,
        };
        Turn { previous, next }
    }
}
