//! Dispatcher: fans comment generation out across personas and resources.
//!
//! Every submission snapshots the persona list, pins persona `i` to resource
//! `i mod R`, and spawns one task per persona. Each task takes its place in
//! its resource's queue before it is spawned, so tasks on one resource take
//! the resource in submission order. A task waits for its turn, then for one
//! of `R * workers_per_resource` worker permits, leases the resource for all
//! of its attempts through the [`GenerationPolicy`], and stores the comment.
//! Callers get [`TaskHandle`]s back immediately and never block on generation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use ofsocial_content::GenerationPolicy;
use ofsocial_core::{Persona, config::DispatcherConfig};
use ofsocial_state::{Post, PostId, StateStore};

use crate::assignment;
use crate::error::{DispatcherError, DispatcherResult};
use crate::lane::{Lanes, Turn};
use crate::task::{DispatcherStats, StatsCounters, TaskHandle, TaskProgress, TaskState};

/// State shared with every spawned task.
struct Shared {
    store: StateStore,
    policy: Arc<GenerationPolicy>,
    permits: Arc<Semaphore>,
    stats: Arc<StatsCounters>,
}

/// Submission-side state, guarded together so queue order matches spawn order.
struct Outstanding {
    /// Taken by `shutdown`.
    tasks: JoinSet<()>,
    lanes: Lanes,
}

/// Bounded worker pool for persona comment generation.
pub struct Dispatcher {
    shared: Arc<Shared>,
    outstanding: Mutex<Outstanding>,
    /// When true, submissions are rejected.
    closed: AtomicBool,
    next_task_id: AtomicU64,
    worker_count: usize,
    search_posts: usize,
}

impl Dispatcher {
    pub fn new(store: StateStore, policy: Arc<GenerationPolicy>, config: &DispatcherConfig) -> Self {
        let worker_count = policy.resource_count() * config.workers_per_resource.max(1);
        info!(
            resources = policy.resource_count(),
            workers = worker_count,
            "dispatcher started"
        );
        let lanes = Lanes::new(policy.resource_count());
        Self {
            shared: Arc::new(Shared {
                store,
                policy,
                permits: Arc::new(Semaphore::new(worker_count)),
                stats: Arc::new(StatsCounters::default()),
            }),
            outstanding: Mutex::new(Outstanding {
                tasks: JoinSet::new(),
                lanes,
            }),
            closed: AtomicBool::new(false),
            next_task_id: AtomicU64::new(1),
            worker_count,
            search_posts: config.search_posts,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn resource_count(&self) -> usize {
        self.shared.policy.resource_count()
    }

    pub fn stats(&self) -> DispatcherStats {
        self.shared.stats.snapshot()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Schedule one comment task per current persona for `post_id`.
    ///
    /// Returns as soon as the tasks are spawned. Personas added or removed
    /// afterwards do not affect this batch.
    pub async fn submit_post_comments(
        &self,
        post_id: PostId,
        post_content: &str,
    ) -> DispatcherResult<Vec<TaskHandle>> {
        let mut outstanding = self.outstanding.lock().await;
        if self.is_closed() {
            return Err(DispatcherError::ShuttingDown);
        }

        // Reap finished tasks so the set only holds outstanding work.
        while outstanding.tasks.try_join_next().is_some() {}

        let personas = self.shared.store.list_personas()?;
        let resources = assignment::assign(personas.len(), self.resource_count());
        let content: Arc<str> = Arc::from(post_content);

        let mut handles = Vec::with_capacity(personas.len());
        for (persona, resource_index) in personas.into_iter().zip(resources) {
            let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
            let (progress, state) = TaskProgress::new(self.shared.stats.clone());
            handles.push(TaskHandle::new(
                task_id,
                post_id,
                persona.name.clone(),
                resource_index,
                state,
            ));
            let turn = outstanding.lanes.enqueue(resource_index);
            outstanding.tasks.spawn(run_comment_task(
                self.shared.clone(),
                progress,
                turn,
                task_id,
                post_id,
                content.clone(),
                persona,
                resource_index,
            ));
        }

        info!(post_id, tasks = handles.len(), "comment generation scheduled");
        Ok(handles)
    }

    /// Generate AI posts for a search query, store them, and fan each out.
    ///
    /// Post `i` is generated on resource `i mod R` and authored `AI Bot {i+1}`.
    /// Returns the stored posts in generation order.
    pub async fn publish_search_posts(&self, query: &str) -> DispatcherResult<Vec<Post>> {
        if self.is_closed() {
            return Err(DispatcherError::ShuttingDown);
        }

        let resources = assignment::assign(self.search_posts, self.resource_count());
        let mut generation = JoinSet::new();
        for (ordinal, resource_index) in resources.into_iter().enumerate() {
            let policy = self.shared.policy.clone();
            let query = query.to_string();
            generation.spawn(async move {
                let content = policy.generate_post(&query, resource_index).await;
                (ordinal, content)
            });
        }

        let mut generated: Vec<(usize, String)> = Vec::with_capacity(self.search_posts);
        while let Some(joined) = generation.join_next().await {
            match joined {
                Ok(item) => generated.push(item),
                Err(e) => warn!(error = %e, "search post generation task failed"),
            }
        }
        generated.sort_by_key(|(ordinal, _)| *ordinal);

        // Nothing is stored for a search that outlived the dispatcher.
        if self.is_closed() {
            info!(query, "dispatcher shut down during search, discarding generated posts");
            return Err(DispatcherError::ShuttingDown);
        }

        let mut posts = Vec::with_capacity(generated.len());
        for (ordinal, content) in generated {
            let author = format!("AI Bot {}", ordinal + 1);
            let post_id = self.shared.store.add_post(&content, &author, true)?;
            let post = self
                .shared
                .store
                .get_post(post_id)?
                .ok_or(ofsocial_state::StateError::PostNotFound(post_id))?;
            match self.submit_post_comments(post_id, &post.content).await {
                Ok(_) => debug!(post_id, %author, "search post published"),
                Err(DispatcherError::ShuttingDown) => {
                    warn!(post_id, %author, "dispatcher shutting down, search post stored without comments")
                }
                Err(e) => return Err(e),
            }
            posts.push(post);
        }

        info!(query, posts = posts.len(), "search posts published");
        Ok(posts)
    }

    /// Stop accepting submissions and settle outstanding tasks.
    ///
    /// With `drain` every outstanding task runs to completion first. Without
    /// it outstanding tasks are aborted and end `Failed`; their resource
    /// guards and worker permits are released as the tasks are dropped.
    pub async fn shutdown(&self, drain: bool) {
        let mut outstanding = {
            let mut guarded = self.outstanding.lock().await;
            if self.closed.swap(true, Ordering::AcqRel) {
                debug!("dispatcher already shut down");
            }
            std::mem::take(&mut guarded.tasks)
        };

        if drain {
            info!(tasks = outstanding.len(), "draining dispatcher");
            while let Some(joined) = outstanding.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "comment task ended abnormally");
                }
            }
        } else {
            info!(tasks = outstanding.len(), "aborting outstanding dispatcher tasks");
            // Tasks still waiting for a worker give up instead of starting.
            self.shared.permits.close();
            outstanding.abort_all();
            outstanding.detach_all();
        }

        let stats = self.stats();
        info!(
            completed = stats.completed,
            failed = stats.failed,
            "dispatcher shut down"
        );
    }
}

async fn run_comment_task(
    shared: Arc<Shared>,
    progress: TaskProgress,
    mut turn: Turn,
    task_id: u64,
    post_id: PostId,
    post_content: Arc<str>,
    persona: Persona,
    resource_index: usize,
) {
    turn.wait().await;
    let _permit = match shared.permits.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            warn!(task_id, post_id, persona = %persona.name, "worker pool closed");
            progress.transition(TaskState::Failed);
            return;
        }
    };
    let mut lease = match shared.policy.resources().acquire(resource_index).await {
        Ok(lease) => lease,
        Err(e) => {
            error!(task_id, post_id, persona = %persona.name, resource_index, error = %e, "comment task failed");
            progress.transition(TaskState::Failed);
            return;
        }
    };
    turn.pass();
    progress.transition(TaskState::Running);
    debug!(task_id, post_id, persona = %persona.name, resource_index, "comment task running");

    let comment = shared
        .policy
        .generate_comment_on(&mut lease, &post_content, &persona)
        .await;
    drop(lease);

    match shared.store.add_comment(post_id, &comment, &persona.name) {
        Ok(comment_id) => {
            info!(post_id, comment_id, persona = %persona.name, resource_index, "comment stored");
            progress.transition(TaskState::Completed);
        }
        Err(e) => {
            error!(
                task_id,
                post_id,
                persona = %persona.name,
                resource_index,
                error = %e,
                "comment task failed"
            );
            progress.transition(TaskState::Failed);
        }
    }
}
