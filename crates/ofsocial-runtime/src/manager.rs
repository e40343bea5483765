//! ResourceManager: owns the compute resources and serializes access to each.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use ofsocial_core::GenerationParams;
use ofsocial_core::config::ModelConfig;

use crate::backend::{CompletionBackend, TextGenerator};
use crate::error::{RuntimeError, RuntimeResult};

/// One exclusive execution context: a generator pinned to a device.
pub struct ComputeResource {
    index: usize,
    device: String,
    /// Fair (FIFO) mutex: waiters acquire in arrival order.
    slot: Arc<Mutex<Box<dyn TextGenerator>>>,
}

impl ComputeResource {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

/// Owns N compute resources for the lifetime of the process.
pub struct ResourceManager {
    resources: Vec<ComputeResource>,
}

impl ResourceManager {
    /// Build a manager from `(device, generator)` pairs. Index `i` is the
    /// position in the list.
    pub fn new(generators: Vec<(String, Box<dyn TextGenerator>)>) -> RuntimeResult<Self> {
        if generators.is_empty() {
            return Err(RuntimeError::NoResources);
        }
        let resources: Vec<ComputeResource> = generators
            .into_iter()
            .enumerate()
            .map(|(index, (device, generator))| ComputeResource {
                index,
                device,
                slot: Arc::new(Mutex::new(generator)),
            })
            .collect();
        for resource in &resources {
            info!(resource_index = resource.index, device = %resource.device, "compute resource ready");
        }
        Ok(Self { resources })
    }

    /// Build a manager with one completion backend per configured resource.
    pub fn from_config(config: &ModelConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let mut generators: Vec<(String, Box<dyn TextGenerator>)> = Vec::new();
        for resource in &config.resources {
            let backend = CompletionBackend::new(resource.endpoint.as_str(), timeout)?;
            generators.push((resource.device.clone(), Box::new(backend)));
        }
        Ok(Self::new(generators)?)
    }

    /// Number of compute resources.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Device label of a resource.
    pub fn device(&self, index: usize) -> Option<&str> {
        self.resources.get(index).map(|r| r.device())
    }

    /// Wait for exclusive access to resource `index`.
    ///
    /// Waiters on one resource are served in the order they started waiting.
    /// The returned lease keeps the resource until it is dropped.
    pub async fn acquire(&self, index: usize) -> RuntimeResult<ResourceLease> {
        let resource = self
            .resources
            .get(index)
            .ok_or(RuntimeError::InvalidResource {
                index,
                count: self.resources.len(),
            })?;

        let waited = Instant::now();
        let generator = Arc::clone(&resource.slot).lock_owned().await;
        debug!(
            resource_index = index,
            device = %resource.device,
            wait_ms = waited.elapsed().as_millis() as u64,
            "resource acquired"
        );
        Ok(ResourceLease { index, generator })
    }

    /// Wait for exclusive access to resource `index`, then run one generation.
    ///
    /// Calls against the same resource run one at a time in arrival order;
    /// calls against different resources proceed in parallel. Errors from the
    /// generator are returned as `RuntimeError::Generation` without retry.
    pub async fn acquire_and_generate(
        &self,
        index: usize,
        prompt: &str,
        params: &GenerationParams,
    ) -> RuntimeResult<String> {
        // The lease lives in this future: it is released on return,
        // on error, and when the future is dropped mid-call.
        let mut lease = self.acquire(index).await?;
        lease.generate(prompt, params).await
    }
}

/// Exclusive hold on one compute resource.
///
/// Several generations can run under one lease without another caller
/// getting in between. Dropping the lease releases the resource.
pub struct ResourceLease {
    index: usize,
    generator: OwnedMutexGuard<Box<dyn TextGenerator>>,
}

impl ResourceLease {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Run one generation call on the leased resource.
    pub async fn generate(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
    ) -> RuntimeResult<String> {
        let index = self.index;
        let started = Instant::now();
        match self.generator.generate(prompt, params).await {
            Ok(text) => {
                debug!(
                    resource_index = index,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    chars = text.len(),
                    "generation complete"
                );
                Ok(text)
            }
            Err(source) => {
                warn!(resource_index = index, error = %source, "generation failed");
                Err(RuntimeError::Generation { index, source })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Tracks how many calls are inside `generate` at once, per generator and overall.
    #[derive(Clone, Default)]
    struct Occupancy {
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl Occupancy {
        fn enter(&self) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        fn max(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    struct SlowGenerator {
        local: Occupancy,
        global: Occupancy,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl TextGenerator for SlowGenerator {
        async fn generate(
            &mut self,
            prompt: &str,
            _params: &GenerationParams,
        ) -> anyhow::Result<String> {
            self.local.enter();
            self.global.enter();
            self.calls.lock().await.push(prompt.to_string());
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.global.exit();
            self.local.exit();
            Ok(format!("reply to {prompt}"))
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn generate(
            &mut self,
            _prompt: &str,
            _params: &GenerationParams,
        ) -> anyhow::Result<String> {
            anyhow::bail!("out of memory")
        }
    }

    fn params() -> GenerationParams {
        GenerationParams::for_kind(ofsocial_core::ContentKind::Comment)
    }

    fn slow_manager(count: usize) -> (ResourceManager, Vec<Occupancy>, Occupancy, Vec<Arc<Mutex<Vec<String>>>>) {
        let global = Occupancy::default();
        let mut locals = Vec::new();
        let mut logs = Vec::new();
        let mut generators: Vec<(String, Box<dyn TextGenerator>)> = Vec::new();
        for i in 0..count {
            let local = Occupancy::default();
            let calls = Arc::new(Mutex::new(Vec::new()));
            generators.push((
                format!("cuda:{i}"),
                Box::new(SlowGenerator {
                    local: local.clone(),
                    global: global.clone(),
                    calls: calls.clone(),
                }),
            ));
            locals.push(local);
            logs.push(calls);
        }
        (ResourceManager::new(generators).unwrap(), locals, global, logs)
    }

    #[test]
    fn empty_manager_is_rejected() {
        assert!(matches!(
            ResourceManager::new(Vec::new()),
            Err(RuntimeError::NoResources)
        ));
    }

    #[test]
    fn from_config_builds_one_resource_per_entry() {
        let config = ModelConfig::default();
        let manager = ResourceManager::from_config(&config).unwrap();
        assert_eq!(manager.resource_count(), 2);
        assert_eq!(manager.device(0), Some("cuda:0"));
        assert_eq!(manager.device(1), Some("cuda:1"));
        assert_eq!(manager.device(2), None);
    }

    #[tokio::test]
    async fn out_of_range_index_is_rejected() {
        let (manager, _, _, _) = slow_manager(2);
        let result = manager.acquire_and_generate(2, "p", &params()).await;
        assert!(matches!(
            result,
            Err(RuntimeError::InvalidResource { index: 2, count: 2 })
        ));
    }

    #[tokio::test]
    async fn generator_errors_propagate_with_index() {
        let manager =
            ResourceManager::new(vec![("cpu".to_string(), Box::new(FailingGenerator) as Box<dyn TextGenerator>)])
                .unwrap();
        let result = manager.acquire_and_generate(0, "p", &params()).await;
        match result {
            Err(RuntimeError::Generation { index, source }) => {
                assert_eq!(index, 0);
                assert!(source.to_string().contains("out of memory"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failure_releases_the_guard() {
        let manager =
            ResourceManager::new(vec![("cpu".to_string(), Box::new(FailingGenerator) as Box<dyn TextGenerator>)])
                .unwrap();
        for _ in 0..3 {
            assert!(manager.acquire_and_generate(0, "p", &params()).await.is_err());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_resource_is_never_reentered() {
        let (manager, locals, _, _) = slow_manager(1);
        let manager = Arc::new(manager);

        let mut handles = Vec::new();
        for i in 0..6 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager
                    .acquire_and_generate(0, &format!("p{i}"), &params())
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(locals[0].max(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn distinct_resources_overlap() {
        let (manager, locals, global, _) = slow_manager(2);
        let manager = Arc::new(manager);

        let mut handles = Vec::new();
        for i in 0..4 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager
                    .acquire_and_generate(i % 2, "p", &params())
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(locals[0].max(), 1);
        assert_eq!(locals[1].max(), 1);
        assert_eq!(global.max(), 2);
    }

    #[tokio::test]
    async fn one_resource_serves_in_arrival_order() {
        let (manager, _, _, logs) = slow_manager(1);
        let manager = Arc::new(manager);

        let mut handles = Vec::new();
        for i in 0..4 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager
                    .acquire_and_generate(0, &format!("p{i}"), &params())
                    .await
                    .unwrap()
            }));
            // Let the task reach the guard before spawning the next one.
            tokio::task::yield_now().await;
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*logs[0].lock().await, vec!["p0", "p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn abandoned_call_does_not_deadlock_later_calls() {
        let (manager, _, _, _) = slow_manager(1);
        let manager = Arc::new(manager);

        let stuck = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.acquire_and_generate(0, "first", &params()).await })
        };
        tokio::task::yield_now().await;
        stuck.abort();
        let _ = stuck.await;

        let text = tokio::time::timeout(
            Duration::from_secs(2),
            manager.acquire_and_generate(0, "second", &params()),
        )
        .await
        .expect("guard was not released")
        .unwrap();
        assert_eq!(text, "reply to second");
    }

    #[tokio::test]
    async fn lease_keeps_the_resource_between_calls() {
        let (manager, _, _, logs) = slow_manager(1);
        let manager = Arc::new(manager);

        let mut lease = manager.acquire(0).await.unwrap();
        assert_eq!(lease.index(), 0);
        let other = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.acquire_and_generate(0, "other", &params()).await })
        };
        tokio::task::yield_now().await;

        assert_eq!(lease.generate("first", &params()).await.unwrap(), "reply to first");
        assert_eq!(lease.generate("second", &params()).await.unwrap(), "reply to second");
        drop(lease);

        assert_eq!(other.await.unwrap().unwrap(), "reply to other");
        assert_eq!(*logs[0].lock().await, vec!["first", "second", "other"]);
    }

    #[tokio::test]
    async fn lease_on_missing_resource_is_rejected() {
        let (manager, _, _, _) = slow_manager(1);
        assert!(matches!(
            manager.acquire(3).await,
            Err(RuntimeError::InvalidResource { index: 3, count: 1 })
        ));
    }
}
