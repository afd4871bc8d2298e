//! Concurrent fan-out of cluster and VM creation.
//!
//! One provisioning run pops a project per resource group, assigns zones
//! round-robin in a sequential dispatch loop, then creates every requested
//! cluster and VM concurrently under a single run-wide deadline. The first
//! failure cancels all in-flight siblings; the run returns only once every
//! task has settled, and either yields a complete [`Inventory`] or one
//! terminating [`ProvisionError`].

use std::sync::Arc;
use std::time::Duration;

use quarry_cloud::{ClusterCreator, ClusterSpec, InstanceInfo, Inventory, VmCreator, VmSpec};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::ProvisionError;
use crate::pool::{ProjectHandle, ProjectPool};
use crate::request::ResourceRequest;
use crate::ring::ZoneRing;

/// Default budget for one whole provisioning run. Covers the entire
/// fan-out, not each task individually.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// One settled creation, tagged with its owning project.
#[derive(Debug)]
pub enum CreationResult {
    Cluster { project: String, info: InstanceInfo },
    Vm { project: String, info: InstanceInfo },
}

type TaskResult = Result<(), ProvisionError>;

/// Orchestrates provisioning runs over injected creator capabilities.
pub struct Coordinator {
    clusters: Arc<dyn ClusterCreator>,
    vms: Arc<dyn VmCreator>,
    timeout: Duration,
}

impl Coordinator {
    /// Build a coordinator over the given creators with the default
    /// operation timeout.
    pub fn new(clusters: Arc<dyn ClusterCreator>, vms: Arc<dyn VmCreator>) -> Self {
        Self {
            clusters,
            vms,
            timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Override the run-wide deadline budget.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Turn `request` into an [`Inventory`], or fail the whole run.
    ///
    /// Pops one project per resource group from `pool` (kind-scoped,
    /// LIFO), lists the project's zones once, assigns a zone to every spec
    /// that does not pin one, and dispatches exactly one concurrent task
    /// per cluster/VM spec. No creation is retried.
    ///
    /// # Errors
    /// Any [`ProvisionError`] aborts the run; no partial inventory is
    /// returned. Resources created before the failure are left for the
    /// broker's cleanup path.
    pub async fn provision(
        &self,
        request: &ResourceRequest,
        pool: &mut ProjectPool,
    ) -> Result<Inventory, ProvisionError> {
        let deadline = Instant::now() + self.timeout;
        let cancel = CancellationToken::new();
        let (results_tx, mut results_rx) = mpsc::channel(request.task_count().max(1));
        let mut tasks = JoinSet::new();

        let dispatched = self
            .dispatch(request, pool, deadline, &cancel, &results_tx, &mut tasks)
            .await;
        if dispatched.is_err() {
            cancel.cancel();
        }
        drop(results_tx);

        // Every task settles before anything is inspected; the first
        // non-cancellation error wins over derived cancellations.
        let mut first_err = dispatched.err();
        while let Some(joined) = tasks.join_next().await {
            let settled = joined.unwrap_or_else(|panic| Err(ProvisionError::TaskPanic(panic)));
            if let Err(err) = settled {
                prefer(&mut first_err, err);
            }
        }

        if let Some(err) = first_err {
            error!(error = %err, "provisioning run failed");
            return Err(err);
        }

        let inventory = aggregate(&mut results_rx);
        info!(projects = inventory.len(), "provisioning run complete");
        Ok(inventory)
    }

    async fn dispatch(
        &self,
        request: &ResourceRequest,
        pool: &mut ProjectPool,
        deadline: Instant,
        cancel: &CancellationToken,
        results: &mpsc::Sender<CreationResult>,
        tasks: &mut JoinSet<TaskResult>,
    ) -> Result<(), ProvisionError> {
        for (kind, groups) in &request.groups {
            for group in groups {
                let Some(project) = pool.pop(kind) else {
                    error!(kind = %kind, "project pool exhausted");
                    return Err(ProvisionError::PoolExhausted { kind: kind.clone() });
                };

                let zones = timeout_at(deadline, self.vms.list_zones(&project))
                    .await
                    .map_err(|_| ProvisionError::DeadlineExceeded(self.timeout))?
                    .map_err(|source| ProvisionError::ZoneListing {
                        project: project.clone(),
                        source,
                    })?;
                let handle = ProjectHandle { id: project, zones };

                let mut ring =
                    ZoneRing::new(handle.zones.clone()).ok_or_else(|| ProvisionError::NoZones {
                        project: handle.id.clone(),
                    })?;

                debug!(
                    kind = %kind,
                    project = %handle.id,
                    clusters = group.clusters.len(),
                    vms = group.vms.len(),
                    "dispatching project group"
                );

                // Zones are assigned here, before dispatch, so the ring is
                // never touched by the concurrent tasks.
                for spec in &group.clusters {
                    let mut spec = spec.clone();
                    if spec.explicit_zone().is_none() {
                        spec.zone = Some(ring.next().to_string());
                    }
                    self.spawn_cluster(
                        tasks,
                        handle.id.clone(),
                        spec,
                        deadline,
                        cancel.clone(),
                        results.clone(),
                    );
                }
                for spec in &group.vms {
                    let mut spec = spec.clone();
                    if spec.explicit_zone().is_none() {
                        spec.zone = Some(ring.next().to_string());
                    }
                    self.spawn_vm(
                        tasks,
                        handle.id.clone(),
                        spec,
                        deadline,
                        cancel.clone(),
                        results.clone(),
                    );
                }
            }
        }
        Ok(())
    }

    fn spawn_cluster(
        &self,
        tasks: &mut JoinSet<TaskResult>,
        project: String,
        spec: ClusterSpec,
        deadline: Instant,
        cancel: CancellationToken,
        results: mpsc::Sender<CreationResult>,
    ) {
        let creator = Arc::clone(&self.clusters);
        let budget = self.timeout;
        tasks.spawn(async move {
            if cancel.is_cancelled() {
                return Err(ProvisionError::Cancelled);
            }
            let result = tokio::select! {
                () = cancel.cancelled() => Err(ProvisionError::Cancelled),
                created = timeout_at(deadline, creator.create(&project, &spec)) => match created {
                    Ok(Ok(info)) => {
                        debug!(project = %project, name = %info.name, zone = %info.zone, "cluster created");
                        // Sized to the task count, so this never blocks.
                        let _ = results.send(CreationResult::Cluster { project, info }).await;
                        Ok(())
                    }
                    Ok(Err(source)) => {
                        error!(project = %project, error = %source, "cluster creation failed");
                        Err(ProvisionError::Creation { project, source })
                    }
                    Err(_) => Err(ProvisionError::DeadlineExceeded(budget)),
                },
            };
            fail_fast(&cancel, result)
        });
    }

    fn spawn_vm(
        &self,
        tasks: &mut JoinSet<TaskResult>,
        project: String,
        spec: VmSpec,
        deadline: Instant,
        cancel: CancellationToken,
        results: mpsc::Sender<CreationResult>,
    ) {
        let creator = Arc::clone(&self.vms);
        let budget = self.timeout;
        tasks.spawn(async move {
            if cancel.is_cancelled() {
                return Err(ProvisionError::Cancelled);
            }
            let result = tokio::select! {
                () = cancel.cancelled() => Err(ProvisionError::Cancelled),
                created = timeout_at(deadline, creator.create(&project, &spec)) => match created {
                    Ok(Ok(info)) => {
                        debug!(project = %project, name = %info.name, zone = %info.zone, "vm created");
                        let _ = results.send(CreationResult::Vm { project, info }).await;
                        Ok(())
                    }
                    Ok(Err(source)) => {
                        error!(project = %project, error = %source, "vm creation failed");
                        Err(ProvisionError::Creation { project, source })
                    }
                    Err(_) => Err(ProvisionError::DeadlineExceeded(budget)),
                },
            };
            fail_fast(&cancel, result)
        });
    }
}

/// Cancel all siblings on a real failure; derived cancellations pass
/// through without re-cancelling.
fn fail_fast(cancel: &CancellationToken, result: TaskResult) -> TaskResult {
    if let Err(err) = &result {
        if !matches!(err, ProvisionError::Cancelled) {
            cancel.cancel();
        }
    }
    result
}

/// Keep the first real error; a derived cancellation never masks one.
fn prefer(current: &mut Option<ProvisionError>, candidate: ProvisionError) {
    match current {
        None => *current = Some(candidate),
        Some(ProvisionError::Cancelled) if !matches!(candidate, ProvisionError::Cancelled) => {
            *current = Some(candidate);
        }
        Some(_) => {}
    }
}

/// Fold settled results into the per-project inventory.
///
/// Called only after the task set has fully settled and every sender is
/// dropped, so the channel drains without awaiting. Order within a
/// project's lists is concurrent arrival order.
fn aggregate(results: &mut mpsc::Receiver<CreationResult>) -> Inventory {
    let mut inventory = Inventory::new();
    while let Ok(result) = results.try_recv() {
        match result {
            CreationResult::Cluster { project, info } => {
                inventory.entry(project).or_default().clusters.push(info);
            }
            CreationResult::Vm { project, info } => {
                inventory.entry(project).or_default().vms.push(info);
            }
        }
    }
    inventory
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use quarry_cloud::CloudError;
    use tokio::sync::Notify;

    use super::*;

    fn request_yaml(doc: &str) -> ResourceRequest {
        ResourceRequest::from_yaml(doc).unwrap()
    }

    fn pool_with(kind: &str, projects: &[&str]) -> ProjectPool {
        let mut pool = ProjectPool::new();
        for project in projects {
            pool.insert(kind, *project);
        }
        pool
    }

    /// Succeeds immediately, recording assigned zones in call order.
    #[derive(Default)]
    struct OkClusters {
        calls: AtomicUsize,
        zones_seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ClusterCreator for OkClusters {
        async fn create(
            &self,
            _project: &str,
            spec: &ClusterSpec,
        ) -> Result<InstanceInfo, CloudError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let zone = spec.explicit_zone().unwrap_or_default().to_string();
            self.zones_seen.lock().unwrap().push(zone.clone());
            Ok(InstanceInfo {
                name: format!("cluster-{n}"),
                zone,
            })
        }
    }

    /// Succeeds immediately; serves a fixed zone list.
    struct OkVms {
        zones: Vec<String>,
        calls: AtomicUsize,
        zones_seen: Mutex<Vec<String>>,
    }

    impl OkVms {
        fn with_zones(zones: &[&str]) -> Self {
            Self {
                zones: zones.iter().map(ToString::to_string).collect(),
                calls: AtomicUsize::new(0),
                zones_seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VmCreator for OkVms {
        async fn create(&self, _project: &str, spec: &VmSpec) -> Result<InstanceInfo, CloudError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let zone = spec.explicit_zone().unwrap_or_default().to_string();
            self.zones_seen.lock().unwrap().push(zone.clone());
            Ok(InstanceInfo {
                name: format!("vm-{n}"),
                zone,
            })
        }

        async fn list_zones(&self, _project: &str) -> Result<Vec<String>, CloudError> {
            Ok(self.zones.clone())
        }
    }

    /// Fails every creation immediately.
    #[derive(Default)]
    struct FailingClusters {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ClusterCreator for FailingClusters {
        async fn create(
            &self,
            _project: &str,
            _spec: &ClusterSpec,
        ) -> Result<InstanceInfo, CloudError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CloudError::Api {
                status: 500,
                message: "backend exploded".to_string(),
            })
        }
    }

    /// Never completes a creation; counts how many were attempted.
    struct NeverVms {
        zones: Vec<String>,
        calls: AtomicUsize,
    }

    impl NeverVms {
        fn with_zones(zones: &[&str]) -> Self {
            Self {
                zones: zones.iter().map(ToString::to_string).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VmCreator for NeverVms {
        async fn create(&self, _project: &str, _spec: &VmSpec) -> Result<InstanceInfo, CloudError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
            unreachable!()
        }

        async fn list_zones(&self, _project: &str) -> Result<Vec<String>, CloudError> {
            Ok(self.zones.clone())
        }
    }

    /// Sleeps far past any test deadline before succeeding.
    #[derive(Default)]
    struct SlowClusters;

    #[async_trait]
    impl ClusterCreator for SlowClusters {
        async fn create(
            &self,
            _project: &str,
            spec: &ClusterSpec,
        ) -> Result<InstanceInfo, CloudError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(InstanceInfo {
                name: "late".to_string(),
                zone: spec.explicit_zone().unwrap_or_default().to_string(),
            })
        }
    }

    struct BrokenZoneVms;

    #[async_trait]
    impl VmCreator for BrokenZoneVms {
        async fn create(&self, _project: &str, _spec: &VmSpec) -> Result<InstanceInfo, CloudError> {
            unreachable!("creation should never be reached")
        }

        async fn list_zones(&self, _project: &str) -> Result<Vec<String>, CloudError> {
            Err(CloudError::Api {
                status: 503,
                message: "zone listing unavailable".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn concrete_scenario_assigns_ring_zones() {
        let clusters = Arc::new(OkClusters::default());
        let vms = Arc::new(OkVms::with_zones(&["us-a", "us-b"]));
        let coordinator = Coordinator::new(clusters.clone(), vms.clone());

        let request = request_yaml("pool-x:\n  - clusters:\n      - {}\n    vms:\n      - {}\n");
        let mut pool = pool_with("pool-x", &["proj-1"]);

        let inventory = coordinator.provision(&request, &mut pool).await.unwrap();

        let project = &inventory["proj-1"];
        assert_eq!(project.clusters.len(), 1);
        assert_eq!(project.clusters[0].zone, "us-a");
        assert_eq!(project.vms.len(), 1);
        assert_eq!(project.vms[0].zone, "us-b");
    }

    #[tokio::test]
    async fn pool_exhaustion_invokes_no_creators() {
        let clusters = Arc::new(OkClusters::default());
        let vms = Arc::new(OkVms::with_zones(&["us-a"]));
        let coordinator = Coordinator::new(clusters.clone(), vms.clone());

        let request = request_yaml("pool-x:\n  - clusters:\n      - {}\n");
        let mut pool = ProjectPool::new();

        let err = coordinator.provision(&request, &mut pool).await.unwrap_err();
        assert!(matches!(err, ProvisionError::PoolExhausted { ref kind } if kind == "pool-x"));
        assert_eq!(clusters.calls.load(Ordering::SeqCst), 0);
        assert_eq!(vms.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pool_exhaustion_mid_iteration_aborts_run() {
        let clusters = Arc::new(OkClusters::default());
        let vms = Arc::new(OkVms::with_zones(&["us-a"]));
        let coordinator = Coordinator::new(clusters, vms);

        // Two project groups, one project available.
        let request =
            request_yaml("pool-x:\n  - clusters:\n      - {}\n  - clusters:\n      - {}\n");
        let mut pool = pool_with("pool-x", &["proj-1"]);

        let err = coordinator.provision(&request, &mut pool).await.unwrap_err();
        assert!(matches!(err, ProvisionError::PoolExhausted { .. }));
    }

    #[tokio::test]
    async fn explicit_zone_does_not_advance_ring() {
        let clusters = Arc::new(OkClusters::default());
        let vms = Arc::new(OkVms::with_zones(&["us-a", "us-b"]));
        let coordinator = Coordinator::new(clusters.clone(), vms.clone());

        let request = request_yaml(
            "pool-x:\n  - clusters:\n      - zone: europe-west1-b\n    vms:\n      - {}\n",
        );
        let mut pool = pool_with("pool-x", &["proj-1"]);

        coordinator.provision(&request, &mut pool).await.unwrap();

        assert_eq!(
            *clusters.zones_seen.lock().unwrap(),
            vec!["europe-west1-b".to_string()]
        );
        // The pinned cluster must not have consumed "us-a".
        assert_eq!(*vms.zones_seen.lock().unwrap(), vec!["us-a".to_string()]);
    }

    // Current-thread runtime: the failing cluster task runs to completion
    // and cancels the token before any vm task is first polled, so the vm
    // creator must never be called.
    #[tokio::test]
    async fn fail_fast_skips_unstarted_siblings() {
        let clusters = Arc::new(FailingClusters::default());
        let vms = Arc::new(NeverVms::with_zones(&["us-a"]));
        let coordinator = Coordinator::new(clusters.clone(), vms.clone());

        let request = request_yaml(
            "pool-x:\n  - clusters:\n      - {}\n    vms:\n      - {}\n      - {}\n      - {}\n",
        );
        let mut pool = pool_with("pool-x", &["proj-1"]);

        let err = coordinator.provision(&request, &mut pool).await.unwrap_err();

        // The original creation error surfaces, not a derived cancellation.
        match err {
            ProvisionError::Creation { project, source } => {
                assert_eq!(project, "proj-1");
                assert!(matches!(source, CloudError::Api { status: 500, .. }));
            }
            other => panic!("expected creation error, got {other:?}"),
        }
        assert_eq!(clusters.calls.load(Ordering::SeqCst), 1);
        assert_eq!(vms.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn in_flight_siblings_observe_cancellation() {
        struct BlockingVms {
            zones: Vec<String>,
            started: Arc<Notify>,
        }

        #[async_trait]
        impl VmCreator for BlockingVms {
            async fn create(
                &self,
                _project: &str,
                _spec: &VmSpec,
            ) -> Result<InstanceInfo, CloudError> {
                self.started.notify_one();
                std::future::pending::<()>().await;
                unreachable!()
            }

            async fn list_zones(&self, _project: &str) -> Result<Vec<String>, CloudError> {
                Ok(self.zones.clone())
            }
        }

        /// Waits until the vm task is genuinely in flight, then fails.
        struct FailAfterSibling {
            sibling_started: Arc<Notify>,
        }

        #[async_trait]
        impl ClusterCreator for FailAfterSibling {
            async fn create(
                &self,
                _project: &str,
                _spec: &ClusterSpec,
            ) -> Result<InstanceInfo, CloudError> {
                self.sibling_started.notified().await;
                Err(CloudError::Api {
                    status: 500,
                    message: "backend exploded".to_string(),
                })
            }
        }

        let started = Arc::new(Notify::new());
        let clusters = Arc::new(FailAfterSibling {
            sibling_started: started.clone(),
        });
        let vms = Arc::new(BlockingVms {
            zones: vec!["us-a".to_string()],
            started,
        });
        let coordinator = Coordinator::new(clusters, vms);

        let request = request_yaml("pool-x:\n  - clusters:\n      - {}\n    vms:\n      - {}\n");
        let mut pool = pool_with("pool-x", &["proj-1"]);

        // Completes only if the blocked vm task observes cancellation.
        let err = coordinator.provision(&request, &mut pool).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Creation { .. }));
    }

    #[tokio::test]
    async fn aggregation_covers_every_dispatched_task() {
        let clusters = Arc::new(OkClusters::default());
        let vms = Arc::new(OkVms::with_zones(&["us-a", "us-b", "us-c"]));
        let coordinator = Coordinator::new(clusters, vms);

        let request = request_yaml(
            "pool-x:\n  - clusters:\n      - {}\n      - {}\n    vms:\n      - {}\n  - vms:\n      - {}\npool-y:\n  - clusters:\n      - {}\n",
        );
        let mut pool = pool_with("pool-x", &["proj-1", "proj-2"]);
        pool.insert("pool-y", "proj-3");

        let inventory = coordinator.provision(&request, &mut pool).await.unwrap();

        assert_eq!(inventory.len(), 3);
        let total: usize = inventory
            .values()
            .map(|p| p.clusters.len() + p.vms.len())
            .sum();
        assert_eq!(total, request.task_count());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_classified_distinctly() {
        let clusters = Arc::new(SlowClusters);
        let vms = Arc::new(OkVms::with_zones(&["us-a"]));
        let coordinator =
            Coordinator::new(clusters, vms).with_timeout(Duration::from_secs(60));

        let request = request_yaml("pool-x:\n  - clusters:\n      - {}\n");
        let mut pool = pool_with("pool-x", &["proj-1"]);

        let err = coordinator.provision(&request, &mut pool).await.unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::DeadlineExceeded(budget) if budget == Duration::from_secs(60)
        ));
    }

    #[tokio::test]
    async fn zone_listing_failure_is_fatal() {
        let clusters = Arc::new(OkClusters::default());
        let vms = Arc::new(BrokenZoneVms);
        let coordinator = Coordinator::new(clusters.clone(), vms);

        let request = request_yaml("pool-x:\n  - clusters:\n      - {}\n");
        let mut pool = pool_with("pool-x", &["proj-1"]);

        let err = coordinator.provision(&request, &mut pool).await.unwrap_err();
        assert!(matches!(err, ProvisionError::ZoneListing { ref project, .. } if project == "proj-1"));
        assert_eq!(clusters.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_zone_list_is_fatal() {
        let clusters = Arc::new(OkClusters::default());
        let vms = Arc::new(OkVms::with_zones(&[]));
        let coordinator = Coordinator::new(clusters, vms);

        let request = request_yaml("pool-x:\n  - clusters:\n      - {}\n");
        let mut pool = pool_with("pool-x", &["proj-1"]);

        let err = coordinator.provision(&request, &mut pool).await.unwrap_err();
        assert!(matches!(err, ProvisionError::NoZones { ref project } if project == "proj-1"));
    }

    #[tokio::test]
    async fn rerun_succeeds_after_full_failure_with_restored_pool() {
        let request = request_yaml("pool-x:\n  - clusters:\n      - {}\n    vms:\n      - {}\n");
        let pristine = pool_with("pool-x", &["proj-1"]);

        let failing = Coordinator::new(
            Arc::new(FailingClusters::default()),
            Arc::new(OkVms::with_zones(&["us-a", "us-b"])),
        );
        let mut run_pool = pristine.clone();
        assert!(failing.provision(&request, &mut run_pool).await.is_err());

        let healthy = Coordinator::new(
            Arc::new(OkClusters::default()),
            Arc::new(OkVms::with_zones(&["us-a", "us-b"])),
        );
        let mut run_pool = pristine.clone();
        let inventory = healthy.provision(&request, &mut run_pool).await.unwrap();
        assert_eq!(inventory["proj-1"].clusters.len(), 1);
        assert_eq!(inventory["proj-1"].vms.len(), 1);
    }
}
