use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use domain::model::entity::job::{Job, JobStatus};
use domain::repository::JobRepository;
use tokio_util::sync::CancellationToken;

use crate::error::ExecuteError;
use crate::queue::JobQueue;
use crate::registry::ExecutorRegistry;

pub const DEFAULT_TICK: Duration = Duration::from_secs(5);

/// Drives jobs from `queued` through dispatch. Each tick reconciles the
/// persisted queue into memory, then dispatches at most one job, so the
/// submission rate into the cluster is capped at one job per tick.
pub struct Scheduler {
    queue: JobQueue,
    registry: Arc<ExecutorRegistry>,
    repo: Arc<dyn JobRepository>,
    /// Ids already pushed and still waiting in the queue; keeps
    /// reconciliation from importing the same row twice. Evicted on pop.
    enqueued: DashSet<i64>,
    running: AtomicBool,
    tick: Duration,
}

impl Scheduler {
    pub fn new(registry: Arc<ExecutorRegistry>, repo: Arc<dyn JobRepository>) -> Self {
        Self::with_tick(registry, repo, DEFAULT_TICK)
    }

    pub fn with_tick(
        registry: Arc<ExecutorRegistry>,
        repo: Arc<dyn JobRepository>,
        tick: Duration,
    ) -> Self {
        Self {
            queue: JobQueue::new(),
            registry,
            repo,
            enqueued: DashSet::new(),
            running: AtomicBool::new(false),
            tick,
        }
    }

    /// Runs the tick loop until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(tick = ?self.tick, "scheduler started");

        let mut tick = tokio::time::interval(self.tick);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    self.reconcile().await;
                    self.dispatch().await;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::info!("scheduler stopped");
    }

    /// Pushes a job straight into the dispatch queue.
    pub fn enqueue(&self, job: Job) {
        self.enqueued.insert(job.id);
        self.queue.push(job);
    }

    pub fn queue_size(&self) -> usize {
        self.queue.len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Imports persisted `queued` jobs not yet tracked in memory.
    pub(crate) async fn reconcile(&self) {
        let jobs = match self.repo.queued_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!("reconcile queued jobs: {e:#}");
                return;
            }
        };
        for job in jobs {
            if !self.enqueued.contains(&job.id) {
                self.enqueue(job);
            }
        }
    }

    /// Pops and dispatches at most one job.
    pub(crate) async fn dispatch(&self) {
        let Some(popped) = self.queue.pop() else {
            return;
        };
        self.enqueued.remove(&popped.id);

        // Work on the latest persisted row, not the copy that sat in the
        // queue; the job may have been cancelled or restarted meanwhile.
        let mut job = match self.repo.find_by_id(popped.id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job_id = popped.id, "queued job vanished before dispatch");
                return;
            }
            Err(e) => {
                tracing::error!(job_id = popped.id, "load job for dispatch: {e:#}");
                return;
            }
        };
        if job.status != JobStatus::Queued {
            tracing::debug!(job_id = job.id, status = %job.status, "skipping job no longer queued");
            return;
        }

        job.status = JobStatus::Scheduling;
        if let Err(e) = self.repo.update(&job).await {
            tracing::error!(job_id = job.id, "persist scheduling status: {e:#}");
            return;
        }

        match self.registry.execute(&job).await {
            Err(ExecuteError::ExecutorNotFound(job_type)) => {
                // Left in `scheduling` until an executor for the type shows
                // up; not requeued.
                tracing::warn!(job_id = job.id, %job_type, "no executor registered for job type");
            }
            Err(ExecuteError::Failed(e)) => {
                tracing::error!(job_id = job.id, "job execution failed: {e:#}");
                self.transition(job.id, JobStatus::Failed, Some(format!("{e:#}"))).await;
            }
            Ok(()) => {
                self.transition(job.id, JobStatus::Running, None).await;
            }
        }
    }

    async fn transition(&self, job_id: i64, status: JobStatus, error_message: Option<String>) {
        let mut job = match self.repo.find_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(job_id, "reload job after dispatch: {e:#}");
                return;
            }
        };
        // Watchers own terminal states; never downgrade one.
        if job.is_terminal() {
            return;
        }
        job.status = status;
        if let Some(message) = error_message {
            job.error_message = message;
        }
        if status == JobStatus::Running && job.started_at.is_none() {
            job.started_at = Some(chrono::Utc::now());
        }
        if let Err(e) = self.repo.update(&job).await {
            tracing::error!(job_id, status = %status, "persist dispatch status: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use domain::model::entity::job::{JobPriority, JobType};
    use domain::service::Executor;

    use super::*;
    use crate::testing::MemoryJobRepository;

    mockall::mock! {
        Exec {}

        #[async_trait::async_trait]
        impl Executor for Exec {
            async fn execute(&self, job: &Job) -> anyhow::Result<()>;
            async fn cancel(&self, job_id: i64) -> anyhow::Result<()>;
            async fn status(&self, job_id: i64) -> anyhow::Result<JobStatus>;
            async fn logs(&self, job_id: i64) -> anyhow::Result<String>;
            fn supports(&self, job_type: JobType) -> bool;
        }
    }

    fn registry_with(job_type: JobType, executor: MockExec) -> Arc<ExecutorRegistry> {
        let mut registry = ExecutorRegistry::new();
        registry.register(job_type, Arc::new(executor));
        Arc::new(registry)
    }

    fn queued_job(id: i64, priority: JobPriority) -> Job {
        Job {
            id,
            priority,
            status: JobStatus::Queued,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn enqueue_tracks_queue_size() {
        let repo = MemoryJobRepository::new();
        let scheduler = Scheduler::new(Arc::new(ExecutorRegistry::new()), repo);

        scheduler.enqueue(queued_job(1, JobPriority::Low));
        scheduler.enqueue(queued_job(2, JobPriority::High));
        assert_eq!(scheduler.queue_size(), 2);
    }

    #[tokio::test]
    async fn dispatch_on_empty_queue_is_a_no_op() {
        let repo = MemoryJobRepository::new();
        let scheduler = Scheduler::new(Arc::new(ExecutorRegistry::new()), repo);
        scheduler.dispatch().await;
        assert_eq!(scheduler.queue_size(), 0);
    }

    #[tokio::test]
    async fn successful_dispatch_marks_job_running() {
        let repo = MemoryJobRepository::seed([queued_job(1, JobPriority::Medium)]);
        let mut exec = MockExec::new();
        exec.expect_execute().once().returning(|_| Ok(()));
        let scheduler = Scheduler::new(registry_with(JobType::Normal, exec), repo.clone());

        scheduler.enqueue(repo.job(1).unwrap());
        scheduler.dispatch().await;

        let job = repo.job(1).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());
        assert_eq!(scheduler.queue_size(), 0);
    }

    #[tokio::test]
    async fn execution_error_marks_job_failed() {
        let repo = MemoryJobRepository::seed([queued_job(1, JobPriority::Low)]);
        let mut exec = MockExec::new();
        exec.expect_execute().once().returning(|_| Err(anyhow::anyhow!("submit refused")));
        let scheduler = Scheduler::new(registry_with(JobType::Normal, exec), repo.clone());

        scheduler.enqueue(repo.job(1).unwrap());
        scheduler.dispatch().await;

        let job = repo.job(1).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.contains("submit refused"));
    }

    #[tokio::test]
    async fn unregistered_type_leaves_job_in_scheduling() {
        let repo = MemoryJobRepository::seed([Job {
            job_type: JobType::Mpi,
            ..queued_job(1, JobPriority::High)
        }]);
        let scheduler = Scheduler::new(Arc::new(ExecutorRegistry::new()), repo.clone());

        scheduler.enqueue(repo.job(1).unwrap());
        scheduler.dispatch().await;

        assert_eq!(repo.job(1).unwrap().status, JobStatus::Scheduling);
        assert_eq!(scheduler.queue_size(), 0);
    }

    #[tokio::test]
    async fn dispatch_follows_priority_order() {
        let jobs = [
            queued_job(1, JobPriority::Low),
            queued_job(2, JobPriority::High),
            queued_job(3, JobPriority::Medium),
        ];
        let repo = MemoryJobRepository::seed(jobs.clone());
        let mut exec = MockExec::new();
        exec.expect_execute().times(3).returning(|_| Ok(()));
        let scheduler = Scheduler::new(registry_with(JobType::Normal, exec), repo.clone());

        for job in jobs {
            scheduler.enqueue(job);
        }

        scheduler.dispatch().await;
        assert_eq!(repo.job(2).unwrap().status, JobStatus::Running);
        assert_eq!(repo.job(3).unwrap().status, JobStatus::Queued);

        scheduler.dispatch().await;
        assert_eq!(repo.job(3).unwrap().status, JobStatus::Running);
        assert_eq!(repo.job(1).unwrap().status, JobStatus::Queued);

        scheduler.dispatch().await;
        assert_eq!(repo.job(1).unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let repo = MemoryJobRepository::seed([
            queued_job(1, JobPriority::Low),
            queued_job(2, JobPriority::Low),
        ]);
        let scheduler = Scheduler::new(Arc::new(ExecutorRegistry::new()), repo);

        scheduler.reconcile().await;
        assert_eq!(scheduler.queue_size(), 2);
        scheduler.reconcile().await;
        assert_eq!(scheduler.queue_size(), 2);
    }

    #[tokio::test]
    async fn restarted_job_is_enqueued_again() {
        let repo = MemoryJobRepository::seed([queued_job(1, JobPriority::Low)]);
        let mut exec = MockExec::new();
        exec.expect_execute().times(2).returning(|_| Ok(()));
        let scheduler = Scheduler::new(registry_with(JobType::Normal, exec), repo.clone());

        scheduler.reconcile().await;
        scheduler.dispatch().await;
        assert_eq!(repo.job(1).unwrap().status, JobStatus::Running);

        // restart returns the row to queued; the id must not stay tracked
        let mut job = repo.job(1).unwrap();
        job.status = JobStatus::Queued;
        job.restart_count += 1;
        repo.update(&job).await.unwrap();

        scheduler.reconcile().await;
        assert_eq!(scheduler.queue_size(), 1);
        scheduler.dispatch().await;
        assert_eq!(repo.job(1).unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn cancelled_job_is_not_dispatched() {
        let repo = MemoryJobRepository::seed([queued_job(1, JobPriority::Low)]);
        let mut exec = MockExec::new();
        exec.expect_execute().never();
        let scheduler = Scheduler::new(registry_with(JobType::Normal, exec), repo.clone());

        scheduler.enqueue(repo.job(1).unwrap());
        let mut job = repo.job(1).unwrap();
        job.status = JobStatus::Cancelled;
        repo.update(&job).await.unwrap();

        scheduler.dispatch().await;
        assert_eq!(repo.job(1).unwrap().status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let repo = MemoryJobRepository::new();
        let scheduler = Arc::new(Scheduler::with_tick(
            Arc::new(ExecutorRegistry::new()),
            repo,
            Duration::from_millis(10),
        ));
        let shutdown = CancellationToken::new();

        let handle = {
            let scheduler = scheduler.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { scheduler.run(shutdown).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(scheduler.is_running());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(!scheduler.is_running());
    }
}
