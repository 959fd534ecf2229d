//! In-memory repository doubles shared by the service tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use domain::model::entity::{Job, JobCheckpoint, JobLog, Project, User};
use domain::repository::{JobRepository, ProjectStore, UserStore};

pub(crate) struct MemoryJobRepository {
    jobs: Mutex<Vec<Job>>,
    logs: Mutex<Vec<JobLog>>,
    checkpoints: Mutex<Vec<JobCheckpoint>>,
    next_id: AtomicI64,
}

impl MemoryJobRepository {
    pub fn new() -> Arc<Self> {
        Self::seed([])
    }

    pub fn seed(jobs: impl IntoIterator<Item = Job>) -> Arc<Self> {
        let jobs: Vec<Job> = jobs.into_iter().collect();
        let next_id = jobs.iter().map(|j| j.id).max().unwrap_or(0) + 1;
        Arc::new(Self {
            jobs: Mutex::new(jobs),
            logs: Mutex::new(Vec::new()),
            checkpoints: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(next_id),
        })
    }

    pub fn job(&self, id: i64) -> Option<Job> {
        self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned()
    }

    pub fn logs_for(&self, job_id: i64) -> Vec<JobLog> {
        self.logs.lock().unwrap().iter().filter(|l| l.job_id == job_id).cloned().collect()
    }

    pub fn add_checkpoint(&self, checkpoint: JobCheckpoint) {
        self.checkpoints.lock().unwrap().push(checkpoint);
    }
}

#[async_trait::async_trait]
impl JobRepository for MemoryJobRepository {
    async fn create(&self, mut job: Job) -> anyhow::Result<Job> {
        job.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        job.created_at = Utc::now();
        job.updated_at = job.created_at;
        self.jobs.lock().unwrap().push(job.clone());
        Ok(job)
    }

    async fn update(&self, job: &Job) -> anyhow::Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let slot = jobs
            .iter_mut()
            .find(|j| j.id == job.id)
            .ok_or_else(|| anyhow::anyhow!("no such job id"))?;
        *slot = Job {
            updated_at: Utc::now(),
            ..job.clone()
        };
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<Job>> {
        Ok(self.job(id))
    }

    async fn find_all(&self) -> anyhow::Result<Vec<Job>> {
        Ok(self.jobs.lock().unwrap().clone())
    }

    async fn find_by_user(&self, user_id: i64) -> anyhow::Result<Vec<Job>> {
        Ok(self.jobs.lock().unwrap().iter().filter(|j| j.user_id == user_id).cloned().collect())
    }

    async fn find_by_project(&self, project_id: i64) -> anyhow::Result<Vec<Job>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.project_id == Some(project_id))
            .cloned()
            .collect())
    }

    async fn queued_jobs(&self) -> anyhow::Result<Vec<Job>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == domain::model::entity::job::JobStatus::Queued)
            .cloned()
            .collect())
    }

    async fn save_log(&self, mut entry: JobLog) -> anyhow::Result<()> {
        let mut logs = self.logs.lock().unwrap();
        entry.id = logs.len() as i64 + 1;
        logs.push(entry);
        Ok(())
    }

    async fn find_logs(&self, job_id: i64) -> anyhow::Result<Vec<JobLog>> {
        Ok(self.logs_for(job_id))
    }

    async fn find_checkpoints(&self, job_id: i64) -> anyhow::Result<Vec<JobCheckpoint>> {
        Ok(self
            .checkpoints
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.job_id == job_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryUsers(pub Vec<User>);

#[async_trait::async_trait]
impl UserStore for InMemoryUsers {
    async fn user_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        Ok(self.0.iter().find(|u| u.id == id).cloned())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryProjects(pub Vec<Project>);

#[async_trait::async_trait]
impl ProjectStore for InMemoryProjects {
    async fn project_by_id(&self, id: i64) -> anyhow::Result<Option<Project>> {
        Ok(self.0.iter().find(|p| p.id == id).cloned())
    }
}
