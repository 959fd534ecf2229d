use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use domain::model::entity::job::{Job, JobStatus, JobType};
use domain::repository::JobRepository;
use domain::service::Executor;

/// Executor that only mutates the job record. Stands in for a real backend
/// in tests and for types no cluster backend supports.
pub struct BasicExecutor {
    repo: Arc<dyn JobRepository>,
}

impl BasicExecutor {
    pub fn new(repo: Arc<dyn JobRepository>) -> Self {
        Self { repo }
    }

    async fn load(&self, job_id: i64) -> anyhow::Result<Job> {
        self.repo
            .find_by_id(job_id)
            .await?
            .with_context(|| format!("job {job_id} not found"))
    }
}

#[async_trait::async_trait]
impl Executor for BasicExecutor {
    async fn execute(&self, job: &Job) -> anyhow::Result<()> {
        let mut job = self.load(job.id).await?;
        job.status = JobStatus::Running;
        if job.started_at.is_none() {
            job.started_at = Some(Utc::now());
        }
        self.repo.update(&job).await
    }

    async fn cancel(&self, job_id: i64) -> anyhow::Result<()> {
        let mut job = self.load(job_id).await?;
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        self.repo.update(&job).await
    }

    async fn status(&self, job_id: i64) -> anyhow::Result<JobStatus> {
        Ok(self.load(job_id).await?.status)
    }

    async fn logs(&self, job_id: i64) -> anyhow::Result<String> {
        let logs = self.repo.find_logs(job_id).await?;
        Ok(logs.into_iter().map(|entry| entry.content).collect::<Vec<_>>().join("\n"))
    }

    fn supports(&self, _job_type: JobType) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryJobRepository;

    #[tokio::test]
    async fn execute_marks_running() {
        let repo = MemoryJobRepository::seed([Job {
            id: 1,
            ..Default::default()
        }]);
        let executor = BasicExecutor::new(repo.clone());

        executor.execute(&repo.job(1).unwrap()).await.unwrap();
        assert_eq!(repo.job(1).unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn cancel_marks_cancelled() {
        let repo = MemoryJobRepository::seed([Job {
            id: 1,
            status: JobStatus::Running,
            ..Default::default()
        }]);
        let executor = BasicExecutor::new(repo.clone());

        executor.cancel(1).await.unwrap();
        let job = repo.job(1).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.completed_at.is_some());
    }
}
