use crate::model::entity::job::{Job, JobStatus, JobType};

/// A pluggable backend capable of running jobs of some set of types.
///
/// `execute` must return as soon as the job is handed to the backend;
/// terminal state is reported asynchronously through the job repository.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, job: &Job) -> anyhow::Result<()>;
    async fn cancel(&self, job_id: i64) -> anyhow::Result<()>;
    async fn status(&self, job_id: i64) -> anyhow::Result<JobStatus>;
    async fn logs(&self, job_id: i64) -> anyhow::Result<String>;
    fn supports(&self, job_type: JobType) -> bool;
}
