use std::collections::HashMap;
use std::sync::Arc;

use domain::model::entity::job::{Job, JobType};
use domain::service::Executor;

use crate::error::ExecuteError;

/// Capability lookup from a job-type tag to its executor. Built once at
/// startup; the last registration for a tag wins.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<JobType, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job_type: JobType, executor: Arc<dyn Executor>) {
        self.executors.insert(job_type, executor);
    }

    pub fn executor_for(&self, job_type: JobType) -> Option<Arc<dyn Executor>> {
        self.executors.get(&job_type).cloned()
    }

    pub async fn execute(&self, job: &Job) -> Result<(), ExecuteError> {
        let executor = self
            .executor_for(job.job_type)
            .ok_or(ExecuteError::ExecutorNotFound(job.job_type))?;
        executor.execute(job).await.map_err(ExecuteError::Failed)
    }
}

#[cfg(test)]
mod tests {
    use domain::model::entity::job::JobStatus;

    use super::*;

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

    #[tokio::test]
    async fn unregistered_type_is_a_distinct_error() {
        let registry = ExecutorRegistry::new();
        let job = Job {
            job_type: JobType::Mpi,
            ..Default::default()
        };
        let err = registry.execute(&job).await.unwrap_err();
        assert!(matches!(err, ExecuteError::ExecutorNotFound(JobType::Mpi)));
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let mut first = MockExec::new();
        first.expect_execute().never();
        let mut second = MockExec::new();
        second.expect_execute().once().returning(|_| Ok(()));

        let mut registry = ExecutorRegistry::new();
        registry.register(JobType::Normal, Arc::new(first));
        registry.register(JobType::Normal, Arc::new(second));

        registry.execute(&Job::default()).await.unwrap();
    }
}
