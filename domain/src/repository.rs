use crate::model::entity::{Job, JobCheckpoint, JobLog, Project, User};

/// Data access for jobs and their logs/checkpoints. The persistence backend
/// is a collaborator; this core only goes through this trait.
#[async_trait::async_trait]
pub trait JobRepository: Send + Sync {
    /// Persists a new job and returns it with its assigned id.
    async fn create(&self, job: Job) -> anyhow::Result<Job>;
    async fn update(&self, job: &Job) -> anyhow::Result<()>;
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<Job>>;
    async fn find_all(&self) -> anyhow::Result<Vec<Job>>;
    async fn find_by_user(&self, user_id: i64) -> anyhow::Result<Vec<Job>>;
    async fn find_by_project(&self, project_id: i64) -> anyhow::Result<Vec<Job>>;
    /// All jobs currently waiting in `queued` state.
    async fn queued_jobs(&self) -> anyhow::Result<Vec<Job>>;
    async fn save_log(&self, entry: JobLog) -> anyhow::Result<()>;
    async fn find_logs(&self, job_id: i64) -> anyhow::Result<Vec<JobLog>>;
    async fn find_checkpoints(&self, job_id: i64) -> anyhow::Result<Vec<JobCheckpoint>>;
}

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn user_by_id(&self, id: i64) -> anyhow::Result<Option<User>>;
}

#[async_trait::async_trait]
pub trait ProjectStore: Send + Sync {
    async fn project_by_id(&self, id: i64) -> anyhow::Result<Option<Project>>;
}
