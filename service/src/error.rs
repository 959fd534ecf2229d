use domain::model::entity::job::{GpuAccess, JobStatus, JobType};

/// Failures surfaced to API callers. Each variant is a distinct kind so the
/// outer layer can map them to not-found / forbidden / conflict / internal.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("user {0} not found")]
    UserNotFound(i64),
    #[error("project {0} not found")]
    ProjectNotFound(i64),
    #[error("GPU access type `{access}` not allowed for project {project_id}")]
    GpuAccessDenied { project_id: i64, access: GpuAccess },
    #[error("GPU quota exceeded: current={current}, requested={requested}, quota={quota}")]
    QuotaExceeded {
        current: i64,
        requested: i64,
        quota: i64,
    },
    #[error("job {0} not found")]
    JobNotFound(i64),
    #[error("cannot {action} job {id} in status `{status}`")]
    InvalidTransition {
        id: i64,
        status: JobStatus,
        action: &'static str,
    },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Dispatch outcome of the executor registry. `ExecutorNotFound` is
/// non-fatal and must be special-cased by the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("no executor registered for job type `{0}`")]
    ExecutorNotFound(JobType),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}
