use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use domain::model::entity::job::{Job, JobCheckpoint, JobLog, JobStatus};
use domain::model::vo::JobRequest;
use domain::repository::{JobRepository, ProjectStore, UserStore};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::JobError;
use crate::registry::ExecutorRegistry;

const DEFAULT_CHECKPOINT_INTERVAL: u32 = 300;

/// Admission control and the job-facing API surface: quota-checked
/// creation, listing, cancellation, restart, log and checkpoint retrieval.
pub struct JobService {
    jobs: Arc<dyn JobRepository>,
    users: Arc<dyn UserStore>,
    projects: Arc<dyn ProjectStore>,
    registry: Arc<ExecutorRegistry>,
    /// Serializes admission per project so two concurrent requests cannot
    /// both pass a quota check they jointly exceed.
    admission_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl JobService {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        users: Arc<dyn UserStore>,
        projects: Arc<dyn ProjectStore>,
        registry: Arc<ExecutorRegistry>,
    ) -> Self {
        Self {
            jobs,
            users,
            projects,
            registry,
            admission_locks: DashMap::new(),
        }
    }

    /// Admits a job request and persists it in `queued` state.
    pub async fn create(&self, user_id: i64, req: JobRequest) -> Result<Job, JobError> {
        self.users
            .user_by_id(user_id)
            .await?
            .ok_or(JobError::UserNotFound(user_id))?;

        let project_id = project_id_from_namespace(&req.namespace);

        let _admission_guard = match project_id {
            Some(project_id) if req.gpu_count > 0 => {
                let lock = self.project_lock(project_id);
                Some(lock.lock_owned().await)
            }
            _ => None,
        };

        if req.gpu_count > 0 {
            if let Some(project_id) = project_id {
                let project = self
                    .projects
                    .project_by_id(project_id)
                    .await?
                    .ok_or(JobError::ProjectNotFound(project_id))?;

                if !project.allows_access(req.gpu_access) {
                    return Err(JobError::GpuAccessDenied {
                        project_id,
                        access: req.gpu_access,
                    });
                }

                let current = self.project_gpu_usage(project_id).await?;
                let requested = req.gpu_access.quota_units(req.gpu_count);
                if current + requested > project.gpu_quota {
                    return Err(JobError::QuotaExceeded {
                        current,
                        requested,
                        quota: project.gpu_quota,
                    });
                }
            }
        }

        let checkpoint_interval = if req.enable_checkpoint && req.checkpoint_interval == 0 {
            DEFAULT_CHECKPOINT_INTERVAL
        } else {
            req.checkpoint_interval
        };

        let job = Job {
            user_id,
            project_id,
            name: req.name.clone(),
            namespace: req.namespace,
            job_type: req.job_type.unwrap_or_default(),
            image: req.image,
            command: encode(&req.command),
            args: encode(&req.args),
            working_dir: req.working_dir,
            env_vars: encode(&req.env_vars),
            gpu_count: req.gpu_count,
            gpu_access: req.gpu_access,
            cpu_request: req.cpu_request,
            memory_request: req.memory_request,
            mpi_processes: req.mpi_processes,
            output_path: req.output_path.clone(),
            checkpoint_path: req.checkpoint_path.clone(),
            cluster_job_name: req.name,
            status: JobStatus::Queued,
            enable_checkpoint: req.enable_checkpoint,
            checkpoint_interval,
            volumes: encode(&req.volumes),
            ..Default::default()
        };

        let mut job = self.jobs.create(job).await?;

        // best-effort second write; the job is already admitted
        job.output_path = output_path(job.id, &req.output_path);
        job.checkpoint_path = checkpoint_path(job.id, &req.checkpoint_path);
        job.log_path = log_path(job.id);
        if let Err(e) = self.jobs.update(&job).await {
            tracing::warn!(job_id = job.id, "persist generated job paths: {e:#}");
        }

        tracing::info!(job_id = job.id, name = %job.name, "job admitted");
        Ok(job)
    }

    pub async fn list(&self, user_id: i64, is_admin: bool) -> Result<Vec<Job>, JobError> {
        let jobs = if is_admin {
            self.jobs.find_all().await?
        } else {
            self.jobs.find_by_user(user_id).await?
        };
        Ok(jobs)
    }

    pub async fn get(&self, job_id: i64) -> Result<Job, JobError> {
        self.jobs.find_by_id(job_id).await?.ok_or(JobError::JobNotFound(job_id))
    }

    /// Cancels a non-terminal job. A `running` job goes through its
    /// executor so the cluster workload is torn down; a job that never
    /// reached the cluster is a plain status transition.
    pub async fn cancel(&self, job_id: i64) -> Result<(), JobError> {
        let mut job = self.get(job_id).await?;
        if job.is_terminal() {
            return Err(JobError::InvalidTransition {
                id: job_id,
                status: job.status,
                action: "cancel",
            });
        }

        if job.status == JobStatus::Running {
            if let Some(executor) = self.registry.executor_for(job.job_type) {
                return executor.cancel(job_id).await.map_err(JobError::Storage);
            }
        }

        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        self.jobs.update(&job).await?;
        Ok(())
    }

    /// Returns a finished or stuck job to the queue; the executing workload
    /// picks its checkpoint back up via the recorded checkpoint path.
    pub async fn restart(&self, job_id: i64) -> Result<(), JobError> {
        let mut job = self.get(job_id).await?;
        if job.status == JobStatus::Running {
            return Err(JobError::InvalidTransition {
                id: job_id,
                status: job.status,
                action: "restart",
            });
        }

        job.status = JobStatus::Queued;
        job.restart_count += 1;
        job.started_at = None;
        job.completed_at = None;
        job.exit_code = None;
        job.error_message.clear();
        self.jobs.update(&job).await?;
        Ok(())
    }

    /// Log entries for a job; `limit == 0` means no limit.
    pub async fn logs(
        &self,
        job_id: i64,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<JobLog>, JobError> {
        let logs = self.jobs.find_logs(job_id).await?;
        let page = logs.into_iter().skip(offset);
        Ok(match limit {
            0 => page.collect(),
            n => page.take(n).collect(),
        })
    }

    pub async fn checkpoints(&self, job_id: i64) -> Result<Vec<JobCheckpoint>, JobError> {
        Ok(self.jobs.find_checkpoints(job_id).await?)
    }

    fn project_lock(&self, project_id: i64) -> Arc<Mutex<()>> {
        self.admission_locks.entry(project_id).or_default().clone()
    }

    /// Unit-weighted GPU consumption of a project, rescanned from the job
    /// table. Queued jobs keep their reservation until they finish.
    async fn project_gpu_usage(&self, project_id: i64) -> Result<i64, JobError> {
        let jobs = self.jobs.find_by_project(project_id).await?;
        Ok(jobs
            .iter()
            .filter(|job| matches!(job.status, JobStatus::Running | JobStatus::Queued))
            .map(Job::gpu_units)
            .sum())
    }
}

/// The numeric prefix before the first hyphen of a namespace names the
/// owning project, e.g. `12-vision-lab` belongs to project 12.
fn project_id_from_namespace(namespace: &str) -> Option<i64> {
    let (prefix, _) = namespace.split_once('-')?;
    prefix.parse().ok()
}

fn encode<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn output_path(job_id: i64, requested: &str) -> String {
    if requested.is_empty() {
        format!("/personal-drive/jobs/{job_id}/output")
    } else {
        requested.to_owned()
    }
}

fn checkpoint_path(job_id: i64, requested: &str) -> String {
    if requested.is_empty() {
        format!("/personal-drive/jobs/{job_id}/checkpoints")
    } else {
        requested.to_owned()
    }
}

fn log_path(job_id: i64) -> String {
    format!("/personal-drive/jobs/{job_id}/logs")
}
