use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use dashmap::DashMap;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use domain::model::entity::job::{Job, JobLog, JobStatus, JobType};
use domain::model::vo::cluster::ClusterJobSpec;
use domain::repository::JobRepository;
use domain::service::{ClusterClient, Executor};

const COMPLETION_POLL: Duration = Duration::from_secs(3);
const LOG_POLL: Duration = Duration::from_secs(2);

/// Percentage of GPU compute granted to a shared-access job; one shared
/// unit is a tenth of a device. Enforcement happens on the node via MPS.
const MPS_THREAD_PERCENTAGE_ENV: &str = "CUDA_MPS_ACTIVE_THREAD_PERCENTAGE";

/// Realizes a job record as a cluster workload. Submission returns as soon
/// as the cluster accepts the job object; a completion watcher and a log
/// follower then keep the record consistent with cluster reality.
pub struct KubernetesExecutor {
    cluster: Arc<dyn ClusterClient>,
    repo: Arc<dyn JobRepository>,
    shutdown: CancellationToken,
    /// Per-job watcher scopes; cancelled by `cancel` and, transitively, by
    /// process shutdown.
    watchers: DashMap<i64, CancellationToken>,
}

impl KubernetesExecutor {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        repo: Arc<dyn JobRepository>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            cluster,
            repo,
            shutdown,
            watchers: DashMap::new(),
        }
    }

    fn build_spec(job: &Job) -> ClusterJobSpec {
        let mut command = job.decoded_command();
        command.extend(job.decoded_args());

        let mut env = job.decoded_env_vars();
        if job.uses_mps() {
            env.insert(
                MPS_THREAD_PERCENTAGE_ENV.to_owned(),
                (i64::from(job.gpu_count.max(0)) * 10).to_string(),
            );
        }

        ClusterJobSpec::builder()
            .name(job.cluster_job_name.clone())
            .namespace(job.namespace.clone())
            .image(job.image.clone())
            .command(command)
            .working_dir(job.working_dir.clone())
            .gpu_count(job.gpu_count)
            .gpu_access(job.gpu_access)
            .cpu_request(job.cpu_request.clone())
            .memory_request(job.memory_request.clone())
            .env(env)
            .build()
    }

    async fn mark_running(&self, job_id: i64) -> anyhow::Result<()> {
        let mut job = self
            .repo
            .find_by_id(job_id)
            .await?
            .with_context(|| format!("job {job_id} not found"))?;
        job.status = JobStatus::Running;
        if job.started_at.is_none() {
            job.started_at = Some(Utc::now());
        }
        self.repo.update(&job).await
    }

    fn spawn_watchers(&self, job: &Job) {
        let token = self.shutdown.child_token();
        if let Some(stale) = self.watchers.insert(job.id, token.clone()) {
            // a restarted job replaces its previous watcher scope
            stale.cancel();
        }

        tokio::spawn(watch_completion(
            self.cluster.clone(),
            self.repo.clone(),
            token.clone(),
            job.id,
            job.namespace.clone(),
            job.cluster_job_name.clone(),
        ));
        tokio::spawn(follow_logs(
            self.cluster.clone(),
            self.repo.clone(),
            token,
            job.id,
            job.namespace.clone(),
            job.cluster_job_name.clone(),
        ));
    }
}

#[async_trait::async_trait]
impl Executor for KubernetesExecutor {
    async fn execute(&self, job: &Job) -> anyhow::Result<()> {
        let spec = Self::build_spec(job);
        self.cluster
            .create_job(&spec)
            .await
            .with_context(|| format!("submit job {} to cluster", job.id))?;

        if let Err(e) = self.mark_running(job.id).await {
            tracing::warn!(job_id = job.id, "update job record after submit: {e:#}");
        }

        self.spawn_watchers(job);
        Ok(())
    }

    async fn cancel(&self, job_id: i64) -> anyhow::Result<()> {
        let mut job = self
            .repo
            .find_by_id(job_id)
            .await?
            .with_context(|| format!("job {job_id} not found"))?;

        self.cluster.delete_job(&job.namespace, &job.cluster_job_name).await?;
        if let Some((_, token)) = self.watchers.remove(&job_id) {
            token.cancel();
        }

        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        self.repo.update(&job).await
    }

    async fn status(&self, job_id: i64) -> anyhow::Result<JobStatus> {
        let job = self
            .repo
            .find_by_id(job_id)
            .await?
            .with_context(|| format!("job {job_id} not found"))?;
        Ok(job.status)
    }

    async fn logs(&self, job_id: i64) -> anyhow::Result<String> {
        let logs = self.repo.find_logs(job_id).await?;
        Ok(logs.into_iter().map(|entry| entry.content).collect::<Vec<_>>().join("\n"))
    }

    fn supports(&self, job_type: JobType) -> bool {
        matches!(job_type, JobType::Normal | JobType::Gpu)
    }
}

/// Polls the cluster job until it reports a terminal pod count, then writes
/// the outcome and the collected pod logs back through the repository.
async fn watch_completion(
    cluster: Arc<dyn ClusterClient>,
    repo: Arc<dyn JobRepository>,
    token: CancellationToken,
    job_id: i64,
    namespace: String,
    name: String,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(COMPLETION_POLL) => {}
        }

        let status = match cluster.job_status(&namespace, &name).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(job_id, "poll cluster job: {e:#}");
                continue;
            }
        };
        let Some(outcome) = status.terminal_status() else {
            continue;
        };

        let logs = collect_logs(cluster.as_ref(), &namespace, &name).await;

        match repo.find_by_id(job_id).await {
            Ok(Some(mut job)) if !job.is_terminal() => {
                job.status = outcome;
                job.completed_at = Some(Utc::now());
                if let Err(e) = repo.update(&job).await {
                    tracing::error!(job_id, "persist final job status: {e:#}");
                }
                tracing::info!(job_id, status = %outcome, "cluster job finished");
            }
            // cancellation beat us to the terminal state; leave it alone
            Ok(Some(_)) => {}
            Ok(None) => tracing::warn!(job_id, "job record vanished while watching"),
            Err(e) => tracing::error!(job_id, "reload job on completion: {e:#}"),
        }

        if !logs.is_empty() {
            let entry = JobLog {
                id: 0,
                job_id,
                content: logs,
            };
            if let Err(e) = repo.save_log(entry).await {
                tracing::warn!(job_id, "persist collected logs: {e:#}");
            }
        }
        return;
    }
}

async fn collect_logs(cluster: &dyn ClusterClient, namespace: &str, name: &str) -> String {
    let pods = match cluster.job_pods(namespace, name).await {
        Ok(pods) => pods,
        Err(e) => {
            tracing::warn!("list pods for logs: {e:#}");
            return String::new();
        }
    };

    let mut combined = String::new();
    for pod in pods {
        match cluster.pod_logs(namespace, &pod).await {
            Ok(text) => combined.push_str(&text),
            Err(e) => tracing::warn!(%pod, "read pod log: {e:#}"),
        }
    }
    combined
}

/// Waits for a pod of the job to show up, then follows its log stream,
/// appending every line as a log entry. Single-shot: once a stream closes
/// the follower exits and does not re-attach to pod restarts.
async fn follow_logs(
    cluster: Arc<dyn ClusterClient>,
    repo: Arc<dyn JobRepository>,
    token: CancellationToken,
    job_id: i64,
    namespace: String,
    name: String,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(LOG_POLL) => {}
        }

        let pod = match cluster.find_job_pod(&namespace, &name).await {
            Ok(Some(pod)) => pod,
            Ok(None) => continue,
            Err(e) => {
                tracing::debug!(job_id, "locate pod for log follow: {e:#}");
                continue;
            }
        };

        let mut stream = match cluster.follow_pod_logs(&namespace, &pod).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::debug!(job_id, %pod, "open log stream: {e:#}");
                continue;
            }
        };

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                line = stream.next() => match line {
                    Some(Ok(line)) => {
                        let entry = JobLog {
                            id: 0,
                            job_id,
                            content: line,
                        };
                        if let Err(e) = repo.save_log(entry).await {
                            tracing::warn!(job_id, "persist log line: {e:#}");
                        }
                    }
                    Some(Err(e)) => {
                        tracing::debug!(job_id, %pod, "log stream read: {e}");
                        return;
                    }
                    None => return,
                }
            }
        }
    }
}
