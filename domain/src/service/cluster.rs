use futures::stream::BoxStream;

use crate::model::vo::cluster::{ClusterJobSpec, ClusterJobStatus};

/// Lines emitted by a followed pod log, until the stream closes.
pub type LogStream = BoxStream<'static, std::io::Result<String>>;

/// The narrow slice of the cluster API this core consumes: job objects,
/// their pods, and pod logs.
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync {
    async fn create_job(&self, spec: &ClusterJobSpec) -> anyhow::Result<()>;
    async fn job_status(&self, namespace: &str, name: &str) -> anyhow::Result<ClusterJobStatus>;
    /// Deletes the job and, cascading in the foreground, its pods.
    async fn delete_job(&self, namespace: &str, name: &str) -> anyhow::Result<()>;
    /// Names of all pods belonging to the job, any phase.
    async fn job_pods(&self, namespace: &str, job_name: &str) -> anyhow::Result<Vec<String>>;
    /// First pod of the job observed in a known phase, if any.
    async fn find_job_pod(&self, namespace: &str, job_name: &str)
        -> anyhow::Result<Option<String>>;
    async fn pod_logs(&self, namespace: &str, pod_name: &str) -> anyhow::Result<String>;
    async fn follow_pod_logs(&self, namespace: &str, pod_name: &str)
        -> anyhow::Result<LogStream>;
}
