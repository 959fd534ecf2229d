use anyhow::Context;
use domain::model::entity::job::GpuAccess;
use domain::model::vo::cluster::{ClusterJobSpec, ClusterJobStatus, VolumeSpec};
use domain::service::{ClusterClient, LogStream};
use futures::{AsyncBufReadExt, StreamExt};
use k8s_openapi::api::batch::v1::{Job as BatchJob, JobSpec as BatchJobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, HostPathVolumeSource, PersistentVolumeClaimVolumeSource, Pod, PodSpec,
    PodTemplateSpec, ResourceRequirements, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams};
use kube::Client;

/// Pod phases a log follower may attach to.
const KNOWN_POD_PHASES: [&str; 4] = ["Running", "Pending", "Succeeded", "Failed"];

/// `ClusterClient` over the Kubernetes API: batch jobs, their pods, and pod
/// logs.
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn jobs(&self, namespace: &str) -> Api<BatchJob> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl ClusterClient for KubeCluster {
    async fn create_job(&self, spec: &ClusterJobSpec) -> anyhow::Result<()> {
        let job = build_job(spec);
        self.jobs(&spec.namespace)
            .create(&PostParams::default(), &job)
            .await
            .with_context(|| format!("create cluster job {}/{}", spec.namespace, spec.name))?;
        Ok(())
    }

    async fn job_status(&self, namespace: &str, name: &str) -> anyhow::Result<ClusterJobStatus> {
        let job = self.jobs(namespace).get(name).await?;
        let status = job.status.unwrap_or_default();
        Ok(ClusterJobStatus {
            active: status.active.unwrap_or(0),
            succeeded: status.succeeded.unwrap_or(0),
            failed: status.failed.unwrap_or(0),
        })
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> anyhow::Result<()> {
        self.jobs(namespace)
            .delete(name, &DeleteParams::foreground())
            .await
            .with_context(|| format!("delete cluster job {namespace}/{name}"))?;
        Ok(())
    }

    async fn job_pods(&self, namespace: &str, job_name: &str) -> anyhow::Result<Vec<String>> {
        let pods = self
            .pods(namespace)
            .list(&ListParams::default().labels(&format!("job-name={job_name}")))
            .await?;
        Ok(pods.items.into_iter().filter_map(|pod| pod.metadata.name).collect())
    }

    async fn find_job_pod(
        &self,
        namespace: &str,
        job_name: &str,
    ) -> anyhow::Result<Option<String>> {
        let pods = self
            .pods(namespace)
            .list(&ListParams::default().labels(&format!("job-name={job_name}")))
            .await?;
        Ok(pods
            .items
            .into_iter()
            .filter(|pod| {
                pod.status
                    .as_ref()
                    .and_then(|status| status.phase.as_deref())
                    .is_some_and(|phase| KNOWN_POD_PHASES.contains(&phase))
            })
            .find_map(|pod| pod.metadata.name))
    }

    async fn pod_logs(&self, namespace: &str, pod_name: &str) -> anyhow::Result<String> {
        let logs = self.pods(namespace).logs(pod_name, &LogParams::default()).await?;
        Ok(logs)
    }

    async fn follow_pod_logs(
        &self,
        namespace: &str,
        pod_name: &str,
    ) -> anyhow::Result<LogStream> {
        let reader = self
            .pods(namespace)
            .log_stream(
                pod_name,
                &LogParams {
                    follow: true,
                    ..LogParams::default()
                },
            )
            .await
            .with_context(|| format!("open log stream for pod {namespace}/{pod_name}"))?;
        Ok(reader.lines().boxed())
    }
}

fn build_job(spec: &ClusterJobSpec) -> BatchJob {
    let mut volumes = Vec::new();
    let mut volume_mounts = Vec::new();
    for volume in &spec.volumes {
        volumes.push(build_volume(volume));
        volume_mounts.push(VolumeMount {
            name: volume.name.clone(),
            mount_path: volume.mount_path.clone(),
            ..Default::default()
        });
    }

    let env: Vec<EnvVar> = spec
        .env
        .iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            value_from: None,
        })
        .collect();

    let container = Container {
        name: spec.name.clone(),
        image: Some(spec.image.clone()),
        command: (!spec.command.is_empty()).then(|| spec.command.clone()),
        working_dir: (!spec.working_dir.is_empty()).then(|| spec.working_dir.clone()),
        env: (!env.is_empty()).then_some(env),
        volume_mounts: (!volume_mounts.is_empty()).then_some(volume_mounts),
        resources: Some(build_resources(spec)),
        ..Default::default()
    };

    BatchJob {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            namespace: Some(spec.namespace.clone()),
            ..Default::default()
        },
        spec: Some(BatchJobSpec {
            parallelism: Some(spec.parallelism),
            completions: Some(spec.completions),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    annotations: (!spec.annotations.is_empty())
                        .then(|| spec.annotations.clone().into_iter().collect()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("OnFailure".to_owned()),
                    priority_class_name: (!spec.priority_class.is_empty())
                        .then(|| spec.priority_class.clone()),
                    volumes: (!volumes.is_empty()).then_some(volumes),
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

fn build_volume(volume: &VolumeSpec) -> Volume {
    let mut built = Volume {
        name: volume.name.clone(),
        ..Default::default()
    };
    if !volume.pvc_name.is_empty() {
        built.persistent_volume_claim = Some(PersistentVolumeClaimVolumeSource {
            claim_name: volume.pvc_name.clone(),
            read_only: None,
        });
    } else if !volume.host_path.is_empty() {
        built.host_path = Some(HostPathVolumeSource {
            path: volume.host_path.clone(),
            type_: None,
        });
    }
    built
}

fn build_resources(spec: &ClusterJobSpec) -> ResourceRequirements {
    let mut limits = std::collections::BTreeMap::new();
    let mut requests = std::collections::BTreeMap::new();

    if spec.gpu_count > 0 {
        let resource_name = match spec.gpu_access {
            GpuAccess::Shared => "nvidia.com/gpu.shared",
            _ => "nvidia.com/gpu",
        };
        let quantity = Quantity(spec.gpu_count.to_string());
        limits.insert(resource_name.to_owned(), quantity.clone());
        requests.insert(resource_name.to_owned(), quantity);
    }
    if !spec.cpu_request.is_empty() {
        requests.insert("cpu".to_owned(), Quantity(spec.cpu_request.clone()));
    }
    if !spec.memory_request.is_empty() {
        requests.insert("memory".to_owned(), Quantity(spec.memory_request.clone()));
    }

    ResourceRequirements {
        limits: (!limits.is_empty()).then_some(limits),
        requests: (!requests.is_empty()).then_some(requests),
        ..Default::default()
    }
}
