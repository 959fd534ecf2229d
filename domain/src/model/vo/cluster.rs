use std::collections::HashMap;

use typed_builder::TypedBuilder;

use crate::model::entity::job::{GpuAccess, JobStatus};

/// Everything the cluster API needs to materialize one job.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ClusterJobSpec {
    pub name: String,
    pub namespace: String,
    pub image: String,
    #[builder(default)]
    pub command: Vec<String>,
    #[builder(default = String::from("low-priority"))]
    pub priority_class: String,
    #[builder(default = 1)]
    pub parallelism: i32,
    #[builder(default = 1)]
    pub completions: i32,
    #[builder(default)]
    pub working_dir: String,
    #[builder(default)]
    pub volumes: Vec<VolumeSpec>,
    #[builder(default)]
    pub gpu_count: i32,
    #[builder(default)]
    pub gpu_access: GpuAccess,
    #[builder(default)]
    pub cpu_request: String,
    #[builder(default)]
    pub memory_request: String,
    #[builder(default)]
    pub env: HashMap<String, String>,
    #[builder(default)]
    pub annotations: HashMap<String, String>,
}

/// A volume backed by either a PVC or a host path.
#[derive(Debug, Default, Clone)]
pub struct VolumeSpec {
    pub name: String,
    pub pvc_name: String,
    pub host_path: String,
    pub mount_path: String,
}

/// Pod counters reported by the cluster for one job object.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClusterJobStatus {
    pub active: i32,
    pub succeeded: i32,
    pub failed: i32,
}

impl ClusterJobStatus {
    /// Terminal outcome, if the cluster has reached one.
    pub fn terminal_status(self) -> Option<JobStatus> {
        if self.succeeded > 0 {
            Some(JobStatus::Completed)
        } else if self.failed > 0 {
            Some(JobStatus::Failed)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeded_wins_over_failed() {
        let status = ClusterJobStatus {
            active: 0,
            succeeded: 1,
            failed: 1,
        };
        assert_eq!(status.terminal_status(), Some(JobStatus::Completed));
    }

    #[test]
    fn active_job_has_no_outcome() {
        let status = ClusterJobStatus {
            active: 1,
            ..Default::default()
        };
        assert_eq!(status.terminal_status(), None);
    }

    #[test]
    fn spec_builder_defaults() {
        let spec = ClusterJobSpec::builder()
            .name("train-1".into())
            .namespace("12-lab".into())
            .image("pytorch:latest".into())
            .build();
        assert_eq!(spec.priority_class, "low-priority");
        assert_eq!(spec.parallelism, 1);
        assert_eq!(spec.completions, 1);
        assert!(spec.env.is_empty());
    }
}
