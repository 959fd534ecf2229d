use std::collections::HashMap;

use serde::Deserialize;

use crate::model::entity::job::{GpuAccess, JobType, VolumeMount};

/// A job creation request as received from the API layer. Everything but
/// name, namespace and image is optional.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct JobRequest {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub job_type: Option<JobType>,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: String,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    #[serde(default)]
    pub gpu_count: i32,
    #[serde(default)]
    pub gpu_access: GpuAccess,
    #[serde(default)]
    pub cpu_request: String,
    #[serde(default)]
    pub memory_request: String,
    #[serde(default)]
    pub mpi_processes: i32,
    #[serde(default)]
    pub output_path: String,
    #[serde(default)]
    pub checkpoint_path: String,
    #[serde(default)]
    pub enable_checkpoint: bool,
    #[serde(default)]
    pub checkpoint_interval: u32,
    #[serde(default)]
    pub volumes: Vec<VolumeMount>,
}
