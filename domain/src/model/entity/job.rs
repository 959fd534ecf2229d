use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quota units consumed by one dedicated GPU, relative to a shared one.
pub const DEDICATED_UNIT_WEIGHT: i64 = 10;

#[derive(
    Debug, Default, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum JobType {
    #[default]
    Normal,
    Gpu,
    Mpi,
}

#[derive(
    Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum JobStatus {
    #[default]
    Queued,
    Scheduling,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Dispatch tiers; ordering is the queue ordering.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum JobPriority {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(
    Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum GpuAccess {
    #[default]
    None,
    Shared,
    Dedicated,
}

impl GpuAccess {
    /// Weight of one GPU of this access tier in quota units.
    pub fn unit_weight(self) -> i64 {
        match self {
            Self::Dedicated => DEDICATED_UNIT_WEIGHT,
            _ => 1,
        }
    }

    pub fn quota_units(self, gpu_count: i32) -> i64 {
        i64::from(gpu_count.max(0)) * self.unit_weight()
    }
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
    #[serde(default)]
    pub read_only: bool,
}

/// A unit of user-submitted work, tracked from admission through cluster
/// execution. Command, args, env vars and volumes are stored as serialized
/// JSON text, as the persistence layer keeps them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub user_id: i64,
    pub project_id: Option<i64>,
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub status: JobStatus,
    pub job_type: JobType,
    pub priority: JobPriority,
    pub cluster_job_name: String,
    pub command: String,
    pub args: String,
    pub working_dir: String,
    pub env_vars: String,
    pub gpu_count: i32,
    pub gpu_access: GpuAccess,
    pub cpu_request: String,
    pub memory_request: String,
    pub mpi_processes: i32,
    pub output_path: String,
    pub checkpoint_path: String,
    pub log_path: String,
    pub enable_checkpoint: bool,
    pub checkpoint_interval: u32,
    pub volumes: String,
    pub restart_count: u32,
    pub exit_code: Option<i32>,
    pub error_message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Default for Job {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            user_id: 0,
            project_id: None,
            name: String::new(),
            namespace: String::new(),
            image: String::new(),
            status: JobStatus::default(),
            job_type: JobType::default(),
            priority: JobPriority::default(),
            cluster_job_name: String::new(),
            command: String::new(),
            args: String::new(),
            working_dir: String::new(),
            env_vars: String::new(),
            gpu_count: 0,
            gpu_access: GpuAccess::default(),
            cpu_request: String::new(),
            memory_request: String::new(),
            mpi_processes: 0,
            output_path: String::new(),
            checkpoint_path: String::new(),
            log_path: String::new(),
            enable_checkpoint: false,
            checkpoint_interval: 0,
            volumes: String::new(),
            restart_count: 0,
            exit_code: None,
            error_message: String::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_mpi(&self) -> bool {
        self.job_type == JobType::Mpi
    }

    pub fn requires_gpu(&self) -> bool {
        self.job_type == JobType::Gpu || self.gpu_count > 0
    }

    /// Shared GPU access is realized through MPS on the cluster side.
    pub fn uses_mps(&self) -> bool {
        self.gpu_access == GpuAccess::Shared
    }

    /// Unit-weighted GPU ask of this job.
    pub fn gpu_units(&self) -> i64 {
        self.gpu_access.quota_units(self.gpu_count)
    }

    pub fn decoded_command(&self) -> Vec<String> {
        decode_list(&self.command)
    }

    pub fn decoded_args(&self) -> Vec<String> {
        decode_list(&self.args)
    }

    pub fn decoded_env_vars(&self) -> HashMap<String, String> {
        serde_json::from_str(&self.env_vars).unwrap_or_default()
    }

    pub fn decoded_volumes(&self) -> Vec<VolumeMount> {
        serde_json::from_str(&self.volumes).unwrap_or_default()
    }
}

fn decode_list(text: &str) -> Vec<String> {
    serde_json::from_str(text).unwrap_or_default()
}

/// Append-only log chunk attached to a job; written by watchers, never
/// mutated afterwards.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct JobLog {
    pub id: i64,
    pub job_id: i64,
    pub content: String,
}

/// Checkpoint record written out-of-band by the executing workload and read
/// back for restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCheckpoint {
    pub id: i64,
    pub job_id: i64,
    pub sequence: u32,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_lowercase() {
        assert_eq!(JobStatus::Scheduling.to_string(), "scheduling");
        assert_eq!("cancelled".parse::<JobStatus>().unwrap(), JobStatus::Cancelled);
        assert_eq!(JobType::Gpu.to_string(), "gpu");
        assert_eq!("mpi".parse::<JobType>().unwrap(), JobType::Mpi);
    }

    #[test]
    fn priority_orders_low_to_high() {
        assert!(JobPriority::Low < JobPriority::Medium);
        assert!(JobPriority::Medium < JobPriority::High);
    }

    #[test]
    fn dedicated_gpu_is_ten_units() {
        assert_eq!(GpuAccess::Dedicated.quota_units(2), 20);
        assert_eq!(GpuAccess::Shared.quota_units(2), 2);
        assert_eq!(GpuAccess::None.quota_units(-1), 0);
    }

    #[test]
    fn decodes_serialized_columns() {
        let job = Job {
            command: r#"["python","train.py"]"#.into(),
            args: String::new(),
            env_vars: r#"{"EPOCHS":"10"}"#.into(),
            ..Default::default()
        };
        assert_eq!(job.decoded_command(), ["python", "train.py"]);
        assert!(job.decoded_args().is_empty());
        assert_eq!(job.decoded_env_vars()["EPOCHS"], "10");
    }
}
