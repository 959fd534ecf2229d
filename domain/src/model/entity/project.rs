use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::GpuAccess;

/// A research project with resource quotas. Owned by the identity service;
/// this core only reads it during admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub group_id: i64,
    /// GPU quota in integer units; one dedicated GPU costs
    /// [`DEDICATED_UNIT_WEIGHT`](super::job::DEDICATED_UNIT_WEIGHT) units.
    pub gpu_quota: i64,
    /// Comma-separated allow-list of access tiers, e.g. `"shared,dedicated"`.
    pub gpu_access: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Project {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: String::new(),
            description: String::new(),
            group_id: 0,
            gpu_quota: 0,
            gpu_access: "shared".into(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Project {
    pub fn allows_access(&self, access: GpuAccess) -> bool {
        self.gpu_access
            .split(',')
            .any(|tag| tag.trim().eq_ignore_ascii_case(&access.to_string()))
    }

    pub fn has_gpu_quota(&self) -> bool {
        self.gpu_quota > 0
    }
}
