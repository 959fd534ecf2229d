use std::path::{Path, PathBuf};

use domain::model::entity::{Job, JobCheckpoint, JobLog, Project, User};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

/// JSON-file backed tables. Users and projects are seeded externally and
/// only read here; jobs, logs and checkpoints are flushed after every
/// mutation.
pub struct JsonDb {
    pub(in crate::infrastructure) jobs: Mutex<Vec<Job>>,
    pub(in crate::infrastructure) job_logs: Mutex<Vec<JobLog>>,
    pub(in crate::infrastructure) job_checkpoints: Mutex<Vec<JobCheckpoint>>,
    pub(in crate::infrastructure) users: Mutex<Vec<User>>,
    pub(in crate::infrastructure) projects: Mutex<Vec<Project>>,
    save_dir: PathBuf,
}

impl JsonDb {
    pub async fn new(save_dir: &str) -> anyhow::Result<Self> {
        let save_dir = PathBuf::from(save_dir);
        tokio::fs::create_dir_all(&save_dir).await?;
        Ok(Self {
            jobs: Mutex::new(load(&save_dir.join("jobs.json")).await?),
            job_logs: Mutex::new(load(&save_dir.join("job_logs.json")).await?),
            job_checkpoints: Mutex::new(load(&save_dir.join("job_checkpoints.json")).await?),
            users: Mutex::new(load(&save_dir.join("users.json")).await?),
            projects: Mutex::new(load(&save_dir.join("projects.json")).await?),
            save_dir,
        })
    }

    pub(in crate::infrastructure) async fn save_changed(&self) -> anyhow::Result<()> {
        store(&self.save_dir.join("jobs.json"), &*self.jobs.lock().await).await?;
        store(&self.save_dir.join("job_logs.json"), &*self.job_logs.lock().await).await?;
        store(
            &self.save_dir.join("job_checkpoints.json"),
            &*self.job_checkpoints.lock().await,
        )
        .await?;
        Ok(())
    }
}

async fn load<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(_) => Ok(Vec::new()),
    }
}

async fn store<T: Serialize>(path: &Path, table: &[T]) -> anyhow::Result<()> {
    let json = serde_json::to_vec(table)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}
