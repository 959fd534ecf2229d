use chrono::Utc;
use domain::model::entity::job::JobStatus;
use domain::model::entity::{Job, JobCheckpoint, JobLog};
use domain::repository::JobRepository;

use crate::infrastructure::database::JsonDb;

#[async_trait::async_trait]
impl JobRepository for JsonDb {
    async fn create(&self, mut job: Job) -> anyhow::Result<Job> {
        {
            let mut jobs = self.jobs.lock().await;
            job.id = jobs.iter().map(|j| j.id).max().unwrap_or(0) + 1;
            job.created_at = Utc::now();
            job.updated_at = job.created_at;
            jobs.push(job.clone());
        }
        self.save_changed().await?;
        Ok(job)
    }

    async fn update(&self, job: &Job) -> anyhow::Result<()> {
        {
            let mut jobs = self.jobs.lock().await;
            let slot = jobs
                .iter_mut()
                .find(|j| j.id == job.id)
                .ok_or_else(|| anyhow::anyhow!("no job with id {}", job.id))?;
            *slot = Job {
                updated_at: Utc::now(),
                ..job.clone()
            };
        }
        self.save_changed().await
    }

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<Job>> {
        Ok(self.jobs.lock().await.iter().find(|j| j.id == id).cloned())
    }

    async fn find_all(&self) -> anyhow::Result<Vec<Job>> {
        Ok(self.jobs.lock().await.clone())
    }

    async fn find_by_user(&self, user_id: i64) -> anyhow::Result<Vec<Job>> {
        Ok(self.jobs.lock().await.iter().filter(|j| j.user_id == user_id).cloned().collect())
    }

    async fn find_by_project(&self, project_id: i64) -> anyhow::Result<Vec<Job>> {
        Ok(self
            .jobs
            .lock()
            .await
            .iter()
            .filter(|j| j.project_id == Some(project_id))
            .cloned()
            .collect())
    }

    async fn queued_jobs(&self) -> anyhow::Result<Vec<Job>> {
        Ok(self
            .jobs
            .lock()
            .await
            .iter()
            .filter(|j| j.status == JobStatus::Queued)
            .cloned()
            .collect())
    }

    async fn save_log(&self, mut entry: JobLog) -> anyhow::Result<()> {
        {
            let mut logs = self.job_logs.lock().await;
            entry.id = logs.iter().map(|l| l.id).max().unwrap_or(0) + 1;
            logs.push(entry);
        }
        self.save_changed().await
    }

    async fn find_logs(&self, job_id: i64) -> anyhow::Result<Vec<JobLog>> {
        Ok(self
            .job_logs
            .lock()
            .await
            .iter()
            .filter(|l| l.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn find_checkpoints(&self, job_id: i64) -> anyhow::Result<Vec<JobCheckpoint>> {
        Ok(self
            .job_checkpoints
            .lock()
            .await
            .iter()
            .filter(|c| c.job_id == job_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn scratch_db(tag: &str) -> JsonDb {
        let dir = std::env::temp_dir().join(format!("control-plane-{tag}-{}", std::process::id()));
        let _ = tokio::fs::remove_dir_all(&dir).await;
        JsonDb::new(dir.to_str().unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn create_assigns_monotonic_ids() {
        let db = scratch_db("ids").await;
        let first = db.create(Job::default()).await.unwrap();
        let second = db.create(Job::default()).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
    }

    #[tokio::test]
    async fn jobs_survive_a_reopen() {
        let dir = std::env::temp_dir().join(format!("control-plane-reopen-{}", std::process::id()));
        let _ = tokio::fs::remove_dir_all(&dir).await;
        let path = dir.to_str().unwrap().to_owned();

        let db = JsonDb::new(&path).await.unwrap();
        let job = db
            .create(Job {
                name: "train".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        drop(db);

        let reopened = JsonDb::new(&path).await.unwrap();
        let found = reopened.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(found.name, "train");
    }

    #[tokio::test]
    async fn queued_jobs_filters_by_status() {
        let db = scratch_db("queued").await;
        db.create(Job::default()).await.unwrap();
        let mut running = db.create(Job::default()).await.unwrap();
        running.status = JobStatus::Running;
        db.update(&running).await.unwrap();

        let queued = db.queued_jobs().await.unwrap();
        assert_eq!(queued.len(), 1);
    }

    #[tokio::test]
    async fn logs_append_in_order() {
        let db = scratch_db("logs").await;
        for n in 1..=3 {
            db.save_log(JobLog {
                id: 0,
                job_id: 9,
                content: format!("line {n}"),
            })
            .await
            .unwrap();
        }
        let logs = db.find_logs(9).await.unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[2].content, "line 3");
        assert_eq!(logs[2].id, 3);
    }
}
