use domain::model::entity::Project;
use domain::repository::ProjectStore;

use crate::infrastructure::database::JsonDb;

#[async_trait::async_trait]
impl ProjectStore for JsonDb {
    async fn project_by_id(&self, id: i64) -> anyhow::Result<Option<Project>> {
        Ok(self.projects.lock().await.iter().find(|p| p.id == id).cloned())
    }
}
