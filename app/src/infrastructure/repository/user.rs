use domain::model::entity::User;
use domain::repository::UserStore;

use crate::infrastructure::database::JsonDb;

#[async_trait::async_trait]
impl UserStore for JsonDb {
    async fn user_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        Ok(self.users.lock().await.iter().find(|u| u.id == id).cloned())
    }
}
