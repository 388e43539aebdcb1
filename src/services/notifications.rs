use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{enums::NotificationKind, notification},
    errors::ServiceError,
};

/// Persists notifications for store users. Actual delivery (email/SMS) is a
/// collaborator consuming these rows; from the core's perspective sending is
/// fire-and-forget and callers treat failures as log-and-continue.
#[derive(Clone)]
pub struct NotificationService {
    db: Arc<DatabaseConnection>,
}

impl NotificationService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, message, data), fields(recipient_id = %recipient_id, kind = %kind))]
    pub async fn send(
        &self,
        recipient_id: Uuid,
        kind: NotificationKind,
        message: String,
        data: Option<serde_json::Value>,
    ) -> Result<notification::Model, ServiceError> {
        let model = notification::ActiveModel {
            id: Set(Uuid::new_v4()),
            recipient_id: Set(recipient_id),
            kind: Set(kind.to_string()),
            message: Set(message),
            data: Set(data),
            read: Set(false),
            created_at: Set(Utc::now()),
        };

        let created = model.insert(&*self.db).await.map_err(|e| {
            ServiceError::UpstreamFailure(format!("notification store rejected the message: {}", e))
        })?;
        info!(notification_id = %created.id, "notification dispatched");
        Ok(created)
    }

    pub async fn list_for_recipient(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<notification::Model>, ServiceError> {
        Ok(notification::Entity::find()
            .filter(notification::Column::RecipientId.eq(recipient_id))
            .order_by_desc(notification::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn mark_read(&self, notification_id: Uuid) -> Result<notification::Model, ServiceError> {
        let existing = notification::Entity::find_by_id(notification_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Notification", notification_id))?;

        let mut active: notification::ActiveModel = existing.into();
        active.read = Set(true);
        Ok(active.update(&*self.db).await?)
    }
}
