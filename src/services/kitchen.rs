use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        enums::KitchenSheetStatus,
        kitchen_sheet, kitchen_sheet_item, order_item,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Kitchen preparation worklists. One sheet per approved order; items are
/// prepared individually and the sheet completes when the last item flips.
#[derive(Clone)]
pub struct KitchenService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl KitchenService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Generates the kitchen sheet for an order. Idempotent by order id: if
    /// a sheet already exists it is returned unchanged, so missing sheets
    /// can be backfilled by re-running generation.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn generate_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<(kitchen_sheet::Model, Vec<kitchen_sheet_item::Model>), ServiceError> {
        let db = &*self.db;

        if let Some(existing) = kitchen_sheet::Entity::find()
            .filter(kitchen_sheet::Column::OrderId.eq(order_id))
            .one(db)
            .await?
        {
            debug!(sheet_id = %existing.id, "kitchen sheet already exists");
            let items = self.load_sheet_items(existing.id).await?;
            return Ok((existing, items));
        }

        let order_items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(db)
            .await?;
        if order_items.is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "order {} has no items to prepare",
                order_id
            )));
        }

        let now = Utc::now();
        let sheet_id = Uuid::new_v4();
        let sheet = kitchen_sheet::ActiveModel {
            id: Set(sheet_id),
            order_id: Set(order_id),
            status: Set(KitchenSheetStatus::Pending.to_string()),
            created_at: Set(now),
            completed_at: Set(None),
        };
        let sheet = sheet.insert(db).await?;

        for line in &order_items {
            let item = kitchen_sheet_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                sheet_id: Set(sheet_id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                prepared: Set(false),
                batch_number: Set(None),
                expiry_date: Set(None),
                prepared_by: Set(None),
                prepared_at: Set(None),
            };
            item.insert(db).await?;
        }

        info!(sheet_id = %sheet_id, items = order_items.len(), "kitchen sheet generated");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::KitchenSheetGenerated { order_id, sheet_id })
                .await
            {
                warn!(error = %e, "failed to send kitchen sheet event");
            }
        }

        let items = self.load_sheet_items(sheet_id).await?;
        Ok((sheet, items))
    }

    pub async fn get_sheet(
        &self,
        sheet_id: Uuid,
    ) -> Result<(kitchen_sheet::Model, Vec<kitchen_sheet_item::Model>), ServiceError> {
        let sheet = kitchen_sheet::Entity::find_by_id(sheet_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Kitchen sheet", sheet_id))?;
        let items = self.load_sheet_items(sheet_id).await?;
        Ok((sheet, items))
    }

    /// Marks one item prepared, capturing batch number and expiry date as
    /// labeled by the kitchen. Already-prepared items are returned
    /// unchanged. Completes the parent sheet once no unprepared items
    /// remain.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn mark_item_prepared(
        &self,
        item_id: Uuid,
        actor: Uuid,
        batch_number: Option<String>,
        expiry_date: Option<NaiveDate>,
    ) -> Result<kitchen_sheet_item::Model, ServiceError> {
        let db = &*self.db;

        let item = kitchen_sheet_item::Entity::find_by_id(item_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Kitchen sheet item", item_id))?;

        if item.prepared {
            debug!("item already prepared");
            return Ok(item);
        }

        let sheet_id = item.sheet_id;
        let mut active: kitchen_sheet_item::ActiveModel = item.into();
        active.prepared = Set(true);
        active.batch_number = Set(batch_number);
        active.expiry_date = Set(expiry_date);
        active.prepared_by = Set(Some(actor));
        active.prepared_at = Set(Some(Utc::now()));
        let updated = active.update(db).await?;

        let remaining = kitchen_sheet_item::Entity::find()
            .filter(kitchen_sheet_item::Column::SheetId.eq(sheet_id))
            .filter(kitchen_sheet_item::Column::Prepared.eq(false))
            .count(db)
            .await?;

        if remaining == 0 {
            self.complete_sheet(sheet_id).await?;
        }

        info!(sheet_id = %sheet_id, remaining, "kitchen sheet item prepared");
        Ok(updated)
    }

    async fn complete_sheet(&self, sheet_id: Uuid) -> Result<(), ServiceError> {
        let sheet = kitchen_sheet::Entity::find_by_id(sheet_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Kitchen sheet", sheet_id))?;

        if sheet.status == KitchenSheetStatus::Completed.to_string() {
            return Ok(());
        }

        let mut active: kitchen_sheet::ActiveModel = sheet.into();
        active.status = Set(KitchenSheetStatus::Completed.to_string());
        active.completed_at = Set(Some(Utc::now()));
        active.update(&*self.db).await?;

        info!(sheet_id = %sheet_id, "kitchen sheet completed");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::KitchenSheetCompleted(sheet_id)).await {
                warn!(error = %e, "failed to send kitchen sheet completed event");
            }
        }
        Ok(())
    }

    async fn load_sheet_items(
        &self,
        sheet_id: Uuid,
    ) -> Result<Vec<kitchen_sheet_item::Model>, ServiceError> {
        Ok(kitchen_sheet_item::Entity::find()
            .filter(kitchen_sheet_item::Column::SheetId.eq(sheet_id))
            .all(&*self.db)
            .await?)
    }
}
