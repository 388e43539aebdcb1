use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{delivery, delivery_note, enums::DeliveryStatus, order},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Deliveries progress strictly forward.
pub fn is_valid_delivery_transition(from: DeliveryStatus, to: DeliveryStatus) -> bool {
    use DeliveryStatus::*;
    matches!(
        (from, to),
        (Pending, Assigned) | (Assigned, InTransit) | (InTransit, Delivered)
    )
}

/// Fields that may accompany a status update.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DeliveryUpdate {
    pub assigned_to: Option<Uuid>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub temperature_celsius: Option<Decimal>,
    pub proof_reference: Option<String>,
}

#[derive(Clone)]
pub struct DeliveryService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl DeliveryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Generates the delivery record and its delivery note for an order.
    /// Idempotent by order id; a delivery missing its note gets the note
    /// backfilled.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn generate_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<(delivery::Model, delivery_note::Model), ServiceError> {
        let db = &*self.db;

        let order = order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;

        if let Some(existing) = delivery::Entity::find()
            .filter(delivery::Column::OrderId.eq(order_id))
            .one(db)
            .await?
        {
            debug!(delivery_id = %existing.id, "delivery already exists");
            let note = self.find_or_create_note(&existing, &order.order_number).await?;
            return Ok((existing, note));
        }

        let now = Utc::now();
        let model = delivery::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(DeliveryStatus::Pending.to_string()),
            assigned_to: Set(None),
            scheduled_for: Set(None),
            delivered_at: Set(None),
            temperature_celsius: Set(None),
            proof_reference: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };
        let created = model.insert(db).await?;
        let note = self.find_or_create_note(&created, &order.order_number).await?;

        info!(delivery_id = %created.id, "delivery generated");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::DeliveryGenerated {
                    order_id,
                    delivery_id: created.id,
                })
                .await
            {
                warn!(error = %e, "failed to send delivery generated event");
            }
        }

        Ok((created, note))
    }

    pub async fn get_delivery(&self, delivery_id: Uuid) -> Result<delivery::Model, ServiceError> {
        delivery::Entity::find_by_id(delivery_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Delivery", delivery_id))
    }

    pub async fn get_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<delivery::Model>, ServiceError> {
        Ok(delivery::Entity::find()
            .filter(delivery::Column::OrderId.eq(order_id))
            .one(&*self.db)
            .await?)
    }

    /// Progresses the delivery. Arrival (`delivered`) stamps the actual
    /// time and captures the temperature reading and proof-of-delivery
    /// reference if supplied.
    #[instrument(skip(self, update), fields(delivery_id = %delivery_id, to = %to))]
    pub async fn update_status(
        &self,
        delivery_id: Uuid,
        to: DeliveryStatus,
        update: DeliveryUpdate,
    ) -> Result<delivery::Model, ServiceError> {
        let db = &*self.db;
        let existing = self.get_delivery(delivery_id).await?;

        let from = DeliveryStatus::from_str(&existing.status).map_err(|_| {
            ServiceError::InternalError(format!(
                "delivery carries unknown status '{}'",
                existing.status
            ))
        })?;

        if !is_valid_delivery_transition(from, to) {
            return Err(ServiceError::StateConflict(format!(
                "cannot transition delivery {} from '{}' to '{}'",
                delivery_id, from, to
            )));
        }

        let now = Utc::now();
        let mut active: delivery::ActiveModel = existing.into();
        active.status = Set(to.to_string());
        active.updated_at = Set(Some(now));
        if let Some(assignee) = update.assigned_to {
            active.assigned_to = Set(Some(assignee));
        }
        if let Some(scheduled) = update.scheduled_for {
            active.scheduled_for = Set(Some(scheduled));
        }
        if to == DeliveryStatus::Delivered {
            active.delivered_at = Set(Some(now));
            if let Some(temp) = update.temperature_celsius {
                active.temperature_celsius = Set(Some(temp));
            }
            if let Some(proof) = update.proof_reference {
                active.proof_reference = Set(Some(proof));
            }
        }

        let updated = active.update(db).await?;
        info!(old_status = %from, new_status = %to, "delivery status updated");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::DeliveryStatusChanged {
                    delivery_id,
                    old_status: from.to_string(),
                    new_status: to.to_string(),
                })
                .await
            {
                warn!(error = %e, "failed to send delivery status event");
            }
        }

        Ok(updated)
    }

    async fn find_or_create_note(
        &self,
        delivery: &delivery::Model,
        order_number: &str,
    ) -> Result<delivery_note::Model, ServiceError> {
        if let Some(note) = delivery_note::Entity::find()
            .filter(delivery_note::Column::DeliveryId.eq(delivery.id))
            .one(&*self.db)
            .await?
        {
            return Ok(note);
        }

        let note = delivery_note::ActiveModel {
            id: Set(Uuid::new_v4()),
            delivery_id: Set(delivery.id),
            note_number: Set(format!("DN-{}", order_number)),
            issued_at: Set(Utc::now()),
        };
        Ok(note.insert(&*self.db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeliveryStatus::*;

    #[test]
    fn deliveries_progress_strictly_forward() {
        assert!(is_valid_delivery_transition(Pending, Assigned));
        assert!(is_valid_delivery_transition(Assigned, InTransit));
        assert!(is_valid_delivery_transition(InTransit, Delivered));
    }

    #[test]
    fn no_skipping_or_reversing() {
        assert!(!is_valid_delivery_transition(Pending, InTransit));
        assert!(!is_valid_delivery_transition(Pending, Delivered));
        assert!(!is_valid_delivery_transition(Assigned, Pending));
        assert!(!is_valid_delivery_transition(Delivered, InTransit));
        assert!(!is_valid_delivery_transition(Delivered, Delivered));
    }
}
