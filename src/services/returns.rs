use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        delivery,
        enums::{DeliveryStatus, ReturnReason, StockMovementReason},
        invoice, order, order_item, product, return_entity,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{invoicing::InvoicingService, stock::StockService},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnLineInput {
    pub product_id: Uuid,
    pub quantity: i32,
    pub reason: ReturnReason,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct ProcessedReturns {
    pub returns: Vec<return_entity::Model>,
    pub invoice: invoice::Model,
    /// Products whose stock restoration failed; the financial adjustment
    /// above already stands, restock is retriable via a manual adjustment.
    pub restock_failures: Vec<Uuid>,
}

/// Whether a line passes the expiry gate. A supplied expiry date must be
/// strictly before today, whatever the declared reason; without a date, only
/// the reason `expired` is accepted. Damaged and unsold goods therefore need
/// a past expiry date.
pub fn is_returnable(reason: ReturnReason, expiry_date: Option<NaiveDate>, today: NaiveDate) -> bool {
    match expiry_date {
        Some(expiry) => expiry < today,
        None => reason == ReturnReason::Expired,
    }
}

/// Post-delivery returns and wastage reconciliation.
#[derive(Clone)]
pub struct ReturnsService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

struct ReturnContext {
    order: order::Model,
    /// Order lines keyed by product, carrying the quantity and price
    /// actually charged.
    lines: HashMap<Uuid, order_item::Model>,
}

impl ReturnsService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Validates proposed returns against the delivered order. Problems are
    /// aggregated across all lines so the caller can report everything at
    /// once instead of fixing one error per round trip.
    #[instrument(skip(self, items), fields(delivery_id = %delivery_id, lines = items.len()))]
    pub async fn validate(
        &self,
        delivery_id: Uuid,
        items: &[ReturnLineInput],
    ) -> Result<(), ServiceError> {
        let context = self.load_context(delivery_id).await?;
        self.validate_lines(&context, items).await
    }

    /// Records the returns: inserts the immutable return rows, credits the
    /// invoice, and restores stock. The invoice must already exist; returns
    /// cannot be processed before invoicing. Stock restoration is
    /// best-effort per line; the ledger favors financial correctness over
    /// stock-count precision in that failure path.
    #[instrument(skip(self, items), fields(delivery_id = %delivery_id, lines = items.len()))]
    pub async fn process(
        &self,
        delivery_id: Uuid,
        items: &[ReturnLineInput],
        actor: Uuid,
    ) -> Result<ProcessedReturns, ServiceError> {
        let context = self.load_context(delivery_id).await?;
        self.validate_lines(&context, items).await?;

        let invoicing = InvoicingService::new(
            self.db.clone(),
            self.event_sender.clone(),
            crate::services::invoicing::DEFAULT_DUE_DAYS,
        );
        let invoice = invoicing
            .get_by_order(context.order.id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "invoice for order {} not found; returns cannot be processed before invoicing",
                    context.order.id
                ))
            })?;

        let db = &*self.db;
        let now = Utc::now();
        let mut recorded = Vec::with_capacity(items.len());
        let mut total_credit = rust_decimal::Decimal::ZERO;

        for line in items {
            // Validated above: the product is present in the order.
            let original = &context.lines[&line.product_id];
            let amount =
                crate::services::pricing::compute_line_total(line.quantity, original.unit_price);
            total_credit += amount;

            let row = return_entity::ActiveModel {
                id: Set(Uuid::new_v4()),
                delivery_id: Set(delivery_id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                reason: Set(line.reason.to_string()),
                batch_number: Set(line.batch_number.clone()),
                expiry_date: Set(line.expiry_date),
                unit_price: Set(original.unit_price),
                amount: Set(amount),
                created_by: Set(actor),
                created_at: Set(now),
            };
            recorded.push(row.insert(db).await?);
        }

        let invoice = invoicing
            .apply_return_adjustment(invoice.id, total_credit)
            .await?;

        let stock = StockService::new(self.db.clone(), self.event_sender.clone());
        let mut restock_failures = Vec::new();
        for line in items {
            if let Err(e) = stock
                .apply(
                    context.order.store_id,
                    line.product_id,
                    line.quantity,
                    StockMovementReason::Restore,
                    Some(actor),
                )
                .await
            {
                warn!(
                    error = %e,
                    product_id = %line.product_id,
                    "failed to restore stock for returned product"
                );
                restock_failures.push(line.product_id);
            }
        }

        info!(
            return_count = recorded.len(),
            credit = %total_credit,
            invoice_total = %invoice.total_amount,
            "returns processed"
        );

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::ReturnsRecorded {
                    delivery_id,
                    line_count: recorded.len(),
                    return_amount: total_credit,
                })
                .await
            {
                warn!(error = %e, "failed to send returns recorded event");
            }
        }

        Ok(ProcessedReturns {
            returns: recorded,
            invoice,
            restock_failures,
        })
    }

    pub async fn list_for_delivery(
        &self,
        delivery_id: Uuid,
    ) -> Result<Vec<return_entity::Model>, ServiceError> {
        Ok(return_entity::Entity::find()
            .filter(return_entity::Column::DeliveryId.eq(delivery_id))
            .all(&*self.db)
            .await?)
    }

    async fn load_context(&self, delivery_id: Uuid) -> Result<ReturnContext, ServiceError> {
        let db = &*self.db;

        let delivery = delivery::Entity::find_by_id(delivery_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Delivery", delivery_id))?;

        let status = DeliveryStatus::from_str(&delivery.status).map_err(|_| {
            ServiceError::InternalError(format!(
                "delivery carries unknown status '{}'",
                delivery.status
            ))
        })?;
        if status != DeliveryStatus::Delivered {
            return Err(ServiceError::StateConflict(format!(
                "returns require a delivered delivery; delivery {} is '{}'",
                delivery_id, status
            )));
        }

        let order = order::Entity::find_by_id(delivery.order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", delivery.order_id))?;

        let lines: HashMap<Uuid, order_item::Model> = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(db)
            .await?
            .into_iter()
            .map(|item| (item.product_id, item))
            .collect();

        Ok(ReturnContext { order, lines })
    }

    async fn validate_lines(
        &self,
        context: &ReturnContext,
        items: &[ReturnLineInput],
    ) -> Result<(), ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "at least one return line is required".to_string(),
            ));
        }

        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let skus: HashMap<Uuid, String> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p.sku))
            .collect();
        let label = |id: &Uuid| skus.get(id).cloned().unwrap_or_else(|| id.to_string());

        let today = Utc::now().date_naive();
        let mut errors = Vec::new();

        for line in items {
            if line.quantity <= 0 {
                errors.push(format!(
                    "{}: return quantity must be positive",
                    label(&line.product_id)
                ));
                continue;
            }

            match context.lines.get(&line.product_id) {
                None => {
                    errors.push(format!(
                        "{}: product is not part of order {}",
                        label(&line.product_id),
                        context.order.order_number
                    ));
                }
                Some(original) => {
                    if line.quantity > original.quantity {
                        errors.push(format!(
                            "{}: return quantity {} exceeds ordered quantity {}",
                            label(&line.product_id),
                            line.quantity,
                            original.quantity
                        ));
                    }
                }
            }

            if !is_returnable(line.reason, line.expiry_date, today) {
                errors.push(format!(
                    "{}: not returnable; reason '{}' requires an expiry date before {}",
                    label(&line.product_id),
                    line.reason,
                    today
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::ValidationErrors(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    #[test]
    fn past_expiry_date_is_returnable_regardless_of_reason() {
        let yesterday = today() - Duration::days(1);
        assert!(is_returnable(ReturnReason::Damaged, Some(yesterday), today()));
        assert!(is_returnable(ReturnReason::Unsold, Some(yesterday), today()));
        assert!(is_returnable(ReturnReason::Expired, Some(yesterday), today()));
    }

    #[test]
    fn expiry_today_or_later_is_not_strictly_past() {
        let tomorrow = today() + Duration::days(1);
        assert!(!is_returnable(ReturnReason::Expired, Some(today()), today()));
        assert!(!is_returnable(ReturnReason::Damaged, Some(tomorrow), today()));
    }

    #[test]
    fn without_expiry_only_the_expired_reason_passes() {
        assert!(is_returnable(ReturnReason::Expired, None, today()));
        assert!(!is_returnable(ReturnReason::Damaged, None, today()));
        assert!(!is_returnable(ReturnReason::Unsold, None, today()));
    }
}
