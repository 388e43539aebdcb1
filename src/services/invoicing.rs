use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        enums::{OrderStatus, PaymentStatus},
        invoice, order, payment,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::order_status,
};

/// Derives an invoice's payment status from the authoritative payment
/// ledger: paid once cumulative payments cover the total, partial while
/// something has been paid, overdue when unpaid past the due date.
pub fn derive_payment_status(
    paid: Decimal,
    total: Decimal,
    due_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> PaymentStatus {
    if paid >= total {
        PaymentStatus::Paid
    } else if paid > Decimal::ZERO {
        PaymentStatus::Partial
    } else if now > due_date {
        PaymentStatus::Overdue
    } else {
        PaymentStatus::Pending
    }
}

/// Fallback due-date horizon when no configured value applies.
pub const DEFAULT_DUE_DAYS: i64 = 14;

#[derive(Clone)]
pub struct InvoicingService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
    due_days: i64,
}

impl InvoicingService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Option<Arc<EventSender>>,
        due_days: i64,
    ) -> Self {
        Self {
            db,
            event_sender,
            due_days,
        }
    }

    /// Generates the invoice for an approved order. Idempotent by order id:
    /// an existing invoice is returned unchanged, so an
    /// approved-but-uninvoiced order can be retried at any time.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn generate_for_order(&self, order_id: Uuid) -> Result<invoice::Model, ServiceError> {
        let db = &*self.db;

        if let Some(existing) = self.get_by_order(order_id).await? {
            debug!(invoice_id = %existing.id, "invoice already exists");
            return Ok(existing);
        }

        let order = order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;

        let status = order_status::parse_status(&order.status)?;
        if !matches!(status, OrderStatus::Approved | OrderStatus::Completed) {
            return Err(ServiceError::StateConflict(format!(
                "cannot invoice order {} in status '{}'",
                order_id, status
            )));
        }

        let now = Utc::now();
        let sequence = invoice::Entity::find().count(db).await? + 1;
        let model = invoice::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            invoice_number: Set(format_invoice_number(now.year(), sequence)),
            subtotal: Set(order.subtotal),
            discount_amount: Set(order.discount_amount),
            return_amount: Set(Decimal::ZERO),
            total_amount: Set(order.final_amount),
            due_date: Set(now + Duration::days(self.due_days)),
            payment_status: Set(PaymentStatus::Pending.to_string()),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        let created = model.insert(db).await?;
        info!(invoice_id = %created.id, invoice_number = %created.invoice_number, "invoice generated");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::InvoiceGenerated {
                    order_id,
                    invoice_id: created.id,
                })
                .await
            {
                warn!(error = %e, "failed to send invoice generated event");
            }
        }

        Ok(created)
    }

    pub async fn get_invoice(&self, invoice_id: Uuid) -> Result<invoice::Model, ServiceError> {
        invoice::Entity::find_by_id(invoice_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Invoice", invoice_id))
    }

    pub async fn get_by_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<invoice::Model>, ServiceError> {
        Ok(invoice::Entity::find()
            .filter(invoice::Column::OrderId.eq(order_id))
            .one(&*self.db)
            .await?)
    }

    /// Cumulative completed payments against an invoice, folded from the
    /// append-only payment rows.
    pub async fn paid_total(&self, invoice_id: Uuid) -> Result<Decimal, ServiceError> {
        let payments = payment::Entity::find()
            .filter(payment::Column::InvoiceId.eq(invoice_id))
            .all(&*self.db)
            .await?;
        Ok(payments.iter().map(|p| p.amount).sum())
    }

    /// Adds a return credit to the invoice and recomputes the total
    /// (floored at zero) and the payment status.
    #[instrument(skip(self), fields(invoice_id = %invoice_id, %return_amount))]
    pub async fn apply_return_adjustment(
        &self,
        invoice_id: Uuid,
        return_amount: Decimal,
    ) -> Result<invoice::Model, ServiceError> {
        if return_amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "return amount must be positive".to_string(),
            ));
        }

        let existing = self.get_invoice(invoice_id).await?;
        let cumulative_returns = existing.return_amount + return_amount;
        let total = (existing.subtotal - existing.discount_amount - cumulative_returns)
            .max(Decimal::ZERO);

        let paid = self.paid_total(invoice_id).await?;
        let now = Utc::now();
        let status = derive_payment_status(paid, total, existing.due_date, now);

        let mut active: invoice::ActiveModel = existing.into();
        active.return_amount = Set(cumulative_returns);
        active.total_amount = Set(total);
        active.payment_status = Set(status.to_string());
        active.updated_at = Set(Some(now));

        let updated = active.update(&*self.db).await?;
        info!(total = %updated.total_amount, "invoice adjusted for returns");
        Ok(updated)
    }
}

fn format_invoice_number(year: i32, sequence: u64) -> String {
    format!("INV-{}-{:06}", year, sequence)
}
