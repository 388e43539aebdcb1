use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{invoice, order, payment},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{invoicing::derive_payment_status, stores::StoreService},
};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    /// Either the invoice or its order may be referenced.
    pub invoice_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub amount: Decimal,
    #[validate(length(min = 1, max = 50))]
    pub method: String,
    pub transaction_ref: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentReceipt {
    pub payment: payment::Model,
    pub invoice: invoice::Model,
}

/// Append-only payment ledger. Payment rows are immutable (corrections are
/// new payments), and the cumulative bound is enforced by folding over the
/// rows rather than trusting a denormalized counter.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl PaymentService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Records a payment against an invoice (referenced directly or via its
    /// order). Rejects non-positive amounts and amounts that would push the
    /// cumulative paid total past the invoice total; in that case no
    /// payment row is created. Recomputes the invoice payment status and
    /// decrements the store's running balance, floored at zero.
    #[instrument(skip(self, request), fields(amount = %request.amount))]
    pub async fn record_payment(
        &self,
        request: RecordPaymentRequest,
    ) -> Result<PaymentReceipt, ServiceError> {
        request.validate()?;

        if request.amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "payment amount must be positive".to_string(),
            ));
        }

        let db = &*self.db;
        let invoice = match (request.invoice_id, request.order_id) {
            (Some(invoice_id), _) => invoice::Entity::find_by_id(invoice_id)
                .one(db)
                .await?
                .ok_or_else(|| ServiceError::not_found("Invoice", invoice_id))?,
            (None, Some(order_id)) => invoice::Entity::find()
                .filter(invoice::Column::OrderId.eq(order_id))
                .one(db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("invoice for order {} not found", order_id))
                })?,
            (None, None) => {
                return Err(ServiceError::ValidationError(
                    "either invoice_id or order_id must be provided".to_string(),
                ))
            }
        };

        let paid = self.paid_total(invoice.id).await?;
        if paid + request.amount > invoice.total_amount {
            return Err(ServiceError::ValidationError(format!(
                "payment of {} would exceed invoice total {}; outstanding amount is {}",
                request.amount,
                invoice.total_amount,
                (invoice.total_amount - paid).max(Decimal::ZERO)
            )));
        }

        let now = Utc::now();
        let model = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_id: Set(invoice.id),
            amount: Set(request.amount),
            method: Set(request.method),
            status: Set("completed".to_string()),
            transaction_ref: Set(request.transaction_ref),
            created_at: Set(now),
        };
        let recorded = model.insert(db).await?;

        let new_paid = paid + recorded.amount;
        let status = derive_payment_status(new_paid, invoice.total_amount, invoice.due_date, now);

        let invoice_id = invoice.id;
        let order_id = invoice.order_id;
        let mut active: invoice::ActiveModel = invoice.into();
        active.payment_status = Set(status.to_string());
        active.updated_at = Set(Some(now));
        let invoice = active.update(db).await?;

        // The balance is reconcilable from the payment rows, so a failure
        // here is logged rather than surfaced.
        match order::Entity::find_by_id(order_id).one(db).await {
            Ok(Some(order)) => {
                if let Err(e) = StoreService::new(self.db.clone())
                    .decrease_balance(order.store_id, recorded.amount)
                    .await
                {
                    warn!(error = %e, store_id = %order.store_id, "failed to decrease store balance");
                }
            }
            Ok(None) => {
                warn!(order_id = %order_id, "invoiced order missing; store balance not adjusted")
            }
            Err(e) => warn!(error = %e, "failed to load order for balance adjustment"),
        }

        info!(
            payment_id = %recorded.id,
            invoice_id = %invoice_id,
            payment_status = %invoice.payment_status,
            "payment recorded"
        );

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::PaymentRecorded {
                    invoice_id,
                    amount: recorded.amount,
                })
                .await
            {
                warn!(error = %e, "failed to send payment recorded event");
            }
        }

        Ok(PaymentReceipt {
            payment: recorded,
            invoice,
        })
    }

    pub async fn list_for_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<payment::Model>, ServiceError> {
        Ok(payment::Entity::find()
            .filter(payment::Column::InvoiceId.eq(invoice_id))
            .order_by_asc(payment::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Cumulative paid amount, folded from the append-only rows.
    async fn paid_total(&self, invoice_id: Uuid) -> Result<Decimal, ServiceError> {
        let payments = payment::Entity::find()
            .filter(payment::Column::InvoiceId.eq(invoice_id))
            .all(&*self.db)
            .await?;
        Ok(payments.iter().map(|p| p.amount).sum())
    }
}
