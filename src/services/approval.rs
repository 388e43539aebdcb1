//! The order approval saga.
//!
//! The status transition to `approved` is the single fatal commit point.
//! Everything before it (order/store validation, stock availability) aborts
//! with no state change; everything after it is enrichment that commits
//! independently: balance bookkeeping, stock consumption, kitchen sheet,
//! delivery, invoice, notification. An enrichment failure is logged and
//! reported as a missing artifact; it is never allowed to roll back an
//! order the store has already been told is approved. Missing artifacts are
//! regenerable: the generators are idempotent by order id.

use std::sync::Arc;

use lazy_static::lazy_static;
use prometheus::IntCounter;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        delivery, delivery_note,
        enums::{NotificationKind, OrderStatus, StockMovementReason},
        invoice, kitchen_sheet, order, order_item, store,
    },
    errors::{ServiceError, StockShortage},
    events::{Event, EventSender},
    services::{
        deliveries::DeliveryService,
        invoicing::InvoicingService,
        kitchen::KitchenService,
        notifications::NotificationService,
        order_status::{self, OrderStatusService},
        stock::{ItemQuantity, StockService},
        stores::StoreService,
    },
};

lazy_static! {
    static ref ORDER_APPROVALS: IntCounter = IntCounter::new(
        "order_approvals_total",
        "Total number of successful order approvals"
    )
    .expect("metric can be created");
    static ref ORDER_APPROVAL_REJECTIONS: IntCounter = IntCounter::new(
        "order_approval_rejections_total",
        "Total number of order approvals rejected before the commit point"
    )
    .expect("metric can be created");
    static ref APPROVAL_ENRICHMENT_FAILURES: IntCounter = IntCounter::new(
        "approval_enrichment_failures_total",
        "Total number of best-effort approval steps that failed"
    )
    .expect("metric can be created");
}

/// The approved order plus whichever enrichment artifacts were produced.
/// A `None` artifact means that step failed and can be regenerated.
#[derive(Debug, Serialize)]
pub struct ApprovalOutcome {
    pub order: order::Model,
    pub kitchen_sheet: Option<kitchen_sheet::Model>,
    pub delivery: Option<delivery::Model>,
    pub delivery_note: Option<delivery_note::Model>,
    pub invoice: Option<invoice::Model>,
    /// Products whose stock consumption failed after the order was already
    /// committed as approved.
    pub stock_shortfalls: Vec<StockShortage>,
    pub store_notified: bool,
}

#[derive(Clone)]
pub struct ApprovalService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
    invoice_due_days: i64,
}

impl ApprovalService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Option<Arc<EventSender>>,
        invoice_due_days: i64,
    ) -> Self {
        Self {
            db,
            event_sender,
            invoice_due_days,
        }
    }

    /// Approves an order and fans out to stock consumption and document
    /// generation.
    #[instrument(skip(self), fields(order_id = %order_id, actor = %actor))]
    pub async fn approve_order(
        &self,
        order_id: Uuid,
        actor: Uuid,
    ) -> Result<ApprovalOutcome, ServiceError> {
        let db = &*self.db;

        // ---- Fatal phase: nothing below may run unless all of this holds.

        let order = order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;

        let status = order_status::parse_status(&order.status)?;
        if !status.is_editable() {
            ORDER_APPROVAL_REJECTIONS.inc();
            return Err(ServiceError::StateConflict(format!(
                "order {} cannot be approved from status '{}'",
                order_id, status
            )));
        }

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(db)
            .await?;
        if items.is_empty() {
            ORDER_APPROVAL_REJECTIONS.inc();
            return Err(ServiceError::ValidationError(format!(
                "order {} has no items",
                order_id
            )));
        }

        let store = store::Entity::find_by_id(order.store_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Store", order.store_id))?;
        if !store.is_active {
            ORDER_APPROVAL_REJECTIONS.inc();
            return Err(ServiceError::ValidationError(format!(
                "store {} is inactive",
                store.id
            )));
        }

        let stock = StockService::new(self.db.clone(), self.event_sender.clone());
        let quantities: Vec<ItemQuantity> = items.iter().map(ItemQuantity::from).collect();
        let report = stock
            .validate_availability_for_items(order.store_id, &quantities)
            .await?;
        if !report.ok {
            ORDER_APPROVAL_REJECTIONS.inc();
            return Err(ServiceError::InsufficientStock {
                shortages: report.shortages,
            });
        }

        // The commit point. A concurrent approval loses here with a
        // StateConflict from the compare-and-swap.
        let order = OrderStatusService::new(self.db.clone())
            .transition(order_id, OrderStatus::Approved, Some(actor))
            .await?;
        ORDER_APPROVALS.inc();
        info!(order_number = %order.order_number, "order approved; running enrichment steps");

        // ---- Best-effort phase. The order stays approved no matter what
        // happens below.

        if let Err(e) = StoreService::new(self.db.clone())
            .increase_balance(order.store_id, order.final_amount)
            .await
        {
            APPROVAL_ENRICHMENT_FAILURES.inc();
            warn!(error = %e, "failed to increase store balance; reconcilable from payment records");
        }

        let mut stock_shortfalls = Vec::new();
        for item in &items {
            match stock
                .apply(
                    order.store_id,
                    item.product_id,
                    item.quantity,
                    StockMovementReason::Consume,
                    Some(actor),
                )
                .await
            {
                Ok(_) => {}
                Err(ServiceError::InsufficientStock { shortages }) => {
                    APPROVAL_ENRICHMENT_FAILURES.inc();
                    warn!(
                        product_id = %item.product_id,
                        "stock raced to insufficient after validation; consumption skipped"
                    );
                    stock_shortfalls.extend(shortages);
                }
                Err(e) => {
                    APPROVAL_ENRICHMENT_FAILURES.inc();
                    warn!(
                        product_id = %item.product_id,
                        error = %e,
                        "failed to consume stock for line item"
                    );
                }
            }
        }

        let kitchen_sheet = match KitchenService::new(self.db.clone(), self.event_sender.clone())
            .generate_for_order(order_id)
            .await
        {
            Ok((sheet, _items)) => Some(sheet),
            Err(e) => {
                APPROVAL_ENRICHMENT_FAILURES.inc();
                warn!(error = %e, "failed to generate kitchen sheet");
                None
            }
        };

        let (delivery, delivery_note) =
            match DeliveryService::new(self.db.clone(), self.event_sender.clone())
                .generate_for_order(order_id)
                .await
            {
                Ok((delivery, note)) => (Some(delivery), Some(note)),
                Err(e) => {
                    APPROVAL_ENRICHMENT_FAILURES.inc();
                    warn!(error = %e, "failed to generate delivery");
                    (None, None)
                }
            };

        let invoice = match InvoicingService::new(
            self.db.clone(),
            self.event_sender.clone(),
            self.invoice_due_days,
        )
        .generate_for_order(order_id)
        .await
        {
            Ok(invoice) => Some(invoice),
            Err(e) => {
                APPROVAL_ENRICHMENT_FAILURES.inc();
                warn!(error = %e, "failed to generate invoice");
                None
            }
        };

        let store_notified = match NotificationService::new(self.db.clone())
            .send(
                store.id,
                NotificationKind::OrderApproved,
                format!(
                    "Order {} has been approved for delivery",
                    order.order_number
                ),
                Some(json!({
                    "order_id": order.id,
                    "order_number": order.order_number,
                    "final_amount": order.final_amount,
                })),
            )
            .await
        {
            Ok(_) => true,
            Err(e) => {
                APPROVAL_ENRICHMENT_FAILURES.inc();
                warn!(error = %e, "failed to notify store of approval");
                false
            }
        };

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::OrderApproved {
                    order_id,
                    store_id: order.store_id,
                    final_amount: order.final_amount,
                })
                .await
            {
                warn!(error = %e, "failed to send order approved event");
            }
        }

        Ok(ApprovalOutcome {
            order,
            kitchen_sheet,
            delivery,
            delivery_note,
            invoice,
            stock_shortfalls,
            store_notified,
        })
    }

    /// Re-runs the idempotent document generators for an approved order,
    /// backfilling whichever of the kitchen sheet, delivery, and invoice are
    /// missing.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn regenerate_documents(
        &self,
        order_id: Uuid,
    ) -> Result<ApprovalOutcome, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;

        let status = order_status::parse_status(&order.status)?;
        if !matches!(status, OrderStatus::Approved | OrderStatus::Completed) {
            return Err(ServiceError::StateConflict(format!(
                "documents can only be regenerated for approved orders; order {} is '{}'",
                order_id, status
            )));
        }

        let (kitchen_sheet, _) = KitchenService::new(self.db.clone(), self.event_sender.clone())
            .generate_for_order(order_id)
            .await
            .map(|(s, i)| (Some(s), i))
            .unwrap_or_else(|e| {
                warn!(error = %e, "kitchen sheet regeneration failed");
                (None, Vec::new())
            });

        let (delivery, delivery_note) =
            match DeliveryService::new(self.db.clone(), self.event_sender.clone())
                .generate_for_order(order_id)
                .await
            {
                Ok((d, n)) => (Some(d), Some(n)),
                Err(e) => {
                    warn!(error = %e, "delivery regeneration failed");
                    (None, None)
                }
            };

        let invoice = InvoicingService::new(
            self.db.clone(),
            self.event_sender.clone(),
            self.invoice_due_days,
        )
        .generate_for_order(order_id)
        .await
        .map(Some)
        .unwrap_or_else(|e| {
            warn!(error = %e, "invoice regeneration failed");
            None
        });

        Ok(ApprovalOutcome {
            order,
            kitchen_sheet,
            delivery,
            delivery_note,
            invoice,
            stock_shortfalls: Vec::new(),
            store_notified: false,
        })
    }
}
