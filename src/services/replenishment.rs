use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use lazy_static::lazy_static;
use prometheus::IntCounter;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{enums::OrderStatus, order, order_item, product, stock_record, store},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        orders::{CreateOrderRequest, OrderItemInput, OrderService},
        pricing::PriceMode,
    },
};

lazy_static! {
    static ref REPLENISHMENT_SWEEPS: IntCounter = IntCounter::new(
        "replenishment_sweeps_total",
        "Total number of replenishment sweeps"
    )
    .expect("metric can be created");
    static ref REPLENISHMENT_DRAFTS: IntCounter = IntCounter::new(
        "replenishment_drafts_created_total",
        "Total number of replenishment draft orders created"
    )
    .expect("metric can be created");
}

/// One product a store is short on.
#[derive(Debug, Clone, Serialize)]
pub struct ReplenishmentItem {
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub current_quantity: i32,
    pub min_stock_level: i32,
    pub suggested_quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Default, Serialize)]
pub struct ReplenishmentSummary {
    pub created_order_ids: Vec<Uuid>,
    pub stores_skipped: usize,
    pub stores_failed: usize,
}

/// Replenish to at least double the minimum, and never suggest less than
/// the minimum itself even from zero stock.
pub fn suggested_quantity(min_stock_level: i32, current: i32) -> i32 {
    (2 * min_stock_level - current).max(min_stock_level)
}

/// Scans store stock against product minimums and proposes draft reorders.
/// Only ever creates new drafts; existing orders are never mutated.
#[derive(Clone)]
pub struct ReplenishmentService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl ReplenishmentService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Flags every active product whose stock at the store sits below its
    /// minimum level.
    #[instrument(skip(self), fields(store_id = %store_id))]
    pub async fn check_store_needs(
        &self,
        store_id: Uuid,
    ) -> Result<Vec<ReplenishmentItem>, ServiceError> {
        let db = &*self.db;

        let products = product::Entity::find()
            .filter(product::Column::IsActive.eq(true))
            .all(db)
            .await?;

        let stock: HashMap<Uuid, i32> = stock_record::Entity::find()
            .filter(stock_record::Column::StoreId.eq(store_id))
            .all(db)
            .await?
            .into_iter()
            .map(|record| (record.product_id, record.quantity))
            .collect();

        let mut needs = Vec::new();
        for product in products {
            if product.min_stock_level <= 0 {
                continue;
            }
            let current = stock.get(&product.id).copied().unwrap_or(0);
            if current < product.min_stock_level {
                needs.push(ReplenishmentItem {
                    product_id: product.id,
                    sku: product.sku,
                    name: product.name,
                    current_quantity: current,
                    min_stock_level: product.min_stock_level,
                    suggested_quantity: suggested_quantity(product.min_stock_level, current),
                    unit_price: product.price,
                });
            }
        }

        Ok(needs)
    }

    /// Creates a draft reorder for the store's current needs, unless an open
    /// draft/pending order already covers any of the needed products; two
    /// proposals for the same product would otherwise pile up. Returns
    /// `None` when nothing was created.
    #[instrument(skip(self), fields(store_id = %store_id))]
    pub async fn generate_order(
        &self,
        store_id: Uuid,
    ) -> Result<Option<order::Model>, ServiceError> {
        let needs = self.check_store_needs(store_id).await?;
        if needs.is_empty() {
            return Ok(None);
        }

        let needed_products: HashSet<Uuid> = needs.iter().map(|n| n.product_id).collect();
        if self.has_open_overlapping_order(store_id, &needed_products).await? {
            info!("open order already covers needed products; skipping proposal");
            return Ok(None);
        }

        let request = CreateOrderRequest {
            store_id,
            items: needs
                .iter()
                .map(|need| OrderItemInput {
                    product_id: need.product_id,
                    quantity: need.suggested_quantity,
                    unit_price_override: None,
                })
                .collect(),
            discount_amount: None,
            notes: Some("Automatically generated replenishment order".to_string()),
            draft: true,
            auto_generated: true,
        };

        let details = OrderService::new(self.db.clone(), self.event_sender.clone())
            .create_order(request, PriceMode::Store)
            .await?;

        REPLENISHMENT_DRAFTS.inc();
        info!(
            order_id = %details.order.id,
            items = details.items.len(),
            "replenishment draft created"
        );

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::ReplenishmentDraftCreated {
                    store_id,
                    order_id: details.order.id,
                })
                .await
            {
                warn!(error = %e, "failed to send replenishment event");
            }
        }

        Ok(Some(details.order))
    }

    /// Sweeps every active store independently: one store failing is logged
    /// and does not abort the batch.
    #[instrument(skip(self))]
    pub async fn generate_all_orders(&self) -> Result<ReplenishmentSummary, ServiceError> {
        REPLENISHMENT_SWEEPS.inc();

        let stores = store::Entity::find()
            .filter(store::Column::IsActive.eq(true))
            .all(&*self.db)
            .await?;

        let mut summary = ReplenishmentSummary::default();
        for store in stores {
            match self.generate_order(store.id).await {
                Ok(Some(order)) => summary.created_order_ids.push(order.id),
                Ok(None) => summary.stores_skipped += 1,
                Err(e) => {
                    warn!(store_id = %store.id, error = %e, "replenishment failed for store");
                    summary.stores_failed += 1;
                }
            }
        }

        info!(
            created = summary.created_order_ids.len(),
            skipped = summary.stores_skipped,
            failed = summary.stores_failed,
            "replenishment sweep finished"
        );
        Ok(summary)
    }

    /// True when a draft/pending order for the store contains any of the
    /// given products.
    async fn has_open_overlapping_order(
        &self,
        store_id: Uuid,
        products: &HashSet<Uuid>,
    ) -> Result<bool, ServiceError> {
        let db = &*self.db;

        let open_orders = order::Entity::find()
            .filter(order::Column::StoreId.eq(store_id))
            .filter(
                order::Column::Status.is_in([
                    OrderStatus::Draft.to_string(),
                    OrderStatus::Pending.to_string(),
                ]),
            )
            .all(db)
            .await?;

        if open_orders.is_empty() {
            return Ok(false);
        }

        let order_ids: Vec<Uuid> = open_orders.iter().map(|o| o.id).collect();
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .all(db)
            .await?;

        Ok(items.iter().any(|item| products.contains(&item.product_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replenishes_to_double_the_minimum() {
        // min 10, current 4 -> 16 brings stock to 20.
        assert_eq!(suggested_quantity(10, 4), 16);
        assert_eq!(suggested_quantity(10, 0), 20);
    }

    #[test]
    fn never_suggests_less_than_the_minimum() {
        // min 10, current 9 -> the raw shortfall formula would say 11, but
        // current 15 would say 5; the floor keeps it at the minimum.
        assert_eq!(suggested_quantity(10, 9), 11);
        assert_eq!(suggested_quantity(4, 7), 4);
    }
}
