//! Per-(store, product) stock ledger.
//!
//! There is no reservation ledger: stock is decremented at approval time,
//! not order-creation time. Two concurrently created orders can both pass
//! validation against the same stock; the decrement itself re-checks
//! non-negativity at write time (quantity predicate in the UPDATE), so the
//! losing approval fails with an itemized `InsufficientStock` instead of
//! overselling.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{enums::StockMovementReason, order, order_item, product, stock_record},
    errors::{ServiceError, StockShortage},
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub ok: bool,
    pub shortages: Vec<StockShortage>,
}

/// A (product, quantity) pair, the unit of delta computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemQuantity {
    pub product_id: Uuid,
    pub quantity: i32,
}

impl From<&order_item::Model> for ItemQuantity {
    fn from(item: &order_item::Model) -> Self {
        Self {
            product_id: item.product_id,
            quantity: item.quantity,
        }
    }
}

/// Per-product quantity deltas between two item sets. Quantities for the
/// same product are summed within each set first; products whose net delta
/// is zero are omitted, so an unchanged item set produces an empty map.
pub fn compute_item_deltas(old: &[ItemQuantity], new: &[ItemQuantity]) -> BTreeMap<Uuid, i64> {
    let mut deltas: BTreeMap<Uuid, i64> = BTreeMap::new();
    for item in new {
        *deltas.entry(item.product_id).or_default() += i64::from(item.quantity);
    }
    for item in old {
        *deltas.entry(item.product_id).or_default() -= i64::from(item.quantity);
    }
    deltas.retain(|_, delta| *delta != 0);
    deltas
}

#[derive(Clone)]
pub struct StockService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl StockService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Current on-hand quantity; a missing record is quantity zero.
    pub async fn quantity_on_hand(
        &self,
        store_id: Uuid,
        product_id: Uuid,
    ) -> Result<i32, ServiceError> {
        let record = self.find_record(store_id, product_id).await?;
        Ok(record.map(|r| r.quantity).unwrap_or(0))
    }

    /// Compares every line item of the order against current stock. Never
    /// mutates state; shortages are itemized per product.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn validate_availability(
        &self,
        order_id: Uuid,
    ) -> Result<AvailabilityReport, ServiceError> {
        let db = &*self.db;

        let order = order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(db)
            .await?;

        self.validate_availability_for_items(
            order.store_id,
            &items.iter().map(ItemQuantity::from).collect::<Vec<_>>(),
        )
        .await
    }

    /// Availability check against already-loaded items, used by the approval
    /// orchestrator to avoid re-reading the order.
    pub async fn validate_availability_for_items(
        &self,
        store_id: Uuid,
        items: &[ItemQuantity],
    ) -> Result<AvailabilityReport, ServiceError> {
        let db = &*self.db;
        let mut shortages = Vec::new();

        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let skus: BTreeMap<Uuid, String> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|p| (p.id, p.sku))
            .collect();

        for item in items {
            let available = self.quantity_on_hand(store_id, item.product_id).await?;
            if item.quantity > available {
                shortages.push(StockShortage {
                    product_id: item.product_id,
                    sku: skus
                        .get(&item.product_id)
                        .cloned()
                        .unwrap_or_else(|| item.product_id.to_string()),
                    required: item.quantity,
                    available,
                });
            }
        }

        Ok(AvailabilityReport {
            ok: shortages.is_empty(),
            shortages,
        })
    }

    /// Applies a stock movement.
    ///
    /// * `consume` decrements by `quantity` (must be positive); fails with
    ///   `InsufficientStock` if the result would go negative.
    /// * `restore` increments by `quantity` (must be positive),
    ///   unconditionally.
    /// * `adjust` applies `quantity` as a signed delta under the same
    ///   non-negativity guard.
    ///
    /// Records are created lazily on first write and never deleted. The
    /// non-negativity check runs at write time: the UPDATE carries a
    /// `quantity >= needed` predicate, so a concurrent racer cannot drive
    /// the value below zero between our read and write.
    ///
    /// Returns the new quantity.
    #[instrument(skip(self), fields(store_id = %store_id, product_id = %product_id, quantity, reason = %reason))]
    pub async fn apply(
        &self,
        store_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        reason: StockMovementReason,
        actor: Option<Uuid>,
    ) -> Result<i32, ServiceError> {
        let delta = match reason {
            StockMovementReason::Consume => {
                if quantity <= 0 {
                    return Err(ServiceError::ValidationError(
                        "consume quantity must be positive".to_string(),
                    ));
                }
                -quantity
            }
            StockMovementReason::Restore => {
                if quantity <= 0 {
                    return Err(ServiceError::ValidationError(
                        "restore quantity must be positive".to_string(),
                    ));
                }
                quantity
            }
            StockMovementReason::Adjust => {
                if quantity == 0 {
                    return Err(ServiceError::ValidationError(
                        "adjustment delta must not be zero".to_string(),
                    ));
                }
                quantity
            }
        };

        let db = &*self.db;
        let now = Utc::now();
        let existing = self.find_record(store_id, product_id).await?;

        let (old_quantity, new_quantity) = match existing {
            None => {
                if delta < 0 {
                    return Err(self.shortage_error(product_id, -delta, 0).await);
                }
                let record = stock_record::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    store_id: Set(store_id),
                    product_id: Set(product_id),
                    quantity: Set(delta),
                    updated_by: Set(actor),
                    created_at: Set(now),
                    updated_at: Set(Some(now)),
                };
                record.insert(db).await?;
                (0, delta)
            }
            Some(record) => {
                let mut update = stock_record::Entity::update_many()
                    .col_expr(
                        stock_record::Column::Quantity,
                        Expr::col(stock_record::Column::Quantity).add(delta),
                    )
                    .col_expr(stock_record::Column::UpdatedAt, Expr::value(now))
                    .col_expr(stock_record::Column::UpdatedBy, Expr::value(actor))
                    .filter(stock_record::Column::Id.eq(record.id));

                if delta < 0 {
                    update = update.filter(stock_record::Column::Quantity.gte(-delta));
                }

                let result = update.exec(db).await?;
                if result.rows_affected == 0 {
                    let available = self.quantity_on_hand(store_id, product_id).await?;
                    return Err(self.shortage_error(product_id, -delta, available).await);
                }

                let fresh = self.quantity_on_hand(store_id, product_id).await?;
                (record.quantity, fresh)
            }
        };

        info!(old_quantity, new_quantity, "stock movement applied");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::StockApplied {
                    store_id,
                    product_id,
                    old_quantity,
                    new_quantity,
                    reason: reason.to_string(),
                })
                .await
            {
                warn!(error = %e, "failed to send stock event");
            }
        }

        Ok(new_quantity)
    }

    /// Applies only the per-product delta between an order's old and new
    /// item sets, so a quantity reduced from 10 to 7 releases exactly 3
    /// units. A delta that would drive stock negative fails that product;
    /// the caller must treat a mid-loop failure as a signal to halt; deltas
    /// already applied are not rolled back automatically.
    #[instrument(skip(self, old_items, new_items), fields(order_id = %order_id, store_id = %store_id))]
    pub async fn modify_reservation(
        &self,
        order_id: Uuid,
        old_items: &[ItemQuantity],
        new_items: &[ItemQuantity],
        store_id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let deltas = compute_item_deltas(old_items, new_items);
        if deltas.is_empty() {
            return Ok(());
        }

        for (product_id, delta) in deltas {
            let quantity = i32::try_from(delta.abs()).map_err(|_| {
                ServiceError::ValidationError(format!(
                    "quantity delta for product {} out of range",
                    product_id
                ))
            })?;
            let reason = if delta > 0 {
                // The order now needs more than before.
                StockMovementReason::Consume
            } else {
                StockMovementReason::Restore
            };
            self.apply(store_id, product_id, quantity, reason, actor)
                .await?;
        }

        Ok(())
    }

    async fn find_record(
        &self,
        store_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<stock_record::Model>, ServiceError> {
        Ok(stock_record::Entity::find()
            .filter(stock_record::Column::StoreId.eq(store_id))
            .filter(stock_record::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?)
    }

    async fn shortage_error(&self, product_id: Uuid, required: i32, available: i32) -> ServiceError {
        let sku = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await
            .ok()
            .flatten()
            .map(|p| p.sku)
            .unwrap_or_else(|| product_id.to_string());

        ServiceError::InsufficientStock {
            shortages: vec![StockShortage {
                product_id,
                sku,
                required,
                available,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product_id: Uuid, quantity: i32) -> ItemQuantity {
        ItemQuantity {
            product_id,
            quantity,
        }
    }

    #[test]
    fn identical_item_sets_produce_no_deltas() {
        let p = Uuid::new_v4();
        let items = vec![item(p, 10)];
        assert!(compute_item_deltas(&items, &items).is_empty());
    }

    #[test]
    fn reduced_quantity_releases_only_the_difference() {
        let p = Uuid::new_v4();
        let deltas = compute_item_deltas(&[item(p, 10)], &[item(p, 7)]);
        assert_eq!(deltas.get(&p), Some(&-3));
    }

    #[test]
    fn added_and_removed_products_appear_with_full_quantities() {
        let removed = Uuid::new_v4();
        let added = Uuid::new_v4();
        let deltas = compute_item_deltas(&[item(removed, 4)], &[item(added, 6)]);
        assert_eq!(deltas.get(&removed), Some(&-4));
        assert_eq!(deltas.get(&added), Some(&6));
    }

    #[test]
    fn duplicate_lines_for_a_product_are_summed() {
        let p = Uuid::new_v4();
        let deltas = compute_item_deltas(&[item(p, 2), item(p, 3)], &[item(p, 8)]);
        assert_eq!(deltas.get(&p), Some(&3));
    }
}
