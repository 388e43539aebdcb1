use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        enums::OrderStatus,
        order, order_item, product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        order_status::{self, OrderStatusService},
        pricing::{self, PriceMode},
        stores::StoreService,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    /// Honored only for operator-entered orders.
    pub unit_price_override: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub store_id: Uuid,
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemInput>,
    pub discount_amount: Option<Decimal>,
    pub notes: Option<String>,
    /// Create as an editable draft instead of submitting for approval.
    #[serde(default)]
    pub draft: bool,
    /// Set by the replenishment planner; never accepted from clients.
    #[serde(skip)]
    pub auto_generated: bool,
}

#[derive(Debug, Serialize)]
pub struct OrderDetails {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Debug, Serialize)]
pub struct OrderListPage {
    pub orders: Vec<order::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Service for order intake and item-set modification. Approval runs through
/// the approval orchestrator, not here.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a new order with its line items in one transaction.
    #[instrument(skip(self, request), fields(store_id = %request.store_id))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
        price_mode: PriceMode,
    ) -> Result<OrderDetails, ServiceError> {
        request.validate()?;
        for item in &request.items {
            item.validate()?;
        }

        let store = StoreService::new(self.db.clone())
            .get_active_store(request.store_id)
            .await?;

        let db = &*self.db;
        let products = self.load_active_products(&request.items).await?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let status = if request.draft {
            OrderStatus::Draft
        } else {
            OrderStatus::Pending
        };

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(generate_order_number()),
            store_id: Set(store.id),
            status: Set(status.to_string()),
            subtotal: Set(Decimal::ZERO),
            discount_amount: Set(Decimal::ZERO),
            final_amount: Set(Decimal::ZERO),
            notes: Set(request.notes),
            auto_generated: Set(request.auto_generated),
            approved_by: Set(None),
            approved_at: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        };
        order_model.insert(&txn).await?;

        insert_items(&txn, order_id, &request.items, &products, price_mode).await?;
        let order = pricing::recalculate_order_totals(&txn, order_id, request.discount_amount)
            .await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "failed to commit order creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, order_number = %order.order_number, "order created");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::OrderCreated(order_id)).await {
                warn!(error = %e, order_id = %order_id, "failed to send order created event");
            }
        }

        let items = self.load_items(order_id).await?;
        Ok(OrderDetails { order, items })
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
        let items = self.load_items(order_id).await?;
        Ok(OrderDetails { order, items })
    }

    /// Lists orders for a store, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders_for_store(
        &self,
        store_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListPage, ServiceError> {
        let paginator = order::Entity::find()
            .filter(order::Column::StoreId.eq(store_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(OrderListPage {
            orders,
            total,
            page,
            per_page,
        })
    }

    /// Replaces the order's item set and recomputes totals. Items are
    /// deleted and re-inserted as a set, never partially edited. Only valid
    /// while the order is still editable (`draft`/`pending`); approved
    /// stock has not been consumed yet, so no stock delta applies here.
    #[instrument(skip(self, items), fields(order_id = %order_id))]
    pub async fn update_order_items(
        &self,
        order_id: Uuid,
        items: Vec<OrderItemInput>,
        discount_amount: Option<Decimal>,
        price_mode: PriceMode,
    ) -> Result<OrderDetails, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "order must contain at least one item".to_string(),
            ));
        }
        for item in &items {
            item.validate()?;
        }

        let db = &*self.db;
        let order = order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;

        let status = order_status::parse_status(&order.status)?;
        if !status.is_editable() {
            return Err(ServiceError::StateConflict(format!(
                "order {} is not modifiable in status '{}'",
                order_id, status
            )));
        }

        let products = self.load_active_products(&items).await?;

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "failed to start transaction for item update");
            ServiceError::DatabaseError(e)
        })?;

        order_item::Entity::delete_many()
            .filter(order_item::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await?;

        insert_items(&txn, order_id, &items, &products, price_mode).await?;
        let order = pricing::recalculate_order_totals(&txn, order_id, discount_amount).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "failed to commit item update");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, "order items updated");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::OrderItemsUpdated(order_id)).await {
                warn!(error = %e, order_id = %order_id, "failed to send items updated event");
            }
        }

        let items = self.load_items(order_id).await?;
        Ok(OrderDetails { order, items })
    }

    /// Submits a draft for approval.
    pub async fn submit_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        OrderStatusService::new(self.db.clone())
            .transition(order_id, OrderStatus::Pending, None)
            .await
    }

    pub async fn reject_order(
        &self,
        order_id: Uuid,
        actor: Uuid,
        reason: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let order = OrderStatusService::new(self.db.clone())
            .transition(order_id, OrderStatus::Rejected, Some(actor))
            .await?;

        let order = match reason {
            Some(reason) => {
                let mut active: order::ActiveModel = order.into();
                active.notes = Set(Some(reason));
                active.update(&*self.db).await?
            }
            None => order,
        };

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::OrderRejected(order_id)).await {
                warn!(error = %e, order_id = %order_id, "failed to send order rejected event");
            }
        }
        Ok(order)
    }

    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        actor: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let order = OrderStatusService::new(self.db.clone())
            .transition(order_id, OrderStatus::Cancelled, Some(actor))
            .await?;

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::OrderCancelled(order_id)).await {
                warn!(error = %e, order_id = %order_id, "failed to send order cancelled event");
            }
        }
        Ok(order)
    }

    pub async fn complete_order(
        &self,
        order_id: Uuid,
        actor: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let order = OrderStatusService::new(self.db.clone())
            .transition(order_id, OrderStatus::Completed, Some(actor))
            .await?;

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::OrderCompleted(order_id)).await {
                warn!(error = %e, order_id = %order_id, "failed to send order completed event");
            }
        }
        Ok(order)
    }

    async fn load_items(&self, order_id: Uuid) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?)
    }

    /// Loads and validates the products referenced by the given inputs:
    /// every product must exist and be active.
    async fn load_active_products(
        &self,
        items: &[OrderItemInput],
    ) -> Result<HashMap<Uuid, product::Model>, ServiceError> {
        let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products: HashMap<Uuid, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        for item in items {
            let product = products
                .get(&item.product_id)
                .ok_or_else(|| ServiceError::not_found("Product", item.product_id))?;
            if !product.is_active {
                return Err(ServiceError::ValidationError(format!(
                    "product {} ({}) is inactive",
                    product.sku, product.id
                )));
            }
        }

        Ok(products)
    }
}

async fn insert_items<C: sea_orm::ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    items: &[OrderItemInput],
    products: &HashMap<Uuid, product::Model>,
    price_mode: PriceMode,
) -> Result<(), ServiceError> {
    for input in items {
        let product = products
            .get(&input.product_id)
            .ok_or_else(|| ServiceError::not_found("Product", input.product_id))?;
        let unit_price =
            pricing::resolve_unit_price(product.price, input.unit_price_override, price_mode);
        if unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "unit price for {} must not be negative",
                product.sku
            )));
        }

        let item = order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(input.product_id),
            quantity: Set(input.quantity),
            unit_price: Set(unit_price),
            line_total: Set(pricing::compute_line_total(input.quantity, unit_price)),
        };
        item.insert(conn).await?;
    }
    Ok(())
}

fn generate_order_number() -> String {
    let mut tail = Uuid::new_v4().simple().to_string();
    tail.truncate(8);
    format!(
        "ORD-{}-{}",
        Utc::now().format("%Y%m%d"),
        tail.to_uppercase()
    )
}
