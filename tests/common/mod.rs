//! Shared test harness: an in-memory SQLite database with the full schema
//! plus seed helpers for stores, products, and stock.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use uuid::Uuid;

use freshline_api::{
    config::AppConfig,
    db,
    entities::{product, stock_record, store},
    schema,
    services::{
        orders::{CreateOrderRequest, OrderDetails, OrderItemInput, OrderService},
        pricing::PriceMode,
    },
};

pub struct TestContext {
    pub db: Arc<DatabaseConnection>,
}

impl TestContext {
    /// Fresh in-memory database with the schema applied. The pool is pinned
    /// to a single connection so every query sees the same memory database.
    pub async fn new() -> Self {
        let config = AppConfig::new("sqlite::memory:");
        let pool = db::establish_connection_from_app_config(&config)
            .await
            .expect("failed to create test database");
        schema::ensure_schema(&pool)
            .await
            .expect("failed to apply schema");
        Self { db: Arc::new(pool) }
    }

    pub async fn seed_store(&self, name: &str) -> store::Model {
        self.seed_store_with(name, true).await
    }

    pub async fn seed_store_with(&self, name: &str, is_active: bool) -> store::Model {
        let now = Utc::now();
        store::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            contact_name: Set(Some("Test Contact".to_string())),
            email: Set(Some(format!("{}@example.com", name.to_lowercase()))),
            phone: Set(None),
            address: Set(Some("1 Market Street".to_string())),
            credit_limit: Set(Decimal::new(500_000, 2)),
            current_balance: Set(Decimal::ZERO),
            is_active: Set(is_active),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed store")
    }

    pub async fn seed_product(&self, sku: &str, price: Decimal, min_stock: i32) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(format!("Product {}", sku)),
            sku: Set(sku.to_string()),
            category: Set(Some("pantry".to_string())),
            unit: Set("each".to_string()),
            price: Set(price),
            cost: Set(price / Decimal::from(2)),
            min_stock_level: Set(min_stock),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed product")
    }

    pub async fn seed_stock(
        &self,
        store_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> stock_record::Model {
        let now = Utc::now();
        stock_record::ActiveModel {
            id: Set(Uuid::new_v4()),
            store_id: Set(store_id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            updated_by: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed stock record")
    }

    /// Creates a pending order with a single line item.
    pub async fn create_simple_order(
        &self,
        store_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> OrderDetails {
        self.create_order(store_id, vec![(product_id, quantity)]).await
    }

    pub async fn create_order(
        &self,
        store_id: Uuid,
        lines: Vec<(Uuid, i32)>,
    ) -> OrderDetails {
        let request = CreateOrderRequest {
            store_id,
            items: lines
                .into_iter()
                .map(|(product_id, quantity)| OrderItemInput {
                    product_id,
                    quantity,
                    unit_price_override: None,
                })
                .collect(),
            discount_amount: None,
            notes: None,
            draft: false,
            auto_generated: false,
        };
        OrderService::new(self.db.clone(), None)
            .create_order(request, PriceMode::Store)
            .await
            .expect("failed to create order")
    }
}
