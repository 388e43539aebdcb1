use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, Set,
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{order_item, product},
    errors::ServiceError,
};

/// SKUs are compared and stored case-normalized.
pub fn normalize_sku(sku: &str) -> String {
    sku.trim().to_uppercase()
}

// Distinguishes an absent field from an explicit null: absent deserializes
// to None, `"category": null` to Some(None).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    pub category: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub unit: String,
    pub price: Decimal,
    pub cost: Decimal,
    #[validate(range(min = 0))]
    pub min_stock_level: i32,
}

/// Partially-specified update: absent fields are left untouched; nullable
/// fields accept an explicit null to clear them.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub sku: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub category: Option<Option<String>>,
    pub unit: Option<String>,
    pub price: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub min_stock_level: Option<i32>,
    pub is_active: Option<bool>,
}

/// What happened when a product was deleted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ProductDeletion {
    /// Product was referenced by order items and has been deactivated
    /// instead of removed.
    Deactivated { product: product::Model },
    Deleted { product_id: Uuid },
}

#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))
    }

    #[instrument(skip(self, request), fields(sku = %request.sku))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        request.validate()?;

        if request.price < Decimal::ZERO || request.cost < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "price and cost must not be negative".to_string(),
            ));
        }

        let sku = normalize_sku(&request.sku);
        self.ensure_sku_free(&sku, None).await?;

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name),
            sku: Set(sku),
            category: Set(request.category),
            unit: Set(request.unit),
            price: Set(request.price),
            cost: Set(request.cost),
            min_stock_level: Set(request.min_stock_level),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        let created = model.insert(&*self.db).await?;
        info!(product_id = %created.id, sku = %created.sku, "product created");
        Ok(created)
    }

    /// Applies only the fields present in the request.
    #[instrument(skip(self, request), fields(product_id = %product_id))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        request.validate()?;
        let existing = self.get_product(product_id).await?;

        let mut active: product::ActiveModel = existing.into();

        if let Some(sku) = request.sku {
            let sku = normalize_sku(&sku);
            self.ensure_sku_free(&sku, Some(product_id)).await?;
            active.sku = Set(sku);
        }
        if let Some(name) = request.name {
            active.name = Set(name);
        }
        if let Some(category) = request.category {
            active.category = Set(category);
        }
        if let Some(unit) = request.unit {
            active.unit = Set(unit);
        }
        if let Some(price) = request.price {
            if price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "price must not be negative".to_string(),
                ));
            }
            active.price = Set(price);
        }
        if let Some(cost) = request.cost {
            if cost < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "cost must not be negative".to_string(),
                ));
            }
            active.cost = Set(cost);
        }
        if let Some(level) = request.min_stock_level {
            if level < 0 {
                return Err(ServiceError::ValidationError(
                    "min_stock_level must not be negative".to_string(),
                ));
            }
            active.min_stock_level = Set(level);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Some(Utc::now()));

        Ok(active.update(&*self.db).await?)
    }

    /// Deletes a product, or deactivates it when order items still
    /// reference it.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn delete_product(&self, product_id: Uuid) -> Result<ProductDeletion, ServiceError> {
        let existing = self.get_product(product_id).await?;

        let referenced = order_item::Entity::find()
            .filter(order_item::Column::ProductId.eq(product_id))
            .count(&*self.db)
            .await?;

        if referenced > 0 {
            let mut active: product::ActiveModel = existing.into();
            active.is_active = Set(false);
            active.updated_at = Set(Some(Utc::now()));
            let deactivated = active.update(&*self.db).await?;
            info!(references = referenced, "product deactivated instead of deleted");
            return Ok(ProductDeletion::Deactivated {
                product: deactivated,
            });
        }

        existing.delete(&*self.db).await?;
        info!("product deleted");
        Ok(ProductDeletion::Deleted { product_id })
    }

    async fn ensure_sku_free(
        &self,
        normalized_sku: &str,
        exclude: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut query =
            product::Entity::find().filter(product::Column::Sku.eq(normalized_sku));
        if let Some(id) = exclude {
            query = query.filter(product::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::DuplicateConstraint(format!(
                "SKU '{}' is already in use",
                normalized_sku
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sku_normalization_uppercases_and_trims() {
        assert_eq!(normalize_sku("  sku-a "), "SKU-A");
        assert_eq!(normalize_sku("Sku-B"), "SKU-B");
        assert_eq!(normalize_sku("SKU-C"), "SKU-C");
    }

    #[test]
    fn update_request_distinguishes_absent_from_null() {
        let absent: UpdateProductRequest = serde_json::from_str(r#"{"name": "Milk"}"#).unwrap();
        assert!(absent.category.is_none());

        let cleared: UpdateProductRequest =
            serde_json::from_str(r#"{"category": null}"#).unwrap();
        assert_eq!(cleared.category, Some(None));

        let set: UpdateProductRequest =
            serde_json::from_str(r#"{"category": "dairy"}"#).unwrap();
        assert_eq!(set.category, Some(Some("dairy".to_string())));
    }
}
