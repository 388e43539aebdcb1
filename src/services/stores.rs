use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{entities::store, errors::ServiceError};

/// Store lookups and running-balance bookkeeping.
///
/// The balance is a denormalized convenience: payments are the authoritative
/// ledger, so balance writes recompute from the freshly read row and the
/// decrement is floored at zero rather than trusted to stay consistent.
#[derive(Clone)]
pub struct StoreService {
    db: Arc<DatabaseConnection>,
}

impl StoreService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get_store(&self, store_id: Uuid) -> Result<store::Model, ServiceError> {
        store::Entity::find_by_id(store_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Store", store_id))
    }

    /// Fetches a store and requires it to be active.
    pub async fn get_active_store(&self, store_id: Uuid) -> Result<store::Model, ServiceError> {
        let store = self.get_store(store_id).await?;
        if !store.is_active {
            return Err(ServiceError::ValidationError(format!(
                "store {} is inactive",
                store_id
            )));
        }
        Ok(store)
    }

    /// Increases the running balance by the given amount (order approval).
    #[instrument(skip(self), fields(store_id = %store_id, %amount))]
    pub async fn increase_balance(
        &self,
        store_id: Uuid,
        amount: Decimal,
    ) -> Result<store::Model, ServiceError> {
        if amount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "balance increase must not be negative".to_string(),
            ));
        }
        let store = self.get_store(store_id).await?;
        let new_balance = store.current_balance + amount;
        self.write_balance(store, new_balance).await
    }

    /// Decreases the running balance by the given amount (payment receipt),
    /// floored at zero.
    #[instrument(skip(self), fields(store_id = %store_id, %amount))]
    pub async fn decrease_balance(
        &self,
        store_id: Uuid,
        amount: Decimal,
    ) -> Result<store::Model, ServiceError> {
        if amount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "balance decrease must not be negative".to_string(),
            ));
        }
        let store = self.get_store(store_id).await?;
        let new_balance = (store.current_balance - amount).max(Decimal::ZERO);
        self.write_balance(store, new_balance).await
    }

    async fn write_balance(
        &self,
        store: store::Model,
        new_balance: Decimal,
    ) -> Result<store::Model, ServiceError> {
        let store_id = store.id;
        let mut active: store::ActiveModel = store.into();
        active.current_balance = Set(new_balance);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;
        info!(store_id = %store_id, balance = %updated.current_balance, "store balance updated");
        Ok(updated)
    }
}
