use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    entities::{enums::OrderStatus, order},
    errors::ServiceError,
};

/// The order lifecycle transition table.
///
/// `draft -> pending -> approved -> completed`, with rejection from either
/// pre-approval state and cancellation from any pre-approval state. Approved
/// orders are immutable to item changes; delivery progresses independently.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Draft, Pending)
            | (Draft, Approved)
            | (Pending, Approved)
            | (Draft, Rejected)
            | (Pending, Rejected)
            | (Draft, Cancelled)
            | (Pending, Cancelled)
            | (Approved, Completed)
    )
}

pub fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    OrderStatus::from_str(raw).map_err(|_| {
        ServiceError::InternalError(format!("order carries unknown status '{}'", raw))
    })
}

#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Transitions an order to a new status with an optimistic
    /// compare-and-swap on (status, version): the write only lands if the
    /// row still carries the status and version read just before. A
    /// concurrent transition makes the second writer lose with
    /// `StateConflict` instead of silently double-applying.
    ///
    /// Transitioning to `approved` also stamps the approver and timestamp.
    #[instrument(skip(self), fields(order_id = %order_id, to = %to))]
    pub async fn transition(
        &self,
        order_id: Uuid,
        to: OrderStatus,
        actor: Option<Uuid>,
    ) -> Result<order::Model, ServiceError> {
        let db = &*self.db;

        let current = order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;

        let from = parse_status(&current.status)?;
        if !is_valid_transition(from, to) {
            error!(%from, %to, "invalid order status transition");
            return Err(ServiceError::StateConflict(format!(
                "cannot transition order {} from '{}' to '{}'",
                order_id, from, to
            )));
        }

        let now = Utc::now();
        let mut update = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(to.to_string()))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(from.to_string()))
            .filter(order::Column::Version.eq(current.version));

        if to == OrderStatus::Approved {
            update = update
                .col_expr(order::Column::ApprovedBy, Expr::value(actor))
                .col_expr(order::Column::ApprovedAt, Expr::value(now));
        }

        let result = update.exec(db).await?;
        if result.rows_affected == 0 {
            // Someone else transitioned (or modified) the order between our
            // read and this write.
            return Err(ServiceError::StateConflict(format!(
                "order {} was modified concurrently; re-fetch and retry",
                order_id
            )));
        }

        let updated = order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;

        info!(old_status = %from, new_status = %to, "order status updated");
        Ok(updated)
    }

    pub async fn get_status(&self, order_id: Uuid) -> Result<OrderStatus, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
        parse_status(&order.status)
    }
}
