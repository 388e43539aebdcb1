//! Pricing and totals. `recalculate_order_totals` is the single writer for
//! order subtotal/final amounts: every item-set mutation goes through it,
//! totals are never computed ad hoc elsewhere.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::{
    entities::{order, order_item},
    errors::ServiceError,
};

/// Who entered the order. Operator-entered orders may override line prices;
/// store-entered orders always pay the catalog price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceMode {
    Operator,
    Store,
}

pub fn compute_line_total(quantity: i32, unit_price: Decimal) -> Decimal {
    Decimal::from(quantity) * unit_price
}

pub fn resolve_unit_price(
    catalog_price: Decimal,
    override_price: Option<Decimal>,
    mode: PriceMode,
) -> Decimal {
    match (mode, override_price) {
        (PriceMode::Operator, Some(price)) => price,
        _ => catalog_price,
    }
}

/// Resums all current line items and writes back subtotal, discount, and
/// final amount. Passing `None` for the discount keeps the order's current
/// discount. Rejects discounts that would drive the final amount negative.
pub async fn recalculate_order_totals<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    discount_amount: Option<Decimal>,
) -> Result<order::Model, ServiceError> {
    let order = order::Entity::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Order", order_id))?;

    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(conn)
        .await?;

    let subtotal: Decimal = items.iter().map(|item| item.line_total).sum();
    let discount = discount_amount.unwrap_or(order.discount_amount);

    if discount < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "discount amount must not be negative".to_string(),
        ));
    }
    if discount > subtotal {
        return Err(ServiceError::ValidationError(format!(
            "discount {} exceeds order subtotal {}",
            discount, subtotal
        )));
    }

    let version = order.version;
    let mut active: order::ActiveModel = order.into();
    active.subtotal = Set(subtotal);
    active.discount_amount = Set(discount);
    active.final_amount = Set(subtotal - discount);
    active.updated_at = Set(Some(Utc::now()));
    active.version = Set(version + 1);

    Ok(active.update(conn).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn line_total_is_quantity_times_price() {
        assert_eq!(compute_line_total(10, dec!(5.00)), dec!(50.00));
        assert_eq!(compute_line_total(0, dec!(9.99)), dec!(0));
        assert_eq!(compute_line_total(3, dec!(0.33)), dec!(0.99));
    }

    #[test]
    fn operator_orders_may_override_price() {
        assert_eq!(
            resolve_unit_price(dec!(4.00), Some(dec!(3.50)), PriceMode::Operator),
            dec!(3.50)
        );
        assert_eq!(
            resolve_unit_price(dec!(4.00), None, PriceMode::Operator),
            dec!(4.00)
        );
    }

    #[test]
    fn store_orders_always_pay_catalog_price() {
        assert_eq!(
            resolve_unit_price(dec!(4.00), Some(dec!(0.01)), PriceMode::Store),
            dec!(4.00)
        );
        assert_eq!(
            resolve_unit_price(dec!(4.00), None, PriceMode::Store),
            dec!(4.00)
        );
    }
}
