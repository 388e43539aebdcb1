//! Item-set modification rules: totals recomputation, editability guard,
//! and the no-change no-op property.

mod common;

use common::TestContext;
use rust_decimal_macros::dec;
use uuid::Uuid;

use freshline_api::{
    errors::ServiceError,
    services::{
        approval::ApprovalService, invoicing,
        orders::{OrderItemInput, OrderService},
        pricing::PriceMode,
    },
};

fn input(product_id: Uuid, quantity: i32) -> OrderItemInput {
    OrderItemInput {
        product_id,
        quantity,
        unit_price_override: None,
    }
}

#[tokio::test]
async fn modification_replaces_items_and_recomputes_totals() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Editor").await;
    let product = ctx.seed_product("MOD-1", dec!(5.00), 0).await;

    let details = ctx.create_simple_order(store.id, product.id, 10).await;
    assert_eq!(details.order.subtotal, dec!(50.00));

    let service = OrderService::new(ctx.db.clone(), None);
    let updated = service
        .update_order_items(
            details.order.id,
            vec![input(product.id, 7)],
            None,
            PriceMode::Store,
        )
        .await
        .unwrap();

    assert_eq!(updated.items.len(), 1);
    assert_eq!(updated.items[0].quantity, 7);
    assert_eq!(updated.order.subtotal, dec!(35.00));
    assert_eq!(updated.order.final_amount, dec!(35.00));
    assert_eq!(
        updated.order.final_amount,
        updated.order.subtotal - updated.order.discount_amount
    );
}

#[tokio::test]
async fn discount_is_applied_and_bounded_by_the_subtotal() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Discount").await;
    let product = ctx.seed_product("DIS-1", dec!(10.00), 0).await;

    let details = ctx.create_simple_order(store.id, product.id, 5).await;
    let service = OrderService::new(ctx.db.clone(), None);

    let updated = service
        .update_order_items(
            details.order.id,
            vec![input(product.id, 5)],
            Some(dec!(8.00)),
            PriceMode::Store,
        )
        .await
        .unwrap();
    assert_eq!(updated.order.subtotal, dec!(50.00));
    assert_eq!(updated.order.discount_amount, dec!(8.00));
    assert_eq!(updated.order.final_amount, dec!(42.00));

    let err = service
        .update_order_items(
            details.order.id,
            vec![input(product.id, 1)],
            Some(dec!(11.00)),
            PriceMode::Store,
        )
        .await
        .expect_err("discount above the subtotal must fail");
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn replacing_a_set_with_itself_changes_nothing() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Same Same").await;
    let product = ctx.seed_product("SAM-1", dec!(3.00), 0).await;

    let details = ctx.create_simple_order(store.id, product.id, 6).await;
    let before = details.order.clone();

    let updated = OrderService::new(ctx.db.clone(), None)
        .update_order_items(
            details.order.id,
            vec![input(product.id, 6)],
            None,
            PriceMode::Store,
        )
        .await
        .unwrap();

    assert_eq!(updated.order.subtotal, before.subtotal);
    assert_eq!(updated.order.discount_amount, before.discount_amount);
    assert_eq!(updated.order.final_amount, before.final_amount);
}

#[tokio::test]
async fn approved_orders_are_immutable_to_item_changes() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Locked").await;
    let product = ctx.seed_product("LOC-1", dec!(2.00), 0).await;
    ctx.seed_stock(store.id, product.id, 100).await;

    let details = ctx.create_simple_order(store.id, product.id, 5).await;
    ApprovalService::new(ctx.db.clone(), None, invoicing::DEFAULT_DUE_DAYS)
        .approve_order(details.order.id, Uuid::new_v4())
        .await
        .unwrap();

    let err = OrderService::new(ctx.db.clone(), None)
        .update_order_items(
            details.order.id,
            vec![input(product.id, 3)],
            None,
            PriceMode::Store,
        )
        .await
        .expect_err("approved orders must reject item changes");
    assert!(matches!(err, ServiceError::StateConflict(_)));
}

#[tokio::test]
async fn operator_price_overrides_apply_only_in_operator_mode() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Override").await;
    let product = ctx.seed_product("OVR-1", dec!(5.00), 0).await;

    let details = ctx.create_simple_order(store.id, product.id, 2).await;
    let service = OrderService::new(ctx.db.clone(), None);

    let operator_priced = service
        .update_order_items(
            details.order.id,
            vec![OrderItemInput {
                product_id: product.id,
                quantity: 2,
                unit_price_override: Some(dec!(4.00)),
            }],
            None,
            PriceMode::Operator,
        )
        .await
        .unwrap();
    assert_eq!(operator_priced.items[0].unit_price, dec!(4.00));
    assert_eq!(operator_priced.order.subtotal, dec!(8.00));

    let store_priced = service
        .update_order_items(
            details.order.id,
            vec![OrderItemInput {
                product_id: product.id,
                quantity: 2,
                unit_price_override: Some(dec!(0.01)),
            }],
            None,
            PriceMode::Store,
        )
        .await
        .unwrap();
    assert_eq!(store_priced.items[0].unit_price, dec!(5.00));
    assert_eq!(store_priced.order.subtotal, dec!(10.00));
}

#[tokio::test]
async fn inactive_products_cannot_be_ordered() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Inactive Goods").await;
    let product = ctx.seed_product("INA-1", dec!(2.00), 0).await;

    use freshline_api::services::products::{ProductService, UpdateProductRequest};
    ProductService::new(ctx.db.clone())
        .update_product(
            product.id,
            UpdateProductRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let request = freshline_api::services::orders::CreateOrderRequest {
        store_id: store.id,
        items: vec![input(product.id, 1)],
        discount_amount: None,
        notes: None,
        draft: false,
        auto_generated: false,
    };
    let err = OrderService::new(ctx.db.clone(), None)
        .create_order(request, PriceMode::Store)
        .await
        .expect_err("inactive products must be rejected");
    assert!(matches!(err, ServiceError::ValidationError(_)));
}
