//! End-to-end tests for the order approval saga: fatal validation, stock
//! commitment, and enrichment artifact generation.

mod common;

use common::TestContext;
use rust_decimal_macros::dec;
use uuid::Uuid;

use freshline_api::{
    entities::{enums::OrderStatus, store},
    errors::ServiceError,
    services::{approval::ApprovalService, invoicing, stock::StockService, stores::StoreService},
};
use sea_orm::{ActiveModelTrait, Set};

fn approval(ctx: &TestContext) -> ApprovalService {
    ApprovalService::new(ctx.db.clone(), None, invoicing::DEFAULT_DUE_DAYS)
}

#[tokio::test]
async fn approval_consumes_stock_invoices_and_raises_balance() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Corner Shop").await;
    let product = ctx.seed_product("SKU-A", dec!(5.00), 0).await;
    ctx.seed_stock(store.id, product.id, 15).await;

    let details = ctx.create_simple_order(store.id, product.id, 10).await;
    assert_eq!(details.order.final_amount, dec!(50.00));

    let actor = Uuid::new_v4();
    let outcome = approval(&ctx)
        .approve_order(details.order.id, actor)
        .await
        .expect("approval should succeed");

    assert_eq!(outcome.order.status, OrderStatus::Approved.to_string());
    assert_eq!(outcome.order.approved_by, Some(actor));
    assert!(outcome.order.approved_at.is_some());
    assert!(outcome.stock_shortfalls.is_empty());

    let stock = StockService::new(ctx.db.clone(), None);
    assert_eq!(
        stock.quantity_on_hand(store.id, product.id).await.unwrap(),
        5
    );

    let invoice = outcome.invoice.expect("invoice should be generated");
    assert_eq!(invoice.total_amount, dec!(50.00));
    assert_eq!(invoice.subtotal, dec!(50.00));
    assert_eq!(invoice.return_amount, dec!(0));

    let store = StoreService::new(ctx.db.clone())
        .get_store(store.id)
        .await
        .unwrap();
    assert_eq!(store.current_balance, dec!(50.00));

    let sheet = outcome.kitchen_sheet.expect("kitchen sheet expected");
    assert_eq!(sheet.order_id, details.order.id);
    let delivery = outcome.delivery.expect("delivery expected");
    assert_eq!(delivery.order_id, details.order.id);
    let note = outcome.delivery_note.expect("delivery note expected");
    assert_eq!(note.delivery_id, delivery.id);
    assert!(outcome.store_notified);
}

#[tokio::test]
async fn approval_fails_with_itemized_shortages_and_mutates_nothing() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Short Stop").await;
    let product = ctx.seed_product("SKU-B", dec!(2.50), 0).await;
    ctx.seed_stock(store.id, product.id, 5).await;

    let details = ctx.create_simple_order(store.id, product.id, 20).await;

    let err = approval(&ctx)
        .approve_order(details.order.id, Uuid::new_v4())
        .await
        .expect_err("approval should fail");

    match err {
        ServiceError::InsufficientStock { shortages } => {
            assert_eq!(shortages.len(), 1);
            assert_eq!(shortages[0].sku, "SKU-B");
            assert_eq!(shortages[0].required, 20);
            assert_eq!(shortages[0].available, 5);
        }
        other => panic!("expected InsufficientStock, got {:?}", other),
    }

    // Order remains pending and stock untouched.
    let stock = StockService::new(ctx.db.clone(), None);
    assert_eq!(
        stock.quantity_on_hand(store.id, product.id).await.unwrap(),
        5
    );
    let order = freshline_api::services::orders::OrderService::new(ctx.db.clone(), None)
        .get_order(details.order.id)
        .await
        .unwrap();
    assert_eq!(order.order.status, OrderStatus::Pending.to_string());
}

#[tokio::test]
async fn second_approval_attempt_is_rejected() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Twice Shy").await;
    let product = ctx.seed_product("SKU-C", dec!(1.00), 0).await;
    ctx.seed_stock(store.id, product.id, 100).await;

    let details = ctx.create_simple_order(store.id, product.id, 10).await;
    let service = approval(&ctx);

    service
        .approve_order(details.order.id, Uuid::new_v4())
        .await
        .expect("first approval succeeds");

    let err = service
        .approve_order(details.order.id, Uuid::new_v4())
        .await
        .expect_err("second approval must fail");
    assert!(matches!(err, ServiceError::StateConflict(_)));

    // Stock consumed exactly once.
    let stock = StockService::new(ctx.db.clone(), None);
    assert_eq!(
        stock.quantity_on_hand(store.id, product.id).await.unwrap(),
        90
    );
}

#[tokio::test]
async fn inactive_store_blocks_approval() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Closing Down").await;
    let product = ctx.seed_product("SKU-D", dec!(3.00), 0).await;
    ctx.seed_stock(store.id, product.id, 50).await;

    let details = ctx.create_simple_order(store.id, product.id, 5).await;

    // Store goes inactive between order creation and approval.
    let mut active: store::ActiveModel = store.into();
    active.is_active = Set(false);
    active.update(&*ctx.db).await.unwrap();

    let err = approval(&ctx)
        .approve_order(details.order.id, Uuid::new_v4())
        .await
        .expect_err("approval should fail for inactive store");
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn document_regeneration_is_idempotent() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Regen").await;
    let product = ctx.seed_product("SKU-E", dec!(4.00), 0).await;
    ctx.seed_stock(store.id, product.id, 30).await;

    let details = ctx.create_simple_order(store.id, product.id, 3).await;
    let service = approval(&ctx);

    let first = service
        .approve_order(details.order.id, Uuid::new_v4())
        .await
        .unwrap();

    let regenerated = service
        .regenerate_documents(details.order.id)
        .await
        .expect("regeneration should succeed");

    assert_eq!(
        regenerated.invoice.unwrap().id,
        first.invoice.unwrap().id,
        "regeneration must return the existing invoice, not a new one"
    );
    assert_eq!(
        regenerated.kitchen_sheet.unwrap().id,
        first.kitchen_sheet.unwrap().id
    );
    assert_eq!(regenerated.delivery.unwrap().id, first.delivery.unwrap().id);
}

#[tokio::test]
async fn regeneration_requires_an_approved_order() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Not Yet").await;
    let product = ctx.seed_product("SKU-F", dec!(4.00), 0).await;
    ctx.seed_stock(store.id, product.id, 30).await;

    let details = ctx.create_simple_order(store.id, product.id, 3).await;

    let err = approval(&ctx)
        .regenerate_documents(details.order.id)
        .await
        .expect_err("pending orders have no documents to regenerate");
    assert!(matches!(err, ServiceError::StateConflict(_)));
}
