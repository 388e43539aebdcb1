//! Stock ledger properties: non-negativity under every movement sequence,
//! lazy record creation, and delta-only reservation modification.

mod common;

use common::TestContext;
use rust_decimal_macros::dec;
use uuid::Uuid;

use freshline_api::{
    entities::enums::StockMovementReason,
    errors::ServiceError,
    services::stock::{ItemQuantity, StockService},
};

fn item(product_id: Uuid, quantity: i32) -> ItemQuantity {
    ItemQuantity {
        product_id,
        quantity,
    }
}

#[tokio::test]
async fn consume_decrements_and_never_goes_negative() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Ledger").await;
    let product = ctx.seed_product("LED-1", dec!(1.00), 0).await;
    ctx.seed_stock(store.id, product.id, 10).await;

    let stock = StockService::new(ctx.db.clone(), None);

    let after = stock
        .apply(store.id, product.id, 4, StockMovementReason::Consume, None)
        .await
        .unwrap();
    assert_eq!(after, 6);

    let err = stock
        .apply(store.id, product.id, 7, StockMovementReason::Consume, None)
        .await
        .expect_err("over-consumption must fail");
    match err {
        ServiceError::InsufficientStock { shortages } => {
            assert_eq!(shortages[0].required, 7);
            assert_eq!(shortages[0].available, 6);
        }
        other => panic!("expected InsufficientStock, got {:?}", other),
    }

    // Failed operation leaves the prior value unchanged.
    assert_eq!(
        stock.quantity_on_hand(store.id, product.id).await.unwrap(),
        6
    );
}

#[tokio::test]
async fn restore_creates_missing_records_lazily() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Lazy").await;
    let product = ctx.seed_product("LAZ-1", dec!(1.00), 0).await;

    let stock = StockService::new(ctx.db.clone(), None);

    // No record yet: reads as zero.
    assert_eq!(
        stock.quantity_on_hand(store.id, product.id).await.unwrap(),
        0
    );

    let after = stock
        .apply(store.id, product.id, 5, StockMovementReason::Restore, None)
        .await
        .unwrap();
    assert_eq!(after, 5);
}

#[tokio::test]
async fn consume_against_missing_record_fails_with_zero_available() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Empty").await;
    let product = ctx.seed_product("EMP-1", dec!(1.00), 0).await;

    let stock = StockService::new(ctx.db.clone(), None);
    let err = stock
        .apply(store.id, product.id, 1, StockMovementReason::Consume, None)
        .await
        .expect_err("consuming absent stock must fail");
    match err {
        ServiceError::InsufficientStock { shortages } => {
            assert_eq!(shortages[0].available, 0);
        }
        other => panic!("expected InsufficientStock, got {:?}", other),
    }
}

#[tokio::test]
async fn adjust_applies_signed_deltas_under_the_same_guard() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Adjust").await;
    let product = ctx.seed_product("ADJ-1", dec!(1.00), 0).await;
    ctx.seed_stock(store.id, product.id, 5).await;

    let stock = StockService::new(ctx.db.clone(), None);

    assert_eq!(
        stock
            .apply(store.id, product.id, 3, StockMovementReason::Adjust, None)
            .await
            .unwrap(),
        8
    );
    assert_eq!(
        stock
            .apply(store.id, product.id, -8, StockMovementReason::Adjust, None)
            .await
            .unwrap(),
        0
    );
    assert!(stock
        .apply(store.id, product.id, -1, StockMovementReason::Adjust, None)
        .await
        .is_err());
    assert_eq!(
        stock.quantity_on_hand(store.id, product.id).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn zero_adjustment_is_rejected() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Zero").await;
    let product = ctx.seed_product("ZER-1", dec!(1.00), 0).await;

    let stock = StockService::new(ctx.db.clone(), None);
    let err = stock
        .apply(store.id, product.id, 0, StockMovementReason::Adjust, None)
        .await
        .expect_err("zero delta is meaningless");
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn modify_reservation_releases_exactly_the_difference() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Delta").await;
    let product = ctx.seed_product("DEL-1", dec!(1.00), 0).await;
    ctx.seed_stock(store.id, product.id, 10).await;

    let stock = StockService::new(ctx.db.clone(), None);
    let order_id = Uuid::new_v4();

    // 10 -> 7: three units come back.
    stock
        .modify_reservation(
            order_id,
            &[item(product.id, 10)],
            &[item(product.id, 7)],
            store.id,
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        stock.quantity_on_hand(store.id, product.id).await.unwrap(),
        13
    );

    // 7 -> 9: two more consumed.
    stock
        .modify_reservation(
            order_id,
            &[item(product.id, 7)],
            &[item(product.id, 9)],
            store.id,
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        stock.quantity_on_hand(store.id, product.id).await.unwrap(),
        11
    );
}

#[tokio::test]
async fn unchanged_item_set_is_a_noop() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Noop").await;
    let product = ctx.seed_product("NOP-1", dec!(1.00), 0).await;
    ctx.seed_stock(store.id, product.id, 10).await;

    let stock = StockService::new(ctx.db.clone(), None);
    let items = vec![item(product.id, 4)];

    stock
        .modify_reservation(Uuid::new_v4(), &items, &items, store.id, None)
        .await
        .unwrap();
    assert_eq!(
        stock.quantity_on_hand(store.id, product.id).await.unwrap(),
        10
    );
}

#[tokio::test]
async fn modify_reservation_halts_on_insufficient_stock() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Halt").await;
    let product = ctx.seed_product("HAL-1", dec!(1.00), 0).await;
    ctx.seed_stock(store.id, product.id, 2).await;

    let stock = StockService::new(ctx.db.clone(), None);

    let err = stock
        .modify_reservation(
            Uuid::new_v4(),
            &[],
            &[item(product.id, 5)],
            store.id,
            None,
        )
        .await
        .expect_err("delta beyond available stock must fail");
    assert!(matches!(err, ServiceError::InsufficientStock { .. }));
    assert_eq!(
        stock.quantity_on_hand(store.id, product.id).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn availability_report_itemizes_every_shortage() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Report").await;
    let a = ctx.seed_product("REP-A", dec!(1.00), 0).await;
    let b = ctx.seed_product("REP-B", dec!(1.00), 0).await;
    ctx.seed_stock(store.id, a.id, 1).await;
    // No record at all for product B.

    let details = ctx
        .create_order(store.id, vec![(a.id, 5), (b.id, 3)])
        .await;

    let stock = StockService::new(ctx.db.clone(), None);
    let report = stock.validate_availability(details.order.id).await.unwrap();

    assert!(!report.ok);
    assert_eq!(report.shortages.len(), 2);
    let by_sku = |sku: &str| {
        report
            .shortages
            .iter()
            .find(|s| s.sku == sku)
            .unwrap_or_else(|| panic!("missing shortage for {}", sku))
    };
    assert_eq!(by_sku("REP-A").available, 1);
    assert_eq!(by_sku("REP-A").required, 5);
    assert_eq!(by_sku("REP-B").available, 0);
    assert_eq!(by_sku("REP-B").required, 3);
}
